// Automatic gain control
// Envelope-tracking gain stage that pulls the input toward a target level
// without pumping: fast attack, slow release, smoothed gain updates

/// Automatic gain control front-end
#[derive(Debug, Clone)]
pub struct Agc {
    target_level: f32,
    max_gain: f32,
    current_gain: f32,

    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,

    // Gain smoothing to prevent zipper noise
    gain_coeff: f32,
}

/// Gain is never reduced below this factor, so loud input is only tamed,
/// never squashed
const MIN_GAIN: f32 = 0.1;

impl Agc {
    pub fn new(sample_rate: f32, target_db: f32, max_gain_db: f32) -> Self {
        // Envelope: fast attack (5 ms), slower release (500 ms)
        let t_att = 0.005;
        let t_rel = 0.500;

        Agc {
            target_level: 10.0f32.powf(target_db / 20.0),
            max_gain: 10.0f32.powf(max_gain_db / 20.0),
            current_gain: 1.0,
            envelope: 0.0,
            attack_coeff: 1.0 - (-1.0 / (t_att * sample_rate)).exp(),
            release_coeff: 1.0 - (-1.0 / (t_rel * sample_rate)).exp(),
            gain_coeff: 1.0 - (-1.0 / (0.100 * sample_rate)).exp(),
        }
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let abs_sample = sample.abs();
        let coeff = if abs_sample > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope += coeff * (abs_sample - self.envelope);

        let env_safe = self.envelope.max(1e-6);
        let target_gain = (self.target_level / env_safe).clamp(MIN_GAIN, self.max_gain);

        self.current_gain += self.gain_coeff * (target_gain - self.current_gain);
        sample * self.current_gain
    }

    pub fn gain(&self) -> f32 {
        self.current_gain
    }

    pub fn reset(&mut self) {
        self.current_gain = 1.0;
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_input_is_boosted() {
        let mut agc = Agc::new(16_000.0, -20.0, 30.0);
        // 2 seconds of a quiet tone
        for i in 0..32_000 {
            let s = 0.01 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 16_000.0).sin();
            agc.process(s);
        }
        assert!(agc.gain() > 2.0);
    }

    #[test]
    fn test_gain_is_bounded() {
        let mut agc = Agc::new(16_000.0, -20.0, 30.0);
        // Silence would demand infinite gain; the cap must hold
        for _ in 0..64_000 {
            agc.process(0.0);
        }
        assert!(agc.gain() <= 10.0f32.powf(30.0 / 20.0) + 1e-3);
    }

    #[test]
    fn test_loud_input_not_squashed_below_floor() {
        let mut agc = Agc::new(16_000.0, -20.0, 30.0);
        for _ in 0..64_000 {
            agc.process(1.0);
        }
        assert!(agc.gain() >= MIN_GAIN - 1e-4);
    }
}
