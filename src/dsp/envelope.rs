// One-pole envelope follower with asymmetric attack and release

/// Rectifying envelope follower
///
/// Tracks `|input|` with a fast coefficient while the signal rises and a
/// slower one while it falls.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    output: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32, attack_ms: f32, release_ms: f32) -> Self {
        let t_attack = (attack_ms * 0.001).max(1.0e-5);
        let t_release = (release_ms * 0.001).max(1.0e-5);

        EnvelopeFollower {
            output: 0.0,
            attack_coeff: (-1.0 / (sample_rate * t_attack)).exp(),
            release_coeff: (-1.0 / (sample_rate * t_release)).exp(),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let abs_in = input.abs();
        let coeff = if abs_in > self.output {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.output = coeff * self.output + (1.0 - coeff) * abs_in;
        self.output
    }

    pub fn value(&self) -> f32 {
        self.output
    }

    pub fn reset(&mut self) {
        self.output = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_faster_than_release() {
        let mut env = EnvelopeFollower::new(16_000.0, 5.0, 20.0);

        // Drive with a unit step for 10 ms
        for _ in 0..160 {
            env.process(1.0);
        }
        let after_attack = env.value();
        assert!(after_attack > 0.8);

        // Release back toward zero for 10 ms; should still be well above zero
        for _ in 0..160 {
            env.process(0.0);
        }
        assert!(env.value() > 0.3);
        assert!(env.value() < after_attack);
    }

    #[test]
    fn test_rectifies_negative_input() {
        let mut env = EnvelopeFollower::new(16_000.0, 5.0, 20.0);
        for _ in 0..800 {
            env.process(-1.0);
        }
        assert!(env.value() > 0.9);
    }

    #[test]
    fn test_reset() {
        let mut env = EnvelopeFollower::new(16_000.0, 5.0, 20.0);
        env.process(1.0);
        env.reset();
        assert_eq!(env.value(), 0.0);
    }
}
