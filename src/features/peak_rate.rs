// Peak rate
// Bandpassed amplitude envelope, differentiated and half-wave rectified.
// The positive envelope slope is a robust correlate of vowel onsets.

use crate::config::SyllableConfig;
use crate::dsp::{Biquad, EnvelopeFollower};

/// Output of the peak-rate chain for one sample
#[derive(Debug, Clone, Copy)]
pub struct PeakRateSample {
    /// Half-wave rectified envelope slope
    pub peak_rate: f32,

    /// Current bandpassed envelope value, reused as the detector's
    /// energy signal
    pub envelope: f32,
}

/// Bandpass -> envelope -> rectified first difference
#[derive(Debug, Clone)]
pub struct PeakRate {
    bandpass: Biquad,
    envelope: EnvelopeFollower,
    prev_env: f32,
}

const ATTACK_MS: f32 = 5.0;
const RELEASE_MS: f32 = 20.0;

impl PeakRate {
    pub fn new(config: &SyllableConfig) -> Self {
        let sr = config.sample_rate as f32;
        PeakRate {
            bandpass: Biquad::bandpass(sr, config.peak_rate_center_hz(), config.peak_rate_q()),
            envelope: EnvelopeFollower::new(sr, ATTACK_MS, RELEASE_MS),
            prev_env: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> PeakRateSample {
        let bp = self.bandpass.process(sample);
        let env = self.envelope.process(bp);

        let diff = env - self.prev_env;
        self.prev_env = env;

        PeakRateSample {
            peak_rate: diff.max(0.0),
            envelope: env,
        }
    }

    pub fn reset(&mut self) {
        self.bandpass.reset();
        self.envelope.reset();
        self.prev_env = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SyllableConfig {
        SyllableConfig::default_for(16_000)
    }

    #[test]
    fn test_silence_yields_zero() {
        let mut pr = PeakRate::new(&config());
        for _ in 0..1000 {
            let out = pr.process(0.0);
            assert_eq!(out.peak_rate, 0.0);
            assert_eq!(out.envelope, 0.0);
        }
    }

    #[test]
    fn test_tone_burst_onset_produces_positive_slope() {
        let cfg = config();
        let mut pr = PeakRate::new(&cfg);

        // Settle on silence, then switch on an in-band tone
        for _ in 0..1600 {
            pr.process(0.0);
        }
        let mut max_rate_at_onset = 0.0f32;
        for i in 0..800 {
            let s = 0.5 * (2.0 * std::f32::consts::PI * 1850.0 * i as f32 / 16_000.0).sin();
            let out = pr.process(s);
            max_rate_at_onset = max_rate_at_onset.max(out.peak_rate);
        }
        assert!(max_rate_at_onset > cfg.threshold_peak_rate);
    }

    #[test]
    fn test_steady_tone_slope_decays() {
        let mut pr = PeakRate::new(&config());

        let mut late_max = 0.0f32;
        for i in 0..16_000 {
            let s = 0.5 * (2.0 * std::f32::consts::PI * 1850.0 * i as f32 / 16_000.0).sin();
            let out = pr.process(s);
            // After a second of steady tone the envelope has flattened
            if i > 12_000 {
                late_max = late_max.max(out.peak_rate);
            }
        }
        assert!(late_max < 0.01);
    }
}
