// High-frequency energy
// Butterworth high-pass, squared, then asymmetric smoothing. Fricatives
// and plosive bursts concentrate energy above ~2 kHz.

use crate::dsp::Biquad;

/// High-frequency energy tracker
#[derive(Debug, Clone)]
pub struct HighFreqEnergy {
    highpass: Biquad,
    energy: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

/// Fast attack so bursts register within a millisecond
const ATTACK_MS: f32 = 1.0;

impl HighFreqEnergy {
    pub fn new(sample_rate: u32, cutoff_hz: f32, window_ms: f32) -> Self {
        let sr = sample_rate as f32;
        let cutoff = if cutoff_hz > 0.0 { cutoff_hz } else { 2000.0 };
        let release_ms = if window_ms > 0.0 { window_ms } else { 10.0 };

        HighFreqEnergy {
            highpass: Biquad::highpass(sr, cutoff),
            energy: 0.0,
            attack_coeff: 1.0 - (-1.0 / (sr * ATTACK_MS * 0.001)).exp(),
            release_coeff: 1.0 - (-1.0 / (sr * release_ms * 0.001)).exp(),
        }
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let filtered = self.highpass.process(sample);
        let inst_energy = filtered * filtered;

        let coeff = if inst_energy > self.energy {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.energy += coeff * (inst_energy - self.energy);
        self.energy
    }

    pub fn current(&self) -> f32 {
        self.energy
    }

    pub fn reset(&mut self) {
        self.highpass.reset();
        self.energy = 0.0;
    }
}
