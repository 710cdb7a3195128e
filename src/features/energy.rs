// Auxiliary energy operators
// Teager energy ("forcefulness") and the short/long local energy ratio.
// Both act as strong-single-feature bypasses in the state machine rather
// than fused detection features.

use crate::detect::stats::FeatureStats;

/// Teager energy operator: x[n-1]^2 - x[n-2] * x[n], half-wave rectified
///
/// Carries its own running statistics so the detector can ask for a
/// z-score directly.
#[derive(Debug, Clone)]
pub struct TeagerEnergy {
    x1: f32,
    x2: f32,
    current: f32,
    stats: FeatureStats,
}

impl TeagerEnergy {
    pub fn new(sample_rate: u32, tau_ms: f32) -> Self {
        TeagerEnergy {
            x1: 0.0,
            x2: 0.0,
            current: 0.0,
            stats: FeatureStats::new(tau_ms * 0.001, sample_rate as f32),
        }
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let teager = self.x1 * self.x1 - self.x2 * sample;
        self.x2 = self.x1;
        self.x1 = sample;

        self.current = teager.max(0.0);
        self.stats.update(self.current);
        self.current
    }

    /// Z-score of the current value against the running statistics
    pub fn z_score(&self) -> f32 {
        self.stats.z_score(self.current)
    }

    /// Statistics need settling time before the z-score means anything
    pub fn is_settled(&self) -> bool {
        self.stats.confidence() >= 1.0
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.current = 0.0;
        self.stats.reset();
    }
}

/// Short-window over long-window energy ratio, clamped at 10
///
/// A Weber-style salience operator: a sudden local rise stands out from
/// the recent past regardless of absolute level.
#[derive(Debug, Clone)]
pub struct LocalEnergyRatio {
    short: f32,
    long: f32,
    alpha_short: f32,
    alpha_long: f32,
    count: u64,
    settle_target: u64,
}

const SHORT_TAU_S: f32 = 0.020;
const LONG_TAU_S: f32 = 0.500;
const RATIO_CLAMP: f32 = 10.0;

impl LocalEnergyRatio {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        LocalEnergyRatio {
            short: 0.0,
            long: 0.0,
            alpha_short: 1.0 - (-1.0 / (SHORT_TAU_S * sr)).exp(),
            alpha_long: 1.0 - (-1.0 / (LONG_TAU_S * sr)).exp(),
            count: 0,
            // The long window must have seen 500 ms before the ratio is
            // trustworthy; before that a fresh stream always looks "loud"
            settle_target: (LONG_TAU_S * sr) as u64,
        }
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let energy = sample * sample;
        self.short += self.alpha_short * (energy - self.short);
        self.long += self.alpha_long * (energy - self.long);
        self.count += 1;
        self.ratio()
    }

    pub fn ratio(&self) -> f32 {
        if self.long < 1e-12 {
            return 0.0;
        }
        (self.short / self.long).min(RATIO_CLAMP)
    }

    pub fn is_settled(&self) -> bool {
        self.count >= self.settle_target
    }

    pub fn reset(&mut self) {
        self.short = 0.0;
        self.long = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teager_impulse_registers() {
        let mut teager = TeagerEnergy::new(16_000, 500.0);
        for _ in 0..100 {
            teager.process(0.0);
        }
        // x = [..0, 1, 0..]: the operator peaks one sample after the spike
        teager.process(1.0);
        let after = teager.process(0.0);
        assert!(after > 0.9);
    }

    #[test]
    fn test_teager_zero_on_silence() {
        let mut teager = TeagerEnergy::new(16_000, 500.0);
        for _ in 0..100 {
            assert_eq!(teager.process(0.0), 0.0);
        }
        assert_eq!(teager.z_score(), 0.0);
    }

    #[test]
    fn test_ler_spikes_on_sudden_level_rise() {
        let mut ler = LocalEnergyRatio::new(16_000);
        // Settle the long window on a quiet signal
        for _ in 0..16_000 {
            ler.process(0.01);
        }
        assert!(ler.is_settled());
        let calm = ler.ratio();
        assert!(calm < 1.5);

        // 10 ms of a much louder signal
        let mut spiked = 0.0f32;
        for _ in 0..160 {
            spiked = ler.process(0.5);
        }
        assert!(spiked > 2.0);
    }

    #[test]
    fn test_ler_clamped_at_ten() {
        let mut ler = LocalEnergyRatio::new(16_000);
        for _ in 0..16_000 {
            ler.process(0.001);
        }
        for _ in 0..320 {
            ler.process(1.0);
        }
        assert!(ler.ratio() <= RATIO_CLAMP);
    }

    #[test]
    fn test_ler_not_settled_at_start() {
        let mut ler = LocalEnergyRatio::new(16_000);
        for _ in 0..100 {
            ler.process(0.5);
        }
        assert!(!ler.is_settled());
    }
}
