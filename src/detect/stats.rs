// Running feature statistics
// EMA mean/variance per feature, z-scoring, and the two normalization
// schemes used by fusion

/// Exponentially weighted running statistics for one feature stream
///
/// `alpha` is derived from a time constant and the stream's own update
/// rate (sample rate for per-sample features, hop rate for framed ones):
/// alpha = 1 - exp(-1 / (tau * rate)).
#[derive(Debug, Clone)]
pub struct FeatureStats {
    mean: f32,
    var: f32,
    max: f32,
    count: u64,
    alpha: f32,
    confidence_target: u64,
}

impl FeatureStats {
    /// `tau_s` in seconds, `update_rate_hz` in updates per second
    pub fn new(tau_s: f32, update_rate_hz: f32) -> Self {
        let alpha = if tau_s > 0.0 && update_rate_hz > 0.0 {
            1.0 - (-1.0 / (tau_s * update_rate_hz)).exp()
        } else {
            0.0
        };
        // Full confidence after 500 ms of updates
        let confidence_target = ((0.5 * update_rate_hz) as u64).max(1);
        FeatureStats {
            mean: 0.0,
            var: 0.0,
            max: 0.0,
            count: 0,
            alpha,
            confidence_target,
        }
    }

    /// Fold in one observation; NaN and infinite values are ignored
    pub fn update(&mut self, x: f32) {
        if !x.is_finite() {
            return;
        }
        let delta = x - self.mean;
        self.mean += self.alpha * delta;
        self.var = (1.0 - self.alpha) * (self.var + self.alpha * delta * delta);
        if x > self.max {
            self.max = x;
        }
        self.count += 1;
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }

    pub fn std(&self) -> f32 {
        if self.var > 0.0 {
            self.var.sqrt()
        } else {
            0.0
        }
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Z-score of a value against the running statistics
    ///
    /// Degenerate variance yields 0 so fresh detectors do not fabricate
    /// huge scores out of the first few samples.
    pub fn z_score(&self, x: f32) -> f32 {
        let std = self.std();
        if std < 1e-12 || !x.is_finite() {
            return 0.0;
        }
        (x - self.mean) / std
    }

    /// Legacy normalization: clamp(z, 0, 4) / 4
    pub fn normalized_legacy(&self, x: f32) -> f32 {
        self.z_score(x).clamp(0.0, 4.0) / 4.0
    }

    /// Sigmoid normalization into [0, 1]
    ///
    /// Uses the rational sigmoid s(x) = x / (1 + |x|) shifted by one, so
    /// an average-strength signal (z = 0) lands near 0.25 instead of 0.5.
    /// This keeps steady background from hovering at mid-scale.
    pub fn normalized(&self, x: f32) -> f32 {
        let z = self.z_score(x) - 1.0;
        let s = z / (1.0 + z.abs());
        0.5 * (1.0 + s)
    }

    /// How settled the statistics are: min(1, count / target)
    pub fn confidence(&self) -> f32 {
        (self.count as f32 / self.confidence_target as f32).min(1.0)
    }

    pub fn reset(&mut self) {
        self.mean = 0.0;
        self.var = 0.0;
        self.max = 0.0;
        self.count = 0;
    }
}

/// Slow estimate of the background envelope level, fed only while the
/// detector is idle so syllables do not drag the floor upward
#[derive(Debug, Clone)]
pub struct NoiseFloor {
    level: f32,
    alpha: f32,
}

impl NoiseFloor {
    pub fn new(sample_rate: u32) -> Self {
        // ~2 s time constant
        NoiseFloor {
            level: 0.0,
            alpha: 1.0 - (-1.0 / (2.0 * sample_rate as f32)).exp(),
        }
    }

    pub fn update(&mut self, energy: f32) {
        if energy.is_finite() {
            self.level += self.alpha * (energy - self.level);
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_converges() {
        let mut stats = FeatureStats::new(0.1, 1000.0);
        for _ in 0..5000 {
            stats.update(2.0);
        }
        assert!((stats.mean() - 2.0).abs() < 0.01);
        assert!(stats.std() < 0.05);
    }

    #[test]
    fn test_nan_is_ignored() {
        let mut stats = FeatureStats::new(0.1, 1000.0);
        stats.update(1.0);
        let count = stats.count();
        stats.update(f32::NAN);
        stats.update(f32::INFINITY);
        assert_eq!(stats.count(), count);
    }

    #[test]
    fn test_z_score_degenerate_variance_is_zero() {
        let stats = FeatureStats::new(0.1, 1000.0);
        assert_eq!(stats.z_score(100.0), 0.0);
    }

    #[test]
    fn test_sigmoid_maps_average_low() {
        let mut stats = FeatureStats::new(0.05, 1000.0);
        // Alternate around a mean of 1.0 to build variance
        for i in 0..5000 {
            stats.update(if i % 2 == 0 { 0.5 } else { 1.5 });
        }
        let at_mean = stats.normalized(stats.mean());
        assert!((at_mean - 0.25).abs() < 0.02);

        // Strong outliers approach 1.0
        let outlier = stats.normalized(stats.mean() + 20.0 * stats.std());
        assert!(outlier > 0.9);
    }

    #[test]
    fn test_legacy_normalization_clamps() {
        let mut stats = FeatureStats::new(0.05, 1000.0);
        for i in 0..5000 {
            stats.update(if i % 2 == 0 { 0.5 } else { 1.5 });
        }
        assert_eq!(stats.normalized_legacy(stats.mean() - 10.0), 0.0);
        assert_eq!(stats.normalized_legacy(stats.mean() + 100.0 * stats.std()), 1.0);
    }

    #[test]
    fn test_confidence_ramps_to_one() {
        let mut stats = FeatureStats::new(0.5, 100.0);
        assert_eq!(stats.confidence(), 0.0);
        for _ in 0..25 {
            stats.update(1.0);
        }
        assert!((stats.confidence() - 0.5).abs() < 0.01);
        for _ in 0..100 {
            stats.update(1.0);
        }
        assert_eq!(stats.confidence(), 1.0);
    }

    #[test]
    fn test_running_max() {
        let mut stats = FeatureStats::new(0.1, 100.0);
        stats.update(1.0);
        stats.update(5.0);
        stats.update(2.0);
        assert_eq!(stats.max(), 5.0);
    }
}
