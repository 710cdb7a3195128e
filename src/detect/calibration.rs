// Noise-floor calibration
// Realtime mode opens with a short listening phase: raw feature frames
// accumulate in a fixed ring, and on finalization each feature gets a
// detection threshold at mu + gamma * sigma over the observed noise.

/// Number of calibrated features per frame
pub const NUM_CAL_FEATURES: usize = 6;

/// Frame layout indices
pub const CAL_PEAK_RATE: usize = 0;
pub const CAL_SPECTRAL_FLUX: usize = 1;
pub const CAL_HIGH_FREQ: usize = 2;
pub const CAL_MFCC_DELTA: usize = 3;
pub const CAL_WAVELET: usize = 4;
pub const CAL_ENERGY: usize = 5;

/// Ring capacity (power of two, indices are masked)
const CAL_CAPACITY: usize = 128;
const CAL_MASK: usize = CAL_CAPACITY - 1;

/// Thresholds never collapse below this
const THRESHOLD_FLOOR: f32 = 1e-6;

/// One frame of raw feature values observed during calibration
pub type CalibrationFrame = [f32; NUM_CAL_FEATURES];

/// Calibration phase state and the resulting per-feature thresholds
#[derive(Debug, Clone)]
pub struct NoiseCalibration {
    frames: [CalibrationFrame; CAL_CAPACITY],
    write_idx: usize,
    stored: usize,

    samples_seen: u64,
    target_samples: u64,
    calibrating: bool,
    finalized: bool,

    gamma: f32,
    mu: [f32; NUM_CAL_FEATURES],
    sigma: [f32; NUM_CAL_FEATURES],
    thresholds: [f32; NUM_CAL_FEATURES],
}

impl NoiseCalibration {
    pub fn new(snr_db: f32) -> Self {
        NoiseCalibration {
            frames: [[0.0; NUM_CAL_FEATURES]; CAL_CAPACITY],
            write_idx: 0,
            stored: 0,
            samples_seen: 0,
            target_samples: 0,
            calibrating: false,
            finalized: false,
            gamma: snr_gamma(snr_db),
            mu: [0.0; NUM_CAL_FEATURES],
            sigma: [0.0; NUM_CAL_FEATURES],
            thresholds: [THRESHOLD_FLOOR; NUM_CAL_FEATURES],
        }
    }

    /// Begin (or restart) a calibration phase of `target_samples` samples
    pub fn start(&mut self, target_samples: u64) {
        self.write_idx = 0;
        self.stored = 0;
        self.samples_seen = 0;
        self.target_samples = target_samples.max(1);
        self.calibrating = true;
        self.finalized = false;
        log::debug!("noise calibration started: {} samples", self.target_samples);
    }

    /// Abandon the phase without touching existing thresholds
    pub fn stop(&mut self) {
        self.calibrating = false;
    }

    /// Drop all collected statistics and thresholds, keeping the SNR margin
    pub fn clear(&mut self) {
        self.write_idx = 0;
        self.stored = 0;
        self.samples_seen = 0;
        self.calibrating = false;
        self.finalized = false;
        self.mu = [0.0; NUM_CAL_FEATURES];
        self.sigma = [0.0; NUM_CAL_FEATURES];
        self.thresholds = [THRESHOLD_FLOOR; NUM_CAL_FEATURES];
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    /// Append one frame; returns true when this frame completed the phase
    pub fn push(&mut self, frame: &CalibrationFrame) -> bool {
        if !self.calibrating {
            return false;
        }

        self.frames[self.write_idx] = *frame;
        self.write_idx = (self.write_idx + 1) & CAL_MASK;
        if self.stored < CAL_CAPACITY {
            self.stored += 1;
        }

        self.samples_seen += 1;
        if self.samples_seen < self.target_samples {
            return false;
        }

        self.finalize();
        true
    }

    fn finalize(&mut self) {
        let n = self.stored.max(1) as f32;

        for k in 0..NUM_CAL_FEATURES {
            let mut sum = 0.0f32;
            for frame in self.frames.iter().take(self.stored) {
                sum += frame[k];
            }
            let mean = sum / n;

            let mut var_sum = 0.0f32;
            for frame in self.frames.iter().take(self.stored) {
                let d = frame[k] - mean;
                var_sum += d * d;
            }
            let std = (var_sum / n).sqrt();

            self.mu[k] = mean;
            self.sigma[k] = std;
        }

        self.apply_thresholds();
        self.calibrating = false;
        self.finalized = true;
        log::debug!(
            "noise calibration finalized over {} frames, gamma {:.2}",
            self.stored,
            self.gamma
        );
    }

    fn apply_thresholds(&mut self) {
        for k in 0..NUM_CAL_FEATURES {
            self.thresholds[k] = (self.mu[k] + self.gamma * self.sigma[k]).max(THRESHOLD_FLOOR);
        }
    }

    /// Detection threshold for one feature
    pub fn threshold(&self, k: usize) -> f32 {
        self.thresholds[k]
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Change the SNR margin; re-derives thresholds from the stored
    /// statistics if a calibration already completed
    pub fn set_snr_db(&mut self, snr_db: f32) {
        self.gamma = snr_gamma(snr_db);
        if self.finalized {
            self.apply_thresholds();
        }
    }
}

fn snr_gamma(snr_db: f32) -> f32 {
    10.0f32.powf(snr_db / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_frame(level: f32) -> CalibrationFrame {
        [level; NUM_CAL_FEATURES]
    }

    #[test]
    fn test_phase_runs_for_target_samples() {
        let mut cal = NoiseCalibration::new(6.0);
        cal.start(100);
        for i in 0..99 {
            assert!(!cal.push(&quiet_frame(0.01)), "finalized early at {}", i);
            assert!(cal.is_calibrating());
        }
        assert!(cal.push(&quiet_frame(0.01)));
        assert!(!cal.is_calibrating());
        assert!(cal.is_finalized());
    }

    #[test]
    fn test_constant_noise_threshold_is_mean() {
        let mut cal = NoiseCalibration::new(6.0);
        cal.start(200);
        for _ in 0..200 {
            cal.push(&quiet_frame(0.02));
        }
        // Zero variance: threshold collapses to the mean
        for k in 0..NUM_CAL_FEATURES {
            assert!((cal.threshold(k) - 0.02).abs() < 1e-6);
        }
    }

    #[test]
    fn test_variance_raises_threshold() {
        let mut cal = NoiseCalibration::new(6.0);
        cal.start(200);
        for i in 0..200 {
            let level = if i % 2 == 0 { 0.01 } else { 0.03 };
            cal.push(&quiet_frame(level));
        }
        // mu = 0.02, sigma = 0.01, gamma(6 dB) ~ 3.98
        let expected = 0.02 + snr_gamma(6.0) * 0.01;
        assert!((cal.threshold(CAL_ENERGY) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_threshold_floor_on_silence() {
        let mut cal = NoiseCalibration::new(6.0);
        cal.start(50);
        for _ in 0..50 {
            cal.push(&quiet_frame(0.0));
        }
        for k in 0..NUM_CAL_FEATURES {
            assert_eq!(cal.threshold(k), THRESHOLD_FLOOR);
        }
    }

    #[test]
    fn test_set_snr_rederives_after_finalize() {
        let mut cal = NoiseCalibration::new(6.0);
        cal.start(200);
        for i in 0..200 {
            let level = if i % 2 == 0 { 0.01 } else { 0.03 };
            cal.push(&quiet_frame(level));
        }
        let strict = cal.threshold(CAL_ENERGY);
        cal.set_snr_db(0.0);
        let lenient = cal.threshold(CAL_ENERGY);
        assert!(lenient < strict);
        // gamma(0 dB) = 1
        assert!((lenient - 0.03).abs() < 1e-4);
    }

    #[test]
    fn test_restart_clears_progress() {
        let mut cal = NoiseCalibration::new(6.0);
        cal.start(100);
        for _ in 0..60 {
            cal.push(&quiet_frame(0.01));
        }
        cal.start(100);
        for _ in 0..99 {
            assert!(!cal.push(&quiet_frame(0.01)));
        }
        assert!(cal.push(&quiet_frame(0.01)));
    }

    #[test]
    fn test_push_ignored_when_not_calibrating() {
        let mut cal = NoiseCalibration::new(6.0);
        assert!(!cal.push(&quiet_frame(0.5)));
        assert!(!cal.is_finalized());
    }
}
