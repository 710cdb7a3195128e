// Voicing front-end
// Epoch detection on the zero-frequency resonator output, pitch tracking
// with an octave-jump guard, and the slow f0 baseline behind the
// secondary-accent signal.

use crate::dsp::ZeroFreqResonator;

/// Accepted fundamental range in Hz
const F0_MIN: f32 = 50.0;
const F0_MAX: f32 = 600.0;

/// EMA coefficient for the smoothed pitch, applied per accepted epoch
const F0_SMOOTH_ALPHA: f32 = 0.3;

/// Relative deviation beyond which a pitch candidate is an outlier
const OUTLIER_FRACTION: f32 = 0.2;

/// Consecutive confirmations an outlier needs before it replaces the
/// smoothed estimate
const CONFIRM_EPOCHS: u32 = 3;

/// Time constant of the slow f0 baseline in seconds
const BASELINE_TAU_S: f32 = 1.0;

/// Per-sample voicing snapshot handed to the detector
#[derive(Debug, Clone, Copy, Default)]
pub struct VoicingState {
    /// Whether an epoch landed within the hold window
    pub is_voiced: bool,

    /// Whether this very sample is a glottal closure instant
    pub is_epoch: bool,

    /// Smoothed pitch estimate (0 until the first accepted epoch)
    pub smoothed_f0: f32,

    /// Confidence in the voicing decision, decaying over the hold window
    pub confidence: f32,

    /// Semitone offset of the smoothed pitch against the slow baseline
    pub semitone_offset: f32,
}

/// Streaming pitch and voicing tracker
#[derive(Debug, Clone)]
pub struct VoicingTracker {
    zff: ZeroFreqResonator,
    sample_rate: u32,
    hold_samples: u64,

    last_zff: f32,
    samples_since_epoch: u64,

    smoothed_f0: f32,
    pending_f0: f32,
    pending_count: u32,

    baseline_f0: f32,
}

impl VoicingTracker {
    pub fn new(sample_rate: u32, trend_window_ms: f32, hold_samples: u64) -> Self {
        VoicingTracker {
            zff: ZeroFreqResonator::new(sample_rate, trend_window_ms),
            sample_rate,
            hold_samples,
            last_zff: 0.0,
            samples_since_epoch: u64::MAX,
            smoothed_f0: 0.0,
            pending_f0: 0.0,
            pending_count: 0,
            baseline_f0: 0.0,
        }
    }

    pub fn process(&mut self, sample: f32) -> VoicingState {
        let zff_out = self.zff.process(sample);
        let is_epoch = self.last_zff < 0.0 && zff_out >= 0.0;
        self.last_zff = zff_out;

        if is_epoch {
            if self.samples_since_epoch != u64::MAX && self.samples_since_epoch > 0 {
                let period_s = self.samples_since_epoch as f32 / self.sample_rate as f32;
                let f0 = 1.0 / period_s;
                if f0 > F0_MIN && f0 < F0_MAX {
                    self.track_pitch(f0);
                    self.track_baseline(period_s);
                }
            }
            self.samples_since_epoch = 0;
        } else if self.samples_since_epoch != u64::MAX {
            self.samples_since_epoch += 1;
        }

        let is_voiced =
            self.samples_since_epoch != u64::MAX && self.samples_since_epoch <= self.hold_samples;
        let confidence = if is_voiced {
            1.0 - self.samples_since_epoch as f32 / self.hold_samples as f32
        } else {
            0.0
        };

        VoicingState {
            is_voiced,
            is_epoch,
            smoothed_f0: self.smoothed_f0,
            confidence,
            semitone_offset: self.semitone_offset(),
        }
    }

    /// Smoothed-pitch update with the octave-jump guard
    ///
    /// Candidates within 20 % of the estimate fold in immediately; an
    /// outlier must repeat three epochs in a row before it takes over.
    fn track_pitch(&mut self, f0: f32) {
        if self.smoothed_f0 <= 0.0 {
            self.smoothed_f0 = f0;
            return;
        }

        let deviation = (f0 - self.smoothed_f0).abs() / self.smoothed_f0;
        if deviation <= OUTLIER_FRACTION {
            self.smoothed_f0 += F0_SMOOTH_ALPHA * (f0 - self.smoothed_f0);
            self.pending_count = 0;
            return;
        }

        let near_pending = self.pending_count > 0
            && (f0 - self.pending_f0).abs() / self.pending_f0 <= OUTLIER_FRACTION;
        if near_pending {
            self.pending_count += 1;
            if self.pending_count >= CONFIRM_EPOCHS {
                self.smoothed_f0 = f0;
                self.pending_count = 0;
            }
        } else {
            self.pending_f0 = f0;
            self.pending_count = 1;
        }
    }

    /// Slow baseline EMA, time-aware so the rate of epochs does not bend
    /// the time constant
    fn track_baseline(&mut self, period_s: f32) {
        if self.smoothed_f0 <= 0.0 {
            return;
        }
        if self.baseline_f0 <= 0.0 {
            self.baseline_f0 = self.smoothed_f0;
            return;
        }
        let alpha = 1.0 - (-period_s / BASELINE_TAU_S).exp();
        self.baseline_f0 += alpha * (self.smoothed_f0 - self.baseline_f0);
    }

    /// Semitone distance of the smoothed pitch above the baseline
    pub fn semitone_offset(&self) -> f32 {
        if self.smoothed_f0 > 0.0 && self.baseline_f0 > 0.0 {
            12.0 * (self.smoothed_f0 / self.baseline_f0).log2()
        } else {
            0.0
        }
    }

    pub fn smoothed_f0(&self) -> f32 {
        self.smoothed_f0
    }

    pub fn reset(&mut self) {
        self.zff.reset();
        self.last_zff = 0.0;
        self.samples_since_epoch = u64::MAX;
        self.smoothed_f0 = 0.0;
        self.pending_f0 = 0.0;
        self.pending_count = 0;
        self.baseline_f0 = 0.0;
    }
}
