// Detector configuration
// All tunable parameters for the syllable detector, with defaults matching
// the reference tuning for clean close-mic speech

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when a configuration cannot drive a detector
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("peak-rate band is empty or inverted: [{min}, {max}] Hz")]
    InvalidPeakRateBand { min: f32, max: f32 },

    #[error("FFT window of {0} ms is too short for the sample rate")]
    FftWindowTooShort(f32),

    #[error("hop size of {0} ms is too short for the sample rate")]
    HopTooShort(f32),

    #[error("high-frequency cutoff {cutoff} Hz is at or above Nyquist ({nyquist} Hz)")]
    CutoffAboveNyquist { cutoff: f32, nyquist: f32 },

    #[error("prominence context size {0} exceeds the event buffer capacity")]
    ContextTooLarge(usize),
}

/// Immutable per-run configuration for a [`SyllableDetector`](crate::SyllableDetector)
///
/// Construct with [`SyllableConfig::default_for`] and override individual
/// fields before handing it to the detector. All time quantities are in
/// milliseconds; all frequencies in Hz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyllableConfig {
    /// Sample rate in Hz; fixes all time-constant and filter math
    pub sample_rate: u32,

    /// Trailing-mean window for the zero-frequency resonator trend removal
    pub zff_trend_window_ms: f32,

    /// Lower edge of the peak-rate bandpass
    pub peak_rate_band_min: f32,

    /// Upper edge of the peak-rate bandpass
    pub peak_rate_band_max: f32,

    /// Minimum distance between syllables; drives the cooldown state
    pub min_syllable_dist_ms: f32,

    /// Absolute floor for the peak-rate threshold
    pub threshold_peak_rate: f32,

    /// Adaptive threshold is mean + k * std; k <= 0 disables adaptation
    pub adaptive_peak_rate_k: f32,

    /// Time constant for the adaptive peak-rate statistics
    pub adaptive_peak_rate_tau_ms: f32,

    /// How long the voiced flag stays latched after a glottal epoch
    pub voiced_hold_ms: f32,

    /// Multiplier applied to thresholds for state entry
    pub hysteresis_on_factor: f32,

    /// Multiplier applied to thresholds for state exit
    pub hysteresis_off_factor: f32,

    /// Number of neighbor syllables per side used for prominence context
    pub context_size: usize,

    /// Enable the framed spectral-flux extractor
    pub enable_spectral_flux: bool,

    /// Enable the high-frequency energy tracker
    pub enable_high_freq_energy: bool,

    /// Enable the framed MFCC-delta extractor
    pub enable_mfcc_delta: bool,

    /// Enable the Morlet wavelet transient detector
    pub enable_wavelet: bool,

    /// FFT window for the framed extractors; rounded up to a power of two
    pub fft_size_ms: f32,

    /// Hop between framed-extractor frames
    pub hop_size_ms: f32,

    /// High-pass cutoff for the high-frequency energy tracker
    pub high_freq_cutoff_hz: f32,

    /// Fusion weight for peak rate
    pub weight_peak_rate: f32,

    /// Fusion weight for spectral flux
    pub weight_spectral_flux: f32,

    /// Fusion weight for high-frequency energy
    pub weight_high_freq: f32,

    /// Fusion weight for MFCC delta
    pub weight_mfcc_delta: f32,

    /// Fusion weight for the wavelet transient score
    pub weight_wavelet: f32,

    /// Fusion weight for the voicing-confidence pseudo-feature
    pub weight_voiced_bonus: f32,

    /// Blend ratio: fusion = alpha * max + (1 - alpha) * weighted average
    pub fusion_blend_alpha: f32,

    /// Normalized-feature threshold for unvoiced onset triggering
    pub unvoiced_onset_threshold: f32,

    /// Allow onsets without voicing (plosives, fricatives)
    pub allow_unvoiced_onsets: bool,

    /// Run the automatic gain control front-end
    pub enable_agc: bool,

    /// Realtime mode: calibrated thresholds, geometric fusion, zero-latency emission
    pub realtime_mode: bool,

    /// Noise-floor calibration phase length for realtime mode
    pub calibration_duration_ms: f32,

    /// SNR margin over the calibrated noise floor, in dB
    pub snr_threshold_db: f32,
}

const DEFAULT_SAMPLE_RATE: u32 = 44_100;

impl SyllableConfig {
    /// Default configuration for a given sample rate
    ///
    /// Non-positive sample rates fall back to 44.1 kHz.
    pub fn default_for(sample_rate: u32) -> Self {
        SyllableConfig {
            sample_rate: if sample_rate > 0 {
                sample_rate
            } else {
                DEFAULT_SAMPLE_RATE
            },
            zff_trend_window_ms: 10.0,
            peak_rate_band_min: 500.0,
            peak_rate_band_max: 3200.0,
            min_syllable_dist_ms: 100.0,
            threshold_peak_rate: 0.0003,
            adaptive_peak_rate_k: 4.0,
            adaptive_peak_rate_tau_ms: 500.0,
            voiced_hold_ms: 30.0,
            hysteresis_on_factor: 1.3,
            hysteresis_off_factor: 0.7,
            context_size: 2,
            enable_spectral_flux: true,
            enable_high_freq_energy: true,
            enable_mfcc_delta: true,
            enable_wavelet: true,
            fft_size_ms: 32.0,
            hop_size_ms: 16.0,
            high_freq_cutoff_hz: 2000.0,
            weight_peak_rate: 0.25,
            weight_spectral_flux: 0.20,
            weight_high_freq: 0.15,
            weight_mfcc_delta: 0.10,
            weight_wavelet: 0.20,
            weight_voiced_bonus: 0.10,
            fusion_blend_alpha: 0.6,
            unvoiced_onset_threshold: 0.5,
            allow_unvoiced_onsets: true,
            enable_agc: true,
            realtime_mode: false,
            calibration_duration_ms: 2000.0,
            snr_threshold_db: 6.0,
        }
    }

    /// Validate the numeric surface before a detector is built from it
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.peak_rate_band_max <= self.peak_rate_band_min || self.peak_rate_band_min <= 0.0 {
            return Err(ConfigError::InvalidPeakRateBand {
                min: self.peak_rate_band_min,
                max: self.peak_rate_band_max,
            });
        }
        if self.fft_size_samples() < 8 {
            return Err(ConfigError::FftWindowTooShort(self.fft_size_ms));
        }
        if self.hop_size_samples() == 0 {
            return Err(ConfigError::HopTooShort(self.hop_size_ms));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if self.enable_high_freq_energy && self.high_freq_cutoff_hz >= nyquist {
            return Err(ConfigError::CutoffAboveNyquist {
                cutoff: self.high_freq_cutoff_hz,
                nyquist,
            });
        }
        if self.context_size >= crate::events::prominence::EVENT_BUFFER_SIZE {
            return Err(ConfigError::ContextTooLarge(self.context_size));
        }
        Ok(())
    }

    /// FFT window in samples, rounded up to the next power of two
    pub fn fft_size_samples(&self) -> usize {
        let raw = (self.fft_size_ms * 0.001 * self.sample_rate as f32) as usize;
        raw.max(1).next_power_of_two()
    }

    /// Hop between frames, in samples
    pub fn hop_size_samples(&self) -> usize {
        (self.hop_size_ms * 0.001 * self.sample_rate as f32) as usize
    }

    /// Minimum syllable distance, in samples
    pub fn min_dist_samples(&self) -> u64 {
        (self.min_syllable_dist_ms * 0.001 * self.sample_rate as f32) as u64
    }

    /// Voiced-flag hold window, in samples (at least one)
    pub fn voiced_hold_samples(&self) -> u64 {
        ((self.voiced_hold_ms * 0.001 * self.sample_rate as f32) as u64).max(1)
    }

    /// Calibration phase length, in samples
    pub fn calibration_target_samples(&self) -> u64 {
        (self.calibration_duration_ms * 0.001 * self.sample_rate as f32) as u64
    }

    /// Center frequency of the peak-rate bandpass
    pub fn peak_rate_center_hz(&self) -> f32 {
        (self.peak_rate_band_min + self.peak_rate_band_max) * 0.5
    }

    /// Q factor of the peak-rate bandpass (bandwidth floored at 1 Hz)
    pub fn peak_rate_q(&self) -> f32 {
        let bandwidth = (self.peak_rate_band_max - self.peak_rate_band_min).max(1.0);
        (self.peak_rate_center_hz() / bandwidth).max(0.1)
    }
}

impl Default for SyllableConfig {
    fn default() -> Self {
        Self::default_for(DEFAULT_SAMPLE_RATE)
    }
}
