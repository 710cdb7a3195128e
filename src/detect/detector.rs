// Syllable detector
// The end-to-end streaming pipeline: AGC, voicing front-end, parallel
// feature extractors, running statistics, fusion, the four-state syllable
// state machine, and context-delayed emission. Everything advances sample
// by sample under one clock; the detector is exclusively owned by its
// caller and never allocates after construction.

use crate::config::{ConfigError, SyllableConfig};
use crate::detect::calibration::{
    CalibrationFrame, NoiseCalibration, CAL_ENERGY, CAL_HIGH_FREQ, CAL_MFCC_DELTA, CAL_PEAK_RATE,
    CAL_SPECTRAL_FLUX, CAL_WAVELET,
};
use crate::detect::fusion::{FusionInputs, FusionStage, NUM_FUSED};
use crate::detect::stats::{FeatureStats, NoiseFloor};
use crate::detect::voicing::{VoicingState, VoicingTracker};
use crate::dsp::Agc;
use crate::events::prominence::EventRing;
use crate::events::types::{OnsetType, SyllableEvent};
use crate::features::{
    HighFreqEnergy, LocalEnergyRatio, MelCepstrum, PeakRate, SpectralFlux, TeagerEnergy,
    WaveletBank,
};

/// Accent threshold on the streaming path
const ACCENT_STREAMING: f32 = 0.9;

/// Accent threshold at flush
const ACCENT_FLUSH: f32 = 1.2;

/// Base fusion entry/exit thresholds, scaled by the hysteresis factors
const FUSION_ON_BASE: f32 = 0.6;
const FUSION_OFF_BASE: f32 = 0.4;

/// The smoothed f0 must exceed this multiple of its minimum since the
/// last event before a voiced onset passes the rise gate
const F0_RISE_FACTOR: f32 = 1.05;

/// Rise-gate bypass thresholds
const BYPASS_FUSION: f32 = 0.85;
const BYPASS_TEAGER_Z: f32 = 3.0;
const BYPASS_LER: f32 = 2.0;
const BYPASS_FLATNESS_WEBER: f32 = -0.3;

/// Longest allowed onset rise and nucleus, in milliseconds
const RISE_MAX_MS: f32 = 50.0;
const NUCLEUS_MAX_MS: f32 = 100.0;

/// Realtime energy gate: multiple of the calibrated energy threshold,
/// and the absolute envelope floor (~-60 dBFS)
const ENERGY_GATE_FACTOR: f32 = 3.0;
const ENERGY_ABS_FLOOR: f32 = 1e-3;

/// Nucleus energy-drop fractions of the in-flight envelope peak
const ENERGY_DROP_OFFLINE: f32 = 0.1;
const ENERGY_DROP_REALTIME: f32 = 0.2;

/// AGC operating point
const AGC_TARGET_DB: f32 = -20.0;
const AGC_MAX_GAIN_DB: f32 = 30.0;

/// Morlet bank placement
const WAVELET_MIN_HZ: f32 = 2000.0;
const WAVELET_MAX_HZ: f32 = 6000.0;
const WAVELET_SCALES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Idle,
    OnsetRising,
    Nucleus,
    Cooldown,
}

/// The event under construction while the state machine is in
/// ONSET_RISING or NUCLEUS
#[derive(Debug, Clone)]
struct InFlight {
    event: SyllableEvent,
    peak_rate_max: f32,
    fusion_max: f32,
    peak_envelope: f32,
    energy_accum: f32,
    rise_samples: u64,
}

/// Per-sample feature snapshot shared between the pipeline stages
#[derive(Debug, Clone, Copy, Default)]
struct SampleFeatures {
    peak_rate: f32,
    envelope: f32,
    spectral_flux: f32,
    high_freq: f32,
    mfcc_delta: f32,
    wavelet: f32,
    fusion: f32,
    sf_norm: f32,
    hf_norm: f32,
}

/// Streaming syllable-onset and prominence detector
///
/// Drive it with arbitrary-size chunks of mono samples in [-1, 1] via
/// [`process`](Self::process); finished syllables are copied into the
/// caller's output slice once enough trailing context exists (immediately
/// in realtime mode). Neither `process` nor `flush` blocks or allocates.
pub struct SyllableDetector {
    config: SyllableConfig,
    realtime: bool,
    adaptive_enabled: bool,
    total_samples: u64,

    agc: Option<Agc>,
    voicing: VoicingTracker,
    peak_rate: PeakRate,
    spectral_flux: SpectralFlux,
    high_freq: HighFreqEnergy,
    mfcc: MelCepstrum,
    wavelet: WaveletBank,
    teager: TeagerEnergy,
    ler: LocalEnergyRatio,

    peak_rate_stats: FeatureStats,
    flux_stats: FeatureStats,
    high_freq_stats: FeatureStats,
    mfcc_stats: FeatureStats,
    wavelet_stats: FeatureStats,
    noise_floor: NoiseFloor,

    calibration: NoiseCalibration,
    fusion: FusionStage,

    state: DetectorState,
    state_timer: u64,
    in_flight: Option<InFlight>,

    // f0-rise gate bookkeeping, tracked since the last event
    min_f0: f32,
    f0_has_risen: bool,
    last_event_samples: Option<u64>,

    ring: EventRing,

    // Derived sizes, fixed at construction
    rise_limit_samples: u64,
    nucleus_limit_samples: u64,
    min_dist_samples: u64,
}

impl SyllableDetector {
    pub fn new(config: &SyllableConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let sr = config.sample_rate;
        let sr_f = sr as f32;
        let fft_size = config.fft_size_samples();
        let hop_size = config.hop_size_samples();
        let hop_rate = sr_f / hop_size as f32;
        let tau_s = config.adaptive_peak_rate_tau_ms * 0.001;

        // Keep the Morlet bank below Nyquist at low sample rates
        let wavelet_max = WAVELET_MAX_HZ.min(0.45 * sr_f);
        let wavelet_min = WAVELET_MIN_HZ.min(wavelet_max * 0.5);

        let mut detector = SyllableDetector {
            realtime: config.realtime_mode,
            adaptive_enabled: config.adaptive_peak_rate_k > 0.0
                && config.adaptive_peak_rate_tau_ms > 0.0,
            total_samples: 0,

            agc: config
                .enable_agc
                .then(|| Agc::new(sr_f, AGC_TARGET_DB, AGC_MAX_GAIN_DB)),
            voicing: VoicingTracker::new(sr, config.zff_trend_window_ms, config.voiced_hold_samples()),
            peak_rate: PeakRate::new(config),
            spectral_flux: SpectralFlux::new(fft_size, hop_size),
            high_freq: HighFreqEnergy::new(sr, config.high_freq_cutoff_hz, config.hop_size_ms),
            mfcc: MelCepstrum::new(sr, fft_size, hop_size),
            wavelet: WaveletBank::new(sr, wavelet_min, wavelet_max, WAVELET_SCALES),
            teager: TeagerEnergy::new(sr, config.adaptive_peak_rate_tau_ms),
            ler: LocalEnergyRatio::new(sr),

            peak_rate_stats: FeatureStats::new(tau_s, sr_f),
            flux_stats: FeatureStats::new(tau_s, hop_rate),
            high_freq_stats: FeatureStats::new(tau_s, sr_f),
            mfcc_stats: FeatureStats::new(tau_s, hop_rate),
            wavelet_stats: FeatureStats::new(tau_s, sr_f),
            noise_floor: NoiseFloor::new(sr),

            calibration: NoiseCalibration::new(config.snr_threshold_db),
            fusion: FusionStage::from_config(config),

            state: DetectorState::Idle,
            state_timer: 0,
            in_flight: None,
            min_f0: f32::MAX,
            f0_has_risen: false,
            last_event_samples: None,

            ring: EventRing::new(),

            rise_limit_samples: (RISE_MAX_MS * 0.001 * sr_f) as u64,
            nucleus_limit_samples: (NUCLEUS_MAX_MS * 0.001 * sr_f) as u64,
            min_dist_samples: config.min_dist_samples(),

            config: config.clone(),
        };

        if detector.realtime {
            detector
                .calibration
                .start(detector.config.calibration_target_samples());
        }

        Ok(detector)
    }

    /// Feed a chunk of samples; events that became ready are copied into
    /// `events_out` and their count returned. Events that do not fit stay
    /// buffered and surface on later calls.
    pub fn process(&mut self, input: &[f32], events_out: &mut [SyllableEvent]) -> usize {
        let mut written = 0;
        for &raw in input {
            self.step(raw);
            written += self.drain(events_out, written, ACCENT_STREAMING);
        }
        written
    }

    /// Emit everything still buffered, regardless of trailing context
    pub fn flush(&mut self, events_out: &mut [SyllableEvent]) -> usize {
        let mut written = 0;
        while written < events_out.len() {
            match self
                .ring
                .pop_scored(self.config.context_size, ACCENT_FLUSH)
            {
                Some(event) => {
                    events_out[written] = event;
                    written += 1;
                }
                None => break,
            }
        }
        written
    }

    /// Return to the post-construction state
    ///
    /// Counters, buffers, statistics and the event ring are cleared;
    /// filter coefficients are preserved. A realtime-mode detector starts
    /// a fresh calibration phase.
    pub fn reset(&mut self) {
        self.total_samples = 0;

        if let Some(agc) = &mut self.agc {
            agc.reset();
        }
        self.voicing.reset();
        self.peak_rate.reset();
        self.spectral_flux.reset();
        self.high_freq.reset();
        self.mfcc.reset();
        self.wavelet.reset();
        self.teager.reset();
        self.ler.reset();

        self.peak_rate_stats.reset();
        self.flux_stats.reset();
        self.high_freq_stats.reset();
        self.mfcc_stats.reset();
        self.wavelet_stats.reset();
        self.noise_floor.reset();

        self.state = DetectorState::Idle;
        self.state_timer = 0;
        self.in_flight = None;
        self.min_f0 = f32::MAX;
        self.f0_has_risen = false;
        self.last_event_samples = None;
        self.ring.clear();

        self.calibration.clear();
        if self.realtime {
            self.calibration
                .start(self.config.calibration_target_samples());
        }
        log::debug!("detector reset");
    }

    /// Switch between the offline and realtime detection paths
    ///
    /// Enabling realtime mode starts a calibration phase immediately.
    pub fn set_realtime_mode(&mut self, enable: bool) {
        if enable {
            self.recalibrate();
        } else {
            self.realtime = false;
            self.calibration.stop();
        }
    }

    /// Restart noise calibration (enables realtime mode if needed)
    pub fn recalibrate(&mut self) {
        self.realtime = true;
        self.calibration
            .start(self.config.calibration_target_samples());
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_calibrating()
    }

    /// Adjust the SNR margin over the calibrated noise floor
    pub fn set_snr_threshold(&mut self, snr_db: f32) {
        self.calibration.set_snr_db(snr_db);
    }

    /// Events lost to context-buffer overflow since construction or reset
    pub fn dropped_events(&self) -> u64 {
        self.ring.dropped()
    }

    pub fn config(&self) -> &SyllableConfig {
        &self.config
    }

    /// Total samples consumed since construction or reset
    pub fn samples_processed(&self) -> u64 {
        self.total_samples
    }

    fn drain(&mut self, out: &mut [SyllableEvent], already_written: usize, accent: f32) -> usize {
        // Nothing leaves the detector while a calibration phase is active,
        // including events finalized before recalibration
        if self.calibration.is_calibrating() {
            return 0;
        }
        let needed_context = if self.realtime {
            0
        } else {
            self.config.context_size
        };

        let mut written = 0;
        while self.ring.len() > needed_context && already_written + written < out.len() {
            match self.ring.pop_scored(self.config.context_size, accent) {
                Some(event) => {
                    out[already_written + written] = event;
                    written += 1;
                }
                None => break,
            }
        }
        written
    }

    /// Advance the whole pipeline by one sample
    fn step(&mut self, raw: f32) {
        let sample = match &mut self.agc {
            Some(agc) => agc.process(raw),
            None => raw,
        };
        self.total_samples += 1;

        let voicing = self.voicing.process(sample);
        let features = self.extract_features(sample, &voicing);

        if self.calibration.is_calibrating() {
            let frame: CalibrationFrame = [
                features.peak_rate,
                features.spectral_flux,
                features.high_freq,
                features.mfcc_delta,
                features.wavelet,
                features.envelope,
            ];
            self.calibration.push(&frame);
            self.noise_floor.update(features.envelope);
            // The state machine is dormant until calibration finishes
            return;
        }

        if self.state == DetectorState::Idle {
            self.noise_floor.update(features.envelope);
        }

        let features = self.fuse(features, &voicing);
        self.track_f0_rise(&voicing);
        self.advance_state(&features, &voicing);
    }

    /// Run the extractors and fold new values into their statistics
    fn extract_features(&mut self, sample: f32, voicing: &VoicingState) -> SampleFeatures {
        let mut features = SampleFeatures::default();

        let pr = self.peak_rate.process(sample);
        features.peak_rate = pr.peak_rate;
        features.envelope = pr.envelope;

        // The adaptive threshold tracks voiced speech only; silence and
        // noise would drag it toward zero
        if self.adaptive_enabled && voicing.is_voiced {
            self.peak_rate_stats.update(features.peak_rate);
        }

        if self.config.enable_spectral_flux {
            if let Some(flux) = self.spectral_flux.process(sample) {
                self.flux_stats.update(flux);
            }
            features.spectral_flux = self.spectral_flux.current();
        }

        if self.config.enable_high_freq_energy {
            features.high_freq = self.high_freq.process(sample);
            self.high_freq_stats.update(features.high_freq);
        }

        if self.config.enable_mfcc_delta {
            if let Some(delta) = self.mfcc.process(sample) {
                self.mfcc_stats.update(delta);
            }
            features.mfcc_delta = self.mfcc.current();
        }

        if self.config.enable_wavelet {
            features.wavelet = self.wavelet.process(sample);
            self.wavelet_stats.update(features.wavelet);
        }

        self.teager.process(sample);
        self.ler.process(sample);

        features
    }

    /// Normalize and combine the features into the fusion score
    fn fuse(&mut self, mut features: SampleFeatures, voicing: &VoicingState) -> SampleFeatures {
        features.sf_norm = if self.config.enable_spectral_flux {
            self.flux_stats.normalized(features.spectral_flux)
        } else {
            0.0
        };
        features.hf_norm = if self.config.enable_high_freq_energy {
            self.high_freq_stats.normalized(features.high_freq)
        } else {
            0.0
        };

        features.fusion = if self.realtime {
            let ratio = |value: f32, k: usize| value / self.calibration.threshold(k);
            let mut ratios = [0.0f32; NUM_FUSED];
            ratios[0] = ratio(features.peak_rate, CAL_PEAK_RATE);
            if self.config.enable_spectral_flux {
                ratios[1] = ratio(features.spectral_flux, CAL_SPECTRAL_FLUX);
            }
            if self.config.enable_high_freq_energy {
                ratios[2] = ratio(features.high_freq, CAL_HIGH_FREQ);
            }
            if self.config.enable_mfcc_delta {
                ratios[3] = ratio(features.mfcc_delta, CAL_MFCC_DELTA);
            }
            if self.config.enable_wavelet {
                ratios[4] = ratio(features.wavelet, CAL_WAVELET);
            }
            self.fusion.realtime(&ratios, voicing.confidence)
        } else {
            let mut normalized = [0.0f32; NUM_FUSED];
            normalized[0] = self.peak_rate_stats.normalized(features.peak_rate);
            normalized[1] = features.sf_norm;
            normalized[2] = features.hf_norm;
            normalized[3] = self.mfcc_stats.normalized(features.mfcc_delta);
            normalized[4] = self.wavelet_stats.normalized(features.wavelet);

            let inputs = FusionInputs {
                normalized,
                voicing_confidence: voicing.confidence,
                envelope: features.envelope,
                avg_confidence: self.avg_confidence(),
            };
            self.fusion.offline(&inputs, self.noise_floor.level())
        };

        features
    }

    fn avg_confidence(&self) -> f32 {
        let all = [
            &self.peak_rate_stats,
            &self.flux_stats,
            &self.high_freq_stats,
            &self.mfcc_stats,
            &self.wavelet_stats,
        ];
        let mut sum = 0.0f32;
        let mut count = 0u32;
        for (k, stats) in all.iter().enumerate() {
            if self.fusion.is_enabled(k) {
                sum += stats.confidence();
                count += 1;
            }
        }
        if count > 0 {
            sum / count as f32
        } else {
            0.0
        }
    }

    /// Track the minimum smoothed f0 since the last event and latch the
    /// rise flag once the pitch climbs 5 % above it
    fn track_f0_rise(&mut self, voicing: &VoicingState) {
        if !voicing.is_voiced || voicing.smoothed_f0 <= 0.0 {
            return;
        }
        if voicing.smoothed_f0 < self.min_f0 {
            self.min_f0 = voicing.smoothed_f0;
        }
        if voicing.smoothed_f0 > F0_RISE_FACTOR * self.min_f0 {
            self.f0_has_risen = true;
        }
    }

    fn f0_gate_open(&self, fusion: f32, voicing: &VoicingState) -> bool {
        // Realtime mode detects immediately; the calibrated energy gate
        // carries the false-positive suppression instead
        if self.realtime {
            return true;
        }
        // Unvoiced intervals cannot show an f0 rise
        if !voicing.is_voiced {
            return true;
        }
        if self.f0_has_risen {
            return true;
        }
        if fusion > BYPASS_FUSION {
            return true;
        }
        if self.teager.is_settled() && self.teager.z_score() > BYPASS_TEAGER_Z {
            return true;
        }
        if self.ler.is_settled() && self.ler.ratio() > BYPASS_LER {
            return true;
        }
        if self.config.enable_spectral_flux
            && self.spectral_flux.flatness_weber() < BYPASS_FLATNESS_WEBER
        {
            return true;
        }
        if let Some(last) = self.last_event_samples {
            if self.total_samples - last > 2 * self.min_dist_samples {
                return true;
            }
        }
        false
    }

    fn energy_gate_open(&self, envelope: f32) -> bool {
        if !self.realtime {
            return true;
        }
        envelope > ENERGY_GATE_FACTOR * self.calibration.threshold(CAL_ENERGY)
            && envelope > ENERGY_ABS_FLOOR
    }

    fn advance_state(&mut self, features: &SampleFeatures, voicing: &VoicingState) {
        let mut threshold = self.config.threshold_peak_rate;
        if self.adaptive_enabled {
            let adaptive = self.peak_rate_stats.mean()
                + self.config.adaptive_peak_rate_k * self.peak_rate_stats.std();
            threshold = threshold.max(adaptive);
        }
        let threshold_on = threshold * self.config.hysteresis_on_factor;
        let fusion_on = FUSION_ON_BASE * self.config.hysteresis_on_factor;
        let fusion_off = FUSION_OFF_BASE * self.config.hysteresis_off_factor;

        match self.state {
            DetectorState::Idle => {
                let voiced_trigger = features.peak_rate > threshold_on && voicing.is_voiced;
                let fusion_trigger = features.fusion > fusion_on
                    && (self.config.allow_unvoiced_onsets || voicing.is_voiced);
                let unvoiced_trigger = self.config.allow_unvoiced_onsets
                    && !voicing.is_voiced
                    && (features.sf_norm > self.config.unvoiced_onset_threshold
                        || features.hf_norm > self.config.unvoiced_onset_threshold);

                if (voiced_trigger || fusion_trigger || unvoiced_trigger)
                    && self.f0_gate_open(features.fusion, voicing)
                    && self.energy_gate_open(features.envelope)
                {
                    self.begin_onset(features, voicing);
                }
            }

            DetectorState::OnsetRising => {
                self.state_timer += 1;
                let rise_limit = self.rise_limit_samples;
                let state_timer = self.state_timer;

                if let Some(wip) = &mut self.in_flight {
                    wip.rise_samples += 1;
                    wip.energy_accum += features.envelope;
                    wip.peak_envelope = wip.peak_envelope.max(features.envelope);

                    // Snapshots follow the per-feature running maximum
                    let event = &mut wip.event;
                    event.peak_rate = event.peak_rate.max(features.peak_rate);
                    event.spectral_flux = event.spectral_flux.max(features.spectral_flux);
                    event.high_freq_energy = event.high_freq_energy.max(features.high_freq);
                    event.mfcc_delta = event.mfcc_delta.max(features.mfcc_delta);
                    event.wavelet_score = event.wavelet_score.max(features.wavelet);
                    event.fusion_score = event.fusion_score.max(features.fusion);
                    wip.peak_rate_max = event.peak_rate;
                    wip.fusion_max = event.fusion_score;

                    let rise_over = features.peak_rate < 0.5 * wip.peak_rate_max
                        || features.fusion < 0.6 * wip.fusion_max
                        || state_timer > rise_limit
                        || (!voicing.is_voiced && event.onset_type == OnsetType::Voiced);

                    if rise_over {
                        let rise_time_s =
                            wip.rise_samples as f32 / self.config.sample_rate as f32;
                        event.rise_slope = wip.peak_rate_max / (rise_time_s + 1e-6);
                        self.state = DetectorState::Nucleus;
                        self.state_timer = 0;
                    }
                }
            }

            DetectorState::Nucleus => {
                self.state_timer += 1;
                let drop_fraction = if self.realtime {
                    ENERGY_DROP_REALTIME
                } else {
                    ENERGY_DROP_OFFLINE
                };

                let mut finished = false;
                if let Some(wip) = &mut self.in_flight {
                    wip.energy_accum += features.envelope;
                    wip.peak_envelope = wip.peak_envelope.max(features.envelope);

                    finished = features.envelope < drop_fraction * wip.peak_envelope
                        || (!voicing.is_voiced && wip.event.onset_type == OnsetType::Voiced)
                        || features.fusion < fusion_off
                        || self.state_timer > self.nucleus_limit_samples;
                }

                if finished {
                    self.finalize_event(voicing);
                }
            }

            DetectorState::Cooldown => {
                self.state_timer += 1;
                if self.state_timer > self.min_dist_samples {
                    self.state = DetectorState::Idle;
                    self.state_timer = 0;
                }
            }
        }
    }

    fn begin_onset(&mut self, features: &SampleFeatures, voicing: &VoicingState) {
        let onset_type = if voicing.is_voiced {
            if features.hf_norm > 0.5 {
                OnsetType::Mixed
            } else {
                OnsetType::Voiced
            }
        } else {
            OnsetType::Unvoiced
        };

        let mut event = SyllableEvent::empty();
        event.timestamp_samples = self.total_samples;
        event.time_seconds = self.total_samples as f64 / self.config.sample_rate as f64;
        event.peak_rate = features.peak_rate;
        event.spectral_flux = features.spectral_flux;
        event.high_freq_energy = features.high_freq;
        event.mfcc_delta = features.mfcc_delta;
        event.wavelet_score = features.wavelet;
        event.fusion_score = features.fusion;
        event.f0 = if voicing.is_voiced {
            voicing.smoothed_f0
        } else {
            0.0
        };
        event.energy = features.envelope;
        event.onset_type = onset_type;

        self.in_flight = Some(InFlight {
            event,
            peak_rate_max: features.peak_rate,
            fusion_max: features.fusion,
            peak_envelope: features.envelope,
            energy_accum: features.envelope,
            rise_samples: 0,
        });

        self.state = DetectorState::OnsetRising;
        self.state_timer = 0;
        self.min_f0 = f32::MAX;
        self.f0_has_risen = false;
    }

    fn finalize_event(&mut self, voicing: &VoicingState) {
        if let Some(mut wip) = self.in_flight.take() {
            wip.event.duration_s = (self.total_samples - wip.event.timestamp_samples) as f32
                / self.config.sample_rate as f32;
            wip.event.energy = wip.energy_accum;
            if wip.event.onset_type != OnsetType::Unvoiced && voicing.smoothed_f0 > 0.0 {
                wip.event.f0 = voicing.smoothed_f0;
            }

            self.ring.push(wip.event, voicing.semitone_offset);
            self.last_event_samples = Some(self.total_samples);
        }

        self.state = DetectorState::Cooldown;
        self.state_timer = 0;
    }
}
