// Feature fusion
// Two rules produce the combined salience score: the offline rule blends
// a weighted average of normalized features with their maximum, and the
// realtime rule takes a geometric mean of threshold ratios so that a
// single noisy feature cannot fire on its own.

use crate::config::SyllableConfig;

/// Count of fused detection features: peak rate, spectral flux,
/// high-frequency energy, MFCC delta, wavelet score
pub const NUM_FUSED: usize = 5;

/// Normalized values of the detection features, plus the context the
/// rules need, for one sample
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionInputs {
    /// Sigmoid-normalized feature values, indexed like the weights
    pub normalized: [f32; NUM_FUSED],

    /// Voicing confidence in [0, 1]
    pub voicing_confidence: f32,

    /// Current envelope value, gated against the noise floor
    pub envelope: f32,

    /// Mean statistics confidence across the enabled features
    pub avg_confidence: f32,
}

/// Fusion rule state: per-feature weights renormalized over the enabled
/// set, the blend ratio, and the enable mask
#[derive(Debug, Clone)]
pub struct FusionStage {
    weights: [f32; NUM_FUSED],
    voiced_weight: f32,
    enabled: [bool; NUM_FUSED],
    blend_alpha: f32,
}

/// Offline gate: the envelope must clear this multiple of the noise floor
const NOISE_GATE_FACTOR: f32 = 1.5;

/// Below this average confidence the offline score is damped
const LOW_CONFIDENCE: f32 = 0.3;

impl FusionStage {
    pub fn from_config(config: &SyllableConfig) -> Self {
        FusionStage {
            weights: [
                config.weight_peak_rate,
                config.weight_spectral_flux,
                config.weight_high_freq,
                config.weight_mfcc_delta,
                config.weight_wavelet,
            ],
            voiced_weight: config.weight_voiced_bonus,
            enabled: [
                true, // peak rate has no disable switch
                config.enable_spectral_flux,
                config.enable_high_freq_energy,
                config.enable_mfcc_delta,
                config.enable_wavelet,
            ],
            blend_alpha: config.fusion_blend_alpha,
        }
    }

    pub fn is_enabled(&self, k: usize) -> bool {
        self.enabled[k]
    }

    /// Effective weights: the configured weights scaled so the enabled
    /// ones (plus the voicing pseudo-feature) sum to one
    pub fn effective_weights(&self) -> ([f32; NUM_FUSED], f32) {
        let mut total = self.voiced_weight;
        for k in 0..NUM_FUSED {
            if self.enabled[k] {
                total += self.weights[k];
            }
        }
        if total <= 0.0 {
            return ([0.0; NUM_FUSED], 0.0);
        }

        let mut scaled = [0.0f32; NUM_FUSED];
        for k in 0..NUM_FUSED {
            if self.enabled[k] {
                scaled[k] = self.weights[k] / total;
            }
        }
        (scaled, self.voiced_weight / total)
    }

    /// Offline rule: alpha * max + (1 - alpha) * weighted average
    ///
    /// Voicing confidence joins the average as a pseudo-feature but never
    /// the max. Low statistics confidence damps the result so a fresh
    /// detector does not trigger off unsettled normalization.
    pub fn offline(&self, inputs: &FusionInputs, noise_floor: f32) -> f32 {
        if inputs.envelope < (NOISE_GATE_FACTOR * noise_floor).max(1e-6) {
            return 0.0;
        }

        let (weights, voiced_weight) = self.effective_weights();

        let mut avg = inputs.voicing_confidence * voiced_weight;
        let mut max = 0.0f32;
        for k in 0..NUM_FUSED {
            if !self.enabled[k] {
                continue;
            }
            let value = inputs.normalized[k];
            avg += value * weights[k];
            if value > max {
                max = value;
            }
        }

        let mut fusion = self.blend_alpha * max + (1.0 - self.blend_alpha) * avg;

        if inputs.avg_confidence < LOW_CONFIDENCE {
            fusion *= 0.5 + inputs.avg_confidence;
        }
        fusion
    }

    /// Realtime rule over ratios against the calibrated thresholds
    ///
    /// Only ratios above one participate. Their geometric mean G maps
    /// through 1 - 1/(1 + 0.5 G): several features must exceed their
    /// thresholds together before the score saturates toward one.
    pub fn realtime(&self, ratios: &[f32; NUM_FUSED], voicing_confidence: f32) -> f32 {
        let mut log_sum = 0.0f32;
        let mut active = 0u32;

        for k in 0..NUM_FUSED {
            if self.enabled[k] && ratios[k] > 1.0 {
                log_sum += ratios[k].ln();
                active += 1;
            }
        }
        if voicing_confidence > 0.5 {
            log_sum += (1.0 + voicing_confidence).ln();
            active += 1;
        }

        if active == 0 {
            return 0.0;
        }

        let geo_mean = (log_sum / active as f32).exp();
        1.0 - 1.0 / (1.0 + 0.5 * geo_mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> FusionStage {
        FusionStage::from_config(&SyllableConfig::default_for(16_000))
    }

    #[test]
    fn test_weights_renormalize_over_enabled() {
        let mut config = SyllableConfig::default_for(16_000);
        config.enable_mfcc_delta = false;
        config.enable_wavelet = false;

        let stage = FusionStage::from_config(&config);
        let (weights, voiced) = stage.effective_weights();

        let total: f32 = weights.iter().sum::<f32>() + voiced;
        assert!((total - 1.0).abs() < 1e-5);
        assert_eq!(weights[3], 0.0);
        assert_eq!(weights[4], 0.0);
    }

    #[test]
    fn test_all_enabled_weights_sum_to_one() {
        let (weights, voiced) = stage().effective_weights();
        let total: f32 = weights.iter().sum::<f32>() + voiced;
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_offline_noise_gate_zeroes_score() {
        let stage = stage();
        let inputs = FusionInputs {
            normalized: [1.0; NUM_FUSED],
            voicing_confidence: 1.0,
            envelope: 0.001,
            avg_confidence: 1.0,
        };
        assert_eq!(stage.offline(&inputs, 0.01), 0.0);
    }

    #[test]
    fn test_offline_blends_max_and_average() {
        let stage = stage();
        let mut normalized = [0.0; NUM_FUSED];
        normalized[0] = 1.0;

        let inputs = FusionInputs {
            normalized,
            voicing_confidence: 0.0,
            envelope: 0.5,
            avg_confidence: 1.0,
        };
        let fusion = stage.offline(&inputs, 0.0);

        // max = 1.0, avg = weight of peak rate alone
        let (weights, _) = stage.effective_weights();
        let expected = 0.6 * 1.0 + 0.4 * weights[0];
        assert!((fusion - expected).abs() < 1e-5);
    }

    #[test]
    fn test_offline_low_confidence_damps() {
        let stage = stage();
        let inputs = FusionInputs {
            normalized: [0.8; NUM_FUSED],
            voicing_confidence: 0.5,
            envelope: 0.5,
            avg_confidence: 1.0,
        };
        let settled = stage.offline(&inputs, 0.0);

        let fresh = FusionInputs {
            avg_confidence: 0.0,
            ..inputs
        };
        let damped = stage.offline(&fresh, 0.0);
        assert!((damped - settled * 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_realtime_empty_set_is_zero() {
        let stage = stage();
        assert_eq!(stage.realtime(&[0.5; NUM_FUSED], 0.0), 0.0);
    }

    #[test]
    fn test_realtime_single_ratio() {
        let stage = stage();
        let mut ratios = [0.0; NUM_FUSED];
        ratios[1] = 4.0;
        // G = 4 => 1 - 1/(1 + 2) = 2/3
        let fusion = stage.realtime(&ratios, 0.0);
        assert!((fusion - 2.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_realtime_saturates_below_one() {
        let stage = stage();
        let fusion = stage.realtime(&[1e6; NUM_FUSED], 1.0);
        assert!(fusion < 1.0);
        assert!(fusion > 0.99);
    }

    #[test]
    fn test_realtime_disabled_feature_excluded() {
        let mut config = SyllableConfig::default_for(16_000);
        config.enable_wavelet = false;
        let stage = FusionStage::from_config(&config);

        let mut ratios = [0.0; NUM_FUSED];
        ratios[4] = 100.0;
        assert_eq!(stage.realtime(&ratios, 0.0), 0.0);
    }

    #[test]
    fn test_realtime_voicing_pseudo_feature() {
        let stage = stage();
        // No ratios above threshold, but confident voicing alone scores
        let fusion = stage.realtime(&[0.5; NUM_FUSED], 0.9);
        assert!(fusion > 0.0);
        assert!(fusion < 0.6);
    }
}
