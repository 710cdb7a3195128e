// Event types
// The emitted syllable record, onset classification, and the explainable
// articulation feedback derived from a record

use serde::{Deserialize, Serialize};

/// Classification of the leading portion of a detected syllable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnsetType {
    /// Onset driven by glottal voicing (vowel or voiced consonant)
    Voiced,

    /// Onset without voicing (plosive burst, fricative)
    Unvoiced,

    /// Voiced onset with strong high-frequency content (voiced fricative)
    Mixed,
}

impl OnsetType {
    /// Human-readable name for feedback UIs
    pub fn display_name(&self) -> &'static str {
        match self {
            OnsetType::Voiced => "VOICED",
            OnsetType::Unvoiced => "UNVOICED",
            OnsetType::Mixed => "MIXED",
        }
    }
}

/// Articulation feedback derived from an event's feature profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feedback {
    /// The vowel onset rose slowly even though the syllable is prominent
    GradualVowelOnset,

    /// Neither spectral flux nor high-frequency energy marked the
    /// consonant release
    UnclearConsonantRelease,

    /// Strong, well-stressed syllable
    WellStressed,

    /// Nothing stands out either way
    Moderate,
}

impl Feedback {
    pub fn message(&self) -> &'static str {
        match self {
            Feedback::GradualVowelOnset => "Vowel onset is gradual - make it crisper",
            Feedback::UnclearConsonantRelease => "Consonant release unclear - articulate more",
            Feedback::WellStressed => "Good prominence - well stressed!",
            Feedback::Moderate => "Moderate prominence detected",
        }
    }
}

/// One detected syllable
///
/// A flat record: no heap handles, safely copyable, serializable. Feature
/// snapshots are taken at the moment of peak salience within the
/// syllable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyllableEvent {
    /// Sample index of the onset
    pub timestamp_samples: u64,

    /// Onset time in seconds
    pub time_seconds: f64,

    /// Peak envelope slope within the syllable
    pub peak_rate: f32,

    /// Spectral flux at peak salience
    pub spectral_flux: f32,

    /// High-frequency energy at peak salience
    pub high_freq_energy: f32,

    /// MFCC delta magnitude at peak salience
    pub mfcc_delta: f32,

    /// Wavelet transient score at peak salience
    pub wavelet_score: f32,

    /// Combined detection score at peak salience
    pub fusion_score: f32,

    /// Fundamental frequency near the onset (0 when unvoiced)
    pub f0: f32,

    /// F0 difference against the median of the contextual neighbors
    pub delta_f0: f32,

    /// Peak rate divided by rise time
    pub rise_slope: f32,

    /// Onset-to-offset duration in seconds
    pub duration_s: f32,

    /// Envelope energy integrated over the syllable
    pub energy: f32,

    /// Voicing classification of the onset
    pub onset_type: OnsetType,

    /// Context-relative prominence (1.0 is "as prominent as neighbors")
    pub prominence_score: f32,

    /// Whether the syllable is accented relative to its context
    pub is_accented: bool,
}

impl SyllableEvent {
    /// Zeroed record used while a syllable is under construction
    pub(crate) fn empty() -> Self {
        SyllableEvent {
            timestamp_samples: 0,
            time_seconds: 0.0,
            peak_rate: 0.0,
            spectral_flux: 0.0,
            high_freq_energy: 0.0,
            mfcc_delta: 0.0,
            wavelet_score: 0.0,
            fusion_score: 0.0,
            f0: 0.0,
            delta_f0: 0.0,
            rise_slope: 0.0,
            duration_s: 0.0,
            energy: 0.0,
            onset_type: OnsetType::Voiced,
            prominence_score: 0.0,
            is_accented: false,
        }
    }

    /// Classify the event into articulation feedback
    ///
    /// Thresholds operate on the raw feature snapshots the same way the
    /// realtime feedback console does.
    pub fn feedback(&self) -> Feedback {
        if self.peak_rate < 0.4 && self.prominence_score > 0.5 {
            Feedback::GradualVowelOnset
        } else if self.spectral_flux < 0.3 && self.high_freq_energy < 0.3 {
            Feedback::UnclearConsonantRelease
        } else if self.prominence_score > 0.7 {
            Feedback::WellStressed
        } else {
            Feedback::Moderate
        }
    }

    /// Serialize to a JSON line (with trailing newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onset_type_display_names() {
        assert_eq!(OnsetType::Voiced.display_name(), "VOICED");
        assert_eq!(OnsetType::Unvoiced.display_name(), "UNVOICED");
        assert_eq!(OnsetType::Mixed.display_name(), "MIXED");
    }

    #[test]
    fn test_event_json_round_trip() {
        let mut event = SyllableEvent::empty();
        event.timestamp_samples = 12_345;
        event.time_seconds = 0.771_562_5;
        event.f0 = 182.5;
        event.onset_type = OnsetType::Mixed;
        event.is_accented = true;

        let line = event.to_json_line().unwrap();
        assert!(line.ends_with('\n'));

        let back: SyllableEvent = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(back.timestamp_samples, 12_345);
        assert_eq!(back.onset_type, OnsetType::Mixed);
        assert!(back.is_accented);
    }

    #[test]
    fn test_feedback_gradual_onset() {
        let mut event = SyllableEvent::empty();
        event.peak_rate = 0.1;
        event.prominence_score = 0.8;
        event.spectral_flux = 0.5;
        assert_eq!(event.feedback(), Feedback::GradualVowelOnset);
    }

    #[test]
    fn test_feedback_unclear_release() {
        let mut event = SyllableEvent::empty();
        event.peak_rate = 0.9;
        event.spectral_flux = 0.1;
        event.high_freq_energy = 0.1;
        event.prominence_score = 0.4;
        assert_eq!(event.feedback(), Feedback::UnclearConsonantRelease);
    }

    #[test]
    fn test_feedback_well_stressed() {
        let mut event = SyllableEvent::empty();
        event.peak_rate = 0.9;
        event.spectral_flux = 0.6;
        event.high_freq_energy = 0.5;
        event.prominence_score = 0.9;
        assert_eq!(event.feedback(), Feedback::WellStressed);
    }
}
