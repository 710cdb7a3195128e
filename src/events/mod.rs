// Event module
// The emitted syllable record and the context buffer that scores
// prominence before events leave the detector

pub mod prominence;
pub mod types;

pub use prominence::EventRing;
pub use types::{Feedback, OnsetType, SyllableEvent};
