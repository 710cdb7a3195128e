// DSP primitives
// Small stateful filters shared by the feature extractors. Each holds its
// own state so many detectors can run side by side without interaction.

pub mod agc;
pub mod biquad;
pub mod envelope;
pub mod zff;

pub use agc::Agc;
pub use biquad::Biquad;
pub use envelope::EnvelopeFollower;
pub use zff::ZeroFreqResonator;
