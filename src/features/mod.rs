// Feature extractors
// One extractor per acoustic correlate of a syllable onset. Per-sample
// extractors produce a value every sample; framed extractors produce one
// value per hop and hold it between frames.

pub mod energy;
pub mod high_freq;
pub mod mfcc;
pub mod peak_rate;
pub mod spectral_flux;
pub mod wavelet;

pub use energy::{LocalEnergyRatio, TeagerEnergy};
pub use high_freq::HighFreqEnergy;
pub use mfcc::MelCepstrum;
pub use peak_rate::PeakRate;
pub use spectral_flux::SpectralFlux;
pub use wavelet::WaveletBank;
