// Mel-cepstral delta
// Framed pipeline: window -> FFT -> power spectrum -> triangular Mel
// filterbank -> log -> DCT-II. The L2 norm of the frame-to-frame
// coefficient difference flags timbre changes at phoneme transitions.

use crate::features::spectral_flux::hann_window;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

pub const NUM_FILTERS: usize = 26;
pub const NUM_COEFFS: usize = 13;

/// Low edge of the Mel filterbank in Hz
const MEL_LOW_HZ: f32 = 80.0;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

struct MelFilter {
    start: usize,
    end: usize,
    weights: Vec<f32>,
}

/// Framed MFCC extractor emitting the delta magnitude per hop
pub struct MelCepstrum {
    fft: Arc<dyn RealToComplex<f32>>,
    fft_size: usize,
    hop_size: usize,
    n_bins: usize,

    input_ring: Vec<f32>,
    write_pos: usize,
    samples_since_hop: usize,

    window: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    power: Vec<f32>,

    filters: Vec<MelFilter>,
    mel_energies: [f32; NUM_FILTERS],
    dct: Vec<f32>,

    coeffs: [f32; NUM_COEFFS],
    prev_coeffs: [f32; NUM_COEFFS],
    delta_magnitude: f32,
}

impl MelCepstrum {
    pub fn new(sample_rate: u32, fft_size: usize, hop_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let spectrum = fft.make_output_vec();
        let n_bins = spectrum.len();

        MelCepstrum {
            fft,
            fft_size,
            hop_size,
            n_bins,
            input_ring: vec![0.0; fft_size],
            write_pos: 0,
            samples_since_hop: 0,
            window: hann_window(fft_size),
            frame: vec![0.0; fft_size],
            spectrum,
            power: vec![0.0; n_bins],
            filters: build_filterbank(sample_rate, fft_size, n_bins),
            mel_energies: [0.0; NUM_FILTERS],
            dct: build_dct_matrix(),
            coeffs: [0.0; NUM_COEFFS],
            prev_coeffs: [0.0; NUM_COEFFS],
            delta_magnitude: 0.0,
        }
    }

    /// Feed one sample; returns `Some(delta)` when a frame completed
    pub fn process(&mut self, sample: f32) -> Option<f32> {
        self.input_ring[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.fft_size;
        self.samples_since_hop += 1;

        if self.samples_since_hop < self.hop_size {
            return None;
        }
        self.samples_since_hop = 0;
        self.compute_frame();
        Some(self.delta_magnitude)
    }

    fn compute_frame(&mut self) {
        for i in 0..self.fft_size {
            let idx = (self.write_pos + i) % self.fft_size;
            self.frame[i] = self.input_ring[idx] * self.window[i];
        }

        self.fft.process(&mut self.frame, &mut self.spectrum).unwrap();

        for k in 0..self.n_bins {
            self.power[k] = self.spectrum[k].norm_sqr();
        }

        for (f, filter) in self.filters.iter().enumerate() {
            let mut energy = 0.0f32;
            for k in filter.start..=filter.end {
                energy += self.power[k] * filter.weights[k - filter.start];
            }
            // Log compression; epsilon keeps empty bands finite
            self.mel_energies[f] = (energy + 1e-10).ln();
        }

        self.prev_coeffs = self.coeffs;

        for i in 0..NUM_COEFFS {
            let row = &self.dct[i * NUM_FILTERS..(i + 1) * NUM_FILTERS];
            self.coeffs[i] = row
                .iter()
                .zip(self.mel_energies.iter())
                .map(|(d, e)| d * e)
                .sum();
        }

        let delta_sum: f32 = self
            .coeffs
            .iter()
            .zip(self.prev_coeffs.iter())
            .map(|(c, p)| (c - p) * (c - p))
            .sum();
        self.delta_magnitude = delta_sum.sqrt();
    }

    /// Most recent delta magnitude (held between frames)
    pub fn current(&self) -> f32 {
        self.delta_magnitude
    }

    /// Most recent cepstral coefficients
    pub fn coeffs(&self) -> &[f32; NUM_COEFFS] {
        &self.coeffs
    }

    pub fn reset(&mut self) {
        self.input_ring.fill(0.0);
        self.write_pos = 0;
        self.samples_since_hop = 0;
        self.coeffs = [0.0; NUM_COEFFS];
        self.prev_coeffs = [0.0; NUM_COEFFS];
        self.delta_magnitude = 0.0;
    }
}

fn build_filterbank(sample_rate: u32, fft_size: usize, n_bins: usize) -> Vec<MelFilter> {
    let mel_low = hz_to_mel(MEL_LOW_HZ);
    let mel_high = hz_to_mel(sample_rate as f32 / 2.0);
    let bin_width = sample_rate as f32 / fft_size as f32;

    // Equally spaced points on the Mel scale, mapped back to FFT bins
    let points: Vec<usize> = (0..NUM_FILTERS + 2)
        .map(|i| {
            let mel = mel_low + (mel_high - mel_low) * i as f32 / (NUM_FILTERS + 1) as f32;
            let bin = (mel_to_hz(mel) / bin_width + 0.5) as usize;
            bin.min(n_bins - 1)
        })
        .collect();

    (0..NUM_FILTERS)
        .map(|f| {
            let start = points[f];
            let center = points[f + 1];
            let end = points[f + 2];

            let weights = (start..=end)
                .map(|k| {
                    if k <= center {
                        (k - start) as f32 / (center - start + 1) as f32
                    } else {
                        (end - k) as f32 / (end - center + 1) as f32
                    }
                })
                .collect();

            MelFilter {
                start,
                end,
                weights,
            }
        })
        .collect()
}

fn build_dct_matrix() -> Vec<f32> {
    let scale = (2.0 / NUM_FILTERS as f32).sqrt();
    let mut dct = vec![0.0f32; NUM_COEFFS * NUM_FILTERS];
    for i in 0..NUM_COEFFS {
        for j in 0..NUM_FILTERS {
            dct[i * NUM_FILTERS + j] = scale
                * (std::f32::consts::PI * i as f32 * (j as f32 + 0.5) / NUM_FILTERS as f32)
                    .cos();
        }
    }
    dct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_once_per_hop() {
        let mut mfcc = MelCepstrum::new(16_000, 512, 256);
        let mut frames = 0;
        for _ in 0..2560 {
            if mfcc.process(0.0).is_some() {
                frames += 1;
            }
        }
        assert_eq!(frames, 10);
    }

    #[test]
    fn test_steady_input_delta_settles() {
        let mut mfcc = MelCepstrum::new(16_000, 512, 256);
        let mut last_delta = f32::MAX;
        for i in 0..32_000 {
            let s = 0.5 * (2.0 * std::f32::consts::PI * 500.0 * i as f32 / 16_000.0).sin();
            if let Some(d) = mfcc.process(s) {
                last_delta = d;
            }
        }
        // Identical frames produce near-zero cepstral movement
        assert!(last_delta < 0.5);
    }

    #[test]
    fn test_timbre_change_spikes_delta() {
        let mut mfcc = MelCepstrum::new(16_000, 512, 256);

        let mut steady_max = 0.0f32;
        for i in 0..16_000 {
            let s = 0.5 * (2.0 * std::f32::consts::PI * 400.0 * i as f32 / 16_000.0).sin();
            if let Some(d) = mfcc.process(s) {
                if i > 8_000 {
                    steady_max = steady_max.max(d);
                }
            }
        }

        // Switch timbre: different partial structure
        let mut change_max = 0.0f32;
        for i in 0..4_000 {
            let t = i as f32 / 16_000.0;
            let s = 0.3 * (2.0 * std::f32::consts::PI * 1200.0 * t).sin()
                + 0.3 * (2.0 * std::f32::consts::PI * 3000.0 * t).sin();
            if let Some(d) = mfcc.process(s) {
                change_max = change_max.max(d);
            }
        }
        assert!(change_max > steady_max);
    }

    #[test]
    fn test_filterbank_covers_spectrum_in_order() {
        let filters = build_filterbank(16_000, 512, 257);
        assert_eq!(filters.len(), NUM_FILTERS);
        for pair in filters.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
        assert!(filters[0].start >= 1);
        assert!(filters[NUM_FILTERS - 1].end <= 256);
    }
}
