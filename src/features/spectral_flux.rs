// Spectral flux and flatness
// Framed magnitude-spectrum differencing: half-wave rectified flux for
// onset transients (including unvoiced consonants), plus spectral
// flatness and its Weber ratio as a harmonicity-change signal.

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Framed spectral-flux extractor
///
/// Samples accumulate into a ring buffer; every `hop_size` samples a
/// Hann-windowed frame is transformed and compared against the previous
/// magnitude spectrum:
///
///   flux = sum_k max(0, |X_n[k]| - |X_{n-1}[k]|)^2 / n_bins
///
/// The DC bin is discarded throughout.
pub struct SpectralFlux {
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
    prev_magnitude: Vec<f32>,
    curr_magnitude: Vec<f32>,

    current_flux: f32,
    current_flatness: f32,
    prev_flatness: f32,
    flatness_weber: f32,
}

pub(crate) fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0
                - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

impl SpectralFlux {
    pub fn new(fft_size: usize, hop_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let spectrum = fft.make_output_vec();
        let n_bins = spectrum.len();

        SpectralFlux {
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
            prev_magnitude: vec![0.0; n_bins],
            curr_magnitude: vec![0.0; n_bins],
            current_flux: 0.0,
            current_flatness: 0.0,
            prev_flatness: 0.0,
            flatness_weber: 0.0,
        }
    }

    /// Feed one sample; returns `Some(flux)` when a frame completed
    pub fn process(&mut self, sample: f32) -> Option<f32> {
        self.input_ring[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.fft_size;
        self.samples_since_hop += 1;

        if self.samples_since_hop < self.hop_size {
            return None;
        }
        self.samples_since_hop = 0;
        self.current_flux = self.compute_frame();
        Some(self.current_flux)
    }

    fn compute_frame(&mut self) -> f32 {
        // Unroll the ring so frame[0] is the oldest sample
        for i in 0..self.fft_size {
            let idx = (self.write_pos + i) % self.fft_size;
            self.frame[i] = self.input_ring[idx] * self.window[i];
        }

        self.fft.process(&mut self.frame, &mut self.spectrum).unwrap();

        // Magnitudes and spectral flatness in one pass (DC excluded)
        let mut log_sum = 0.0f32;
        let mut arith_sum = 0.0f32;
        let mut valid_bins = 0u32;
        for k in 1..self.n_bins {
            let mag = self.spectrum[k].norm();
            self.curr_magnitude[k] = mag;
            if mag > 1e-10 {
                log_sum += mag.ln();
                arith_sum += mag;
                valid_bins += 1;
            }
        }
        self.curr_magnitude[0] = 0.0;

        // Flatness = geometric mean / arithmetic mean: 0 harmonic, 1 noise
        let flatness = if valid_bins > 0 && arith_sum > 1e-10 {
            let geom = (log_sum / valid_bins as f32).exp();
            let arith = arith_sum / valid_bins as f32;
            (geom / arith).min(1.0)
        } else {
            0.0
        };

        // Weber ratio of the flatness change: negative means the frame is
        // becoming more harmonic, a vowel-onset cue
        self.flatness_weber = (flatness - self.prev_flatness) / (self.prev_flatness + 0.01);
        self.prev_flatness = flatness;
        self.current_flatness = flatness;

        let mut flux = 0.0f32;
        for k in 1..self.n_bins {
            let diff = self.curr_magnitude[k] - self.prev_magnitude[k];
            if diff > 0.0 {
                flux += diff * diff;
            }
        }
        flux /= self.n_bins as f32;

        std::mem::swap(&mut self.prev_magnitude, &mut self.curr_magnitude);

        flux
    }

    /// Most recent flux value (held between frames)
    pub fn current(&self) -> f32 {
        self.current_flux
    }

    /// Most recent spectral flatness in [0, 1]
    pub fn flatness(&self) -> f32 {
        self.current_flatness
    }

    /// Weber ratio of the last flatness change
    pub fn flatness_weber(&self) -> f32 {
        self.flatness_weber
    }

    pub fn reset(&mut self) {
        self.input_ring.fill(0.0);
        self.prev_magnitude.fill(0.0);
        self.curr_magnitude.fill(0.0);
        self.write_pos = 0;
        self.samples_since_hop = 0;
        self.current_flux = 0.0;
        self.current_flatness = 0.0;
        self.prev_flatness = 0.0;
        self.flatness_weber = 0.0;
    }
}
