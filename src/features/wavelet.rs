// Morlet wavelet transient score
// A small log-spaced bank of complex Morlet kernels convolved against the
// input history. Rapid energy increase across scales marks a burst; the
// Weber-normalized change makes the score level-independent.

/// One analysis scale: a unit-energy complex Morlet kernel and its
/// convolution history
///
/// Real and imaginary parts are kept as separate tables rather than a
/// complex type so the inner product stays SIMD-friendly.
#[derive(Debug, Clone)]
struct MorletScale {
    kernel_re: Vec<f32>,
    kernel_im: Vec<f32>,
    history: Vec<f32>,
    history_idx: usize,
    current_energy: f32,
    prev_energy: f32,
}

/// Standard Morlet frequency parameter
const OMEGA0: f32 = 6.0;
const MAX_KERNEL_SIZE: usize = 128;
const MIN_KERNEL_SIZE: usize = 5;

impl MorletScale {
    fn new(freq_hz: f32, sample_rate: u32) -> Self {
        let dt = 1.0 / sample_rate as f32;

        // Scale relates to frequency via f = w0 / (2 pi s)
        let scale = OMEGA0 / (2.0 * std::f32::consts::PI * freq_hz);

        // Effective support ~6 sigma; odd length for symmetry
        let mut kernel_size = (6.0 * scale * sample_rate as f32) as usize;
        if kernel_size % 2 == 0 {
            kernel_size += 1;
        }
        let kernel_size = kernel_size.clamp(MIN_KERNEL_SIZE, MAX_KERNEL_SIZE);

        let center = kernel_size / 2;
        let mut kernel_re = Vec::with_capacity(kernel_size);
        let mut kernel_im = Vec::with_capacity(kernel_size);
        let mut energy = 0.0f32;

        for i in 0..kernel_size {
            let t = (i as isize - center as isize) as f32 * dt;
            let t_scaled = t / scale;
            let envelope = (-0.5 * t_scaled * t_scaled).exp();
            let phase = 2.0 * std::f32::consts::PI * freq_hz * t;

            let re = envelope * phase.cos();
            let im = envelope * phase.sin();
            energy += re * re + im * im;
            kernel_re.push(re);
            kernel_im.push(im);
        }

        // Unit-energy normalization
        let norm = energy.sqrt();
        for i in 0..kernel_size {
            kernel_re[i] /= norm;
            kernel_im[i] /= norm;
        }

        MorletScale {
            kernel_re,
            kernel_im,
            history: vec![0.0; kernel_size],
            history_idx: 0,
            current_energy: 0.0,
            prev_energy: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, sample: f32) -> f32 {
        let size = self.history.len();
        self.history[self.history_idx] = sample;
        let newest = self.history_idx;
        self.history_idx = (self.history_idx + 1) % size;

        // Inner product against the history, newest sample first
        let mut re_sum = 0.0f32;
        let mut im_sum = 0.0f32;
        for k in 0..size {
            let h_idx = if newest >= k { newest - k } else { newest + size - k };
            let val = self.history[h_idx];
            re_sum += val * self.kernel_re[k];
            im_sum += val * self.kernel_im[k];
        }

        self.prev_energy = self.current_energy;
        self.current_energy = re_sum * re_sum + im_sum * im_sum;
        self.current_energy
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        self.history_idx = 0;
        self.current_energy = 0.0;
        self.prev_energy = 0.0;
    }
}

/// Log-spaced Morlet bank producing a per-sample transient score
#[derive(Debug, Clone)]
pub struct WaveletBank {
    scales: Vec<MorletScale>,
}

impl WaveletBank {
    pub fn new(sample_rate: u32, min_freq: f32, max_freq: f32, num_scales: usize) -> Self {
        let log_min = min_freq.ln();
        let log_max = max_freq.ln();
        let log_step = (log_max - log_min) / (num_scales.max(2) - 1) as f32;

        let scales = (0..num_scales)
            .map(|i| MorletScale::new((log_min + i as f32 * log_step).exp(), sample_rate))
            .collect();

        WaveletBank { scales }
    }

    /// Mean positive relative energy change across scales
    ///
    /// Only scales whose energy increased this sample contribute; the
    /// denominator is the total scale count so a lone noisy scale cannot
    /// saturate the score.
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let mut score = 0.0f32;
        for scale in &mut self.scales {
            let energy = scale.process(sample);
            let diff = energy - scale.prev_energy;
            if diff > 0.0 {
                score += diff / (scale.prev_energy + 1e-6);
            }
        }
        score / self.scales.len() as f32
    }

    /// Instantaneous energy of one scale, for inspection
    pub fn scale_energy(&self, idx: usize) -> f32 {
        self.scales.get(idx).map_or(0.0, |s| s.current_energy)
    }

    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }

    pub fn reset(&mut self) {
        for scale in &mut self.scales {
            scale.reset();
        }
    }
}
