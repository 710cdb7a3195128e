// Second-order IIR filter
// RBJ-cookbook bandpass and bilinear-transform Butterworth high-pass,
// processed in Direct Form I with denormal flushing

use std::f32::consts::PI;

/// Direct Form I biquad section
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,

    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Bandpass with constant skirt gain (peak gain = Q), RBJ cookbook
    pub fn bandpass(sample_rate: f32, center_hz: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * center_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * w0.cos();
        let a2 = 1.0 - alpha;

        let inv_a0 = 1.0 / a0;
        Biquad {
            b0: b0 * inv_a0,
            b1: b1 * inv_a0,
            b2: b2 * inv_a0,
            a1: a1 * inv_a0,
            a2: a2 * inv_a0,
            ..Default::default()
        }
    }

    /// Second-order Butterworth high-pass via the bilinear transform
    pub fn highpass(sample_rate: f32, cutoff_hz: f32) -> Self {
        // Pre-warp the cutoff frequency
        let wc = (PI * cutoff_hz / sample_rate).tan();
        let wc2 = wc * wc;
        let sqrt2 = std::f32::consts::SQRT_2;

        let k = 1.0 + sqrt2 * wc + wc2;
        Biquad {
            b0: 1.0 / k,
            b1: -2.0 / k,
            b2: 1.0 / k,
            a1: 2.0 * (wc2 - 1.0) / k,
            a2: (1.0 - sqrt2 * wc + wc2) / k,
            ..Default::default()
        }
    }

    /// Run one sample through the section
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let mut out = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        // Flush denormals
        if out.abs() < 1.0e-15 {
            out = 0.0;
        }

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = out;

        out
    }

    /// Zero the delay line, keeping coefficients
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_bandpass_passes_center_rejects_far() {
        let sr = 16_000.0;
        let mut at_center = Biquad::bandpass(sr, 1850.0, 0.7);
        let mut far_below = Biquad::bandpass(sr, 1850.0, 0.7);

        let center_out: Vec<f32> = sine(1850.0, sr, 8000)
            .iter()
            .map(|&s| at_center.process(s))
            .collect();
        let low_out: Vec<f32> = sine(60.0, sr, 8000)
            .iter()
            .map(|&s| far_below.process(s))
            .collect();

        // Skip the transient, compare steady-state response
        assert!(rms(&center_out[4000..]) > 3.0 * rms(&low_out[4000..]));
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut hp = Biquad::highpass(16_000.0, 2000.0);
        let out: Vec<f32> = std::iter::repeat(1.0f32)
            .take(4000)
            .map(|s| hp.process(s))
            .collect();
        assert!(out[3999].abs() < 1e-4);
    }

    #[test]
    fn test_highpass_passes_high_frequency() {
        let sr = 16_000.0;
        let mut hp = Biquad::highpass(sr, 2000.0);
        let out: Vec<f32> = sine(6000.0, sr, 8000).iter().map(|&s| hp.process(s)).collect();
        assert!(rms(&out[4000..]) > 0.5);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut f = Biquad::bandpass(16_000.0, 1000.0, 1.0);
        for i in 0..100 {
            f.process((i as f32 * 0.01).sin());
        }
        f.reset();
        // After reset a zero input yields exactly zero output
        assert_eq!(f.process(0.0), 0.0);
    }
}
