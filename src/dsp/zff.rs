// Zero-frequency resonator
// Leaky double integrator followed by trailing moving-average subtraction.
// Positive-going zero crossings of the output coincide with glottal
// closure instants (Murty & Yegnanarayana epoch extraction).

/// Zero-frequency resonator with trend removal
///
/// A pure double integrator diverges; the 0.999 leak turns it into a
/// finite-Q resonator at 0 Hz, and subtracting the trailing mean over a
/// pitch-period-scale window removes the residual drift.
#[derive(Debug, Clone)]
pub struct ZeroFreqResonator {
    // f64 accumulators: the integrators sum millions of samples
    int1: f64,
    int2: f64,

    trend: Vec<f32>,
    trend_pos: usize,
    trend_accum: f64,
}

const LEAK: f64 = 0.999;

impl ZeroFreqResonator {
    pub fn new(sample_rate: u32, trend_window_ms: f32) -> Self {
        let window = ((sample_rate as f32 * trend_window_ms * 0.001) as usize).max(1);
        ZeroFreqResonator {
            int1: 0.0,
            int2: 0.0,
            trend: vec![0.0; window],
            trend_pos: 0,
            trend_accum: 0.0,
        }
    }

    /// Feed one sample, returning the trend-removed resonator output
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.int1 = self.int1 * LEAK + input as f64;
        self.int2 = self.int2 * LEAK + self.int1;

        let val = self.int2 as f32;

        let old = self.trend[self.trend_pos];
        self.trend[self.trend_pos] = val;
        self.trend_accum += (val - old) as f64;
        self.trend_pos += 1;
        if self.trend_pos >= self.trend.len() {
            self.trend_pos = 0;
        }

        val - (self.trend_accum / self.trend.len() as f64) as f32
    }

    pub fn reset(&mut self) {
        self.int1 = 0.0;
        self.int2 = 0.0;
        self.trend.fill(0.0);
        self.trend_pos = 0;
        self.trend_accum = 0.0;
    }
}
