//! Energy-based reference detector.
//!
//! Maps chunk RMS energy to a probability in [0, 1]:
//! log-energy → running mean/variance normalization (EWMA) → z-score →
//! scaled sigmoid → EMA smoothing. Self-normalizing, so it adapts to the
//! ambient level of whatever source feeds it.

use crate::detect::Detector;

/// Configuration for the energy detector.
#[derive(Debug, Clone, Copy)]
pub struct EnergyDetectorConfig {
    /// Floor added under RMS and variance to keep log/sqrt in domain.
    pub eps: f32,
    /// EWMA coefficient for the running log-energy statistics.
    pub norm_alpha: f32,
    /// Lower bound on the tracked variance.
    pub var_floor: f32,
    /// Sigmoid steepness applied to the z-score.
    pub sigmoid_k: f32,
    /// Z-score offset; raises how unusual a chunk must be to score high.
    pub sigmoid_bias: f32,
    /// EMA coefficient for the output probability.
    pub p_ema_alpha: f32,
}

impl Default for EnergyDetectorConfig {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            norm_alpha: 0.05,
            var_floor: 1e-4,
            sigmoid_k: 2.0,
            sigmoid_bias: 1.0,
            p_ema_alpha: 0.2,
        }
    }
}

/// Adaptive energy detector producing a smoothed probability per chunk.
#[derive(Debug)]
pub struct EnergyDetector {
    config: EnergyDetectorConfig,
    mean: f32,
    var: f32,
    stats_init: bool,
    p_smooth: f32,
}

impl EnergyDetector {
    pub fn new(config: EnergyDetectorConfig) -> Self {
        Self {
            config,
            mean: 0.0,
            var: 1.0,
            stats_init: false,
            p_smooth: 0.0,
        }
    }

    fn log_energy(&self, mono: &[f32]) -> f32 {
        let sum2: f64 = mono.iter().map(|&s| s as f64 * s as f64).sum();
        let mean2 = sum2 / mono.len() as f64;
        let rms = (mean2 + self.config.eps as f64).sqrt();
        (rms + self.config.eps as f64).ln() as f32
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(EnergyDetectorConfig::default())
    }
}

impl Detector for EnergyDetector {
    fn process(&mut self, mono: &[f32]) -> f32 {
        if mono.is_empty() {
            return self.p_smooth;
        }

        let loge = self.log_energy(mono);

        if !self.stats_init {
            self.mean = loge;
            self.var = 1.0;
            self.stats_init = true;
        } else {
            let a = self.config.norm_alpha.clamp(0.0001, 0.5);
            let diff = loge - self.mean;
            self.mean = (1.0 - a) * self.mean + a * loge;
            self.var = ((1.0 - a) * self.var + a * diff * diff).max(self.config.var_floor);
        }

        let z = (loge - self.mean) / (self.var + self.config.eps).sqrt();
        let x = self.config.sigmoid_k * (z - self.config.sigmoid_bias);
        let p_raw = 1.0 / (1.0 + (-x).exp());

        let pa = self.config.p_ema_alpha.clamp(0.01, 0.99);
        self.p_smooth = (1.0 - pa) * self.p_smooth + pa * p_raw;
        self.p_smooth
    }

    fn reset(&mut self) {
        self.mean = 0.0;
        self.var = 1.0;
        self.stats_init = false;
        self.p_smooth = 0.0;
    }
}
