//! Streaming feature extractor.
//!
//! Turns mono PCM into fixed-length mel-energy frames with adaptive per-band
//! gain compression: each band's instantaneous energy is divided by a slow
//! moving average of that band before a power-law compression, flattening
//! background drift while preserving fast transients.

use crate::config::{Config, FeaturesConfig};
use crate::defaults;
use crate::dsp::mel::{MelConfig, MelFilterbank};
use crate::error::{EarwatchError, Result};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

/// Configuration for the feature extractor.
#[derive(Debug, Clone, Copy)]
pub struct ExtractorConfig {
    pub sample_rate: u32,
    /// Transform size, must be a power of two.
    pub n_fft: usize,
    /// Samples per analysis window, at most `n_fft`.
    pub win_length: usize,
    /// Samples advanced between frames, at most `win_length`.
    pub hop_length: usize,
    pub n_mels: usize,
    pub f_min: f32,
    pub f_max: f32,

    /// Stabilizer added to the moving average before exponentiation.
    pub eps: f32,
    /// Gain exponent applied to the moving average.
    pub alpha: f32,
    /// Compression bias.
    pub delta: f32,
    /// Compression root exponent.
    pub r: f32,
    /// Moving-average smoothing coefficient in (0, 1].
    pub smoothing: f32,
    /// Floor applied to power and band energies.
    pub floor: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            n_fft: defaults::N_FFT,
            win_length: defaults::WIN_LENGTH,
            hop_length: defaults::HOP_LENGTH,
            n_mels: defaults::N_MELS,
            f_min: defaults::F_MIN,
            f_max: defaults::F_MAX,
            eps: defaults::PCEN_EPS,
            alpha: defaults::PCEN_ALPHA,
            delta: defaults::PCEN_DELTA,
            r: defaults::PCEN_R,
            smoothing: defaults::PCEN_SMOOTHING,
            floor: defaults::POWER_FLOOR,
        }
    }
}

impl ExtractorConfig {
    /// Builds an extractor configuration from the top-level config.
    pub fn from_config(config: &Config) -> Self {
        let f: &FeaturesConfig = &config.features;
        Self {
            sample_rate: config.audio.sample_rate,
            n_fft: f.n_fft,
            win_length: f.win_length,
            hop_length: f.hop_length,
            n_mels: f.n_mels,
            f_min: f.f_min,
            f_max: f.f_max,
            alpha: f.alpha,
            delta: f.delta,
            r: f.r,
            smoothing: f.smoothing,
            ..Self::default()
        }
    }
}

/// Streaming extractor: feed mono PCM, get mel frames at the hop rate.
///
/// Stateful and single-writer: the per-band moving average persists across
/// calls, so identical input fed to a fresh instance is reproducible, but
/// concurrent calls require external serialization.
pub struct FeatureExtractor {
    config: ExtractorConfig,
    mel: MelFilterbank,
    fft: Arc<dyn Fft<f32>>,

    fifo: VecDeque<f32>,
    window: Vec<f32>,
    fft_buf: Vec<Complex<f32>>,
    power: Vec<f32>,
    mel_energy: Vec<f32>,
    /// Per-band moving average `M`.
    band_mean: Vec<f32>,
    frame: Vec<f32>,
}

impl FeatureExtractor {
    /// Creates an extractor, rejecting configurations that would produce
    /// NaN/Inf or an unconsumable sample queue.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        fn invalid(key: &str, message: &str) -> EarwatchError {
            EarwatchError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if config.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be positive"));
        }
        if !config.n_fft.is_power_of_two() {
            return Err(invalid("n_fft", "must be a power of two"));
        }
        if config.win_length < 2 || config.win_length > config.n_fft {
            return Err(invalid("win_length", "must be in 2..=n_fft"));
        }
        if config.hop_length == 0 || config.hop_length > config.win_length {
            return Err(invalid("hop_length", "must be in 1..=win_length"));
        }
        if config.n_mels == 0 {
            return Err(invalid("n_mels", "must be positive"));
        }
        if config.f_min < 0.0 || config.f_min >= config.f_max {
            return Err(invalid("f_min", "must be in 0.0..f_max"));
        }
        if config.f_max > config.sample_rate as f32 / 2.0 {
            return Err(invalid("f_max", "must not exceed the Nyquist frequency"));
        }
        if !(config.smoothing > 0.0 && config.smoothing <= 1.0) {
            return Err(invalid("smoothing", "must be in (0.0, 1.0]"));
        }

        let mel = MelFilterbank::new(MelConfig {
            sample_rate: config.sample_rate,
            n_fft: config.n_fft,
            n_mels: config.n_mels,
            f_min: config.f_min,
            f_max: config.f_max,
        });

        let fft = FftPlanner::new().plan_fft_forward(config.n_fft);

        // Hann over win_length; the frame is zero-padded to n_fft.
        let denom = (config.win_length - 1) as f32;
        let window = (0..config.win_length)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
            .collect();

        Ok(Self {
            fifo: VecDeque::new(),
            window,
            fft_buf: vec![Complex::new(0.0, 0.0); config.n_fft],
            power: vec![0.0; config.n_fft / 2 + 1],
            mel_energy: vec![0.0; config.n_mels],
            band_mean: vec![0.0; config.n_mels],
            frame: vec![0.0; config.n_mels],
            mel,
            fft,
            config,
        })
    }

    pub fn n_mels(&self) -> usize {
        self.config.n_mels
    }

    /// Duration of one hop in nanoseconds.
    pub fn hop_ns(&self) -> i64 {
        self.config.hop_length as i64 * 1_000_000_000 / self.config.sample_rate as i64
    }

    /// Pushes mono samples and appends produced frames to `out_frames`
    /// row-major (`frame0[n_mels], frame1[n_mels], ...`).
    ///
    /// Returns the number of frames produced. One frame is produced per
    /// `hop_length` samples once `win_length` samples are buffered; exactly
    /// `hop_length` samples are dropped per frame, never unconsumed ones.
    pub fn process(&mut self, mono: &[f32], out_frames: &mut Vec<f32>) -> usize {
        self.fifo.extend(mono.iter().copied());

        let mut produced = 0;
        while self.fifo.len() >= self.config.win_length {
            self.one_frame();
            out_frames.extend_from_slice(&self.frame);
            produced += 1;

            self.fifo.drain(..self.config.hop_length);
        }
        produced
    }

    /// Clears buffered samples and the per-band moving average.
    pub fn reset(&mut self) {
        self.fifo.clear();
        self.band_mean.fill(0.0);
    }

    fn one_frame(&mut self) {
        let cfg = &self.config;

        // Windowed samples into the transform buffer, zero-padded to n_fft.
        self.fft_buf.fill(Complex::new(0.0, 0.0));
        for (i, (slot, w)) in self.fft_buf.iter_mut().zip(self.window.iter()).enumerate() {
            slot.re = self.fifo[i] * w;
        }

        self.fft.process(&mut self.fft_buf);

        // One-sided power spectrum with mild 1/n scaling, floored before
        // any log/pow downstream.
        let inv_n = 1.0 / cfg.n_fft as f32;
        for (k, p) in self.power.iter_mut().enumerate() {
            let c = self.fft_buf[k] * inv_n;
            *p = (c.re * c.re + c.im * c.im).max(cfg.floor);
        }

        self.mel.apply(&self.power, &mut self.mel_energy);

        // Adaptive per-band gain compression.
        let delta_r = cfg.delta.powf(cfg.r);
        for ((energy, mean), out) in self
            .mel_energy
            .iter()
            .zip(self.band_mean.iter_mut())
            .zip(self.frame.iter_mut())
        {
            let e = energy.max(cfg.floor);
            *mean = (1.0 - cfg.smoothing) * *mean + cfg.smoothing * e;

            let denom = (cfg.eps + *mean).powf(cfg.alpha);
            *out = (e / denom + cfg.delta).powf(cfg.r) - delta_r;
        }
    }
}
