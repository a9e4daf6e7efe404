use crate::defaults;
use crate::error::{EarwatchError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub features: FeaturesConfig,
    pub detection: DetectionConfig,
    pub segment: SegmentFileConfig,
}

/// Audio delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub chunk_ms: u32,
}

/// Feature extraction and frame history configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeaturesConfig {
    pub n_fft: usize,
    pub win_length: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub f_min: f32,
    pub f_max: f32,
    pub alpha: f32,
    pub delta: f32,
    pub r: f32,
    pub smoothing: f32,
    /// Frame ring buffer capacity in frames.
    pub history_frames: usize,
}

/// Event state machine thresholds and timers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub p_on: f32,
    pub p_off: f32,
    pub t_confirm_ms: u32,
    pub t_release_ms: u32,
    pub cooldown_ms: u32,
}

/// Clip bracketing and persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentFileConfig {
    pub pre_roll_ms: u32,
    pub post_roll_ms: u32,
    pub max_event_ms: u32,
    pub out_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            chunk_ms: defaults::CHUNK_MS,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            n_fft: defaults::N_FFT,
            win_length: defaults::WIN_LENGTH,
            hop_length: defaults::HOP_LENGTH,
            n_mels: defaults::N_MELS,
            f_min: defaults::F_MIN,
            f_max: defaults::F_MAX,
            alpha: defaults::PCEN_ALPHA,
            delta: defaults::PCEN_DELTA,
            r: defaults::PCEN_R,
            smoothing: defaults::PCEN_SMOOTHING,
            history_frames: defaults::RING_CAPACITY_FRAMES,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            p_on: defaults::P_ON,
            p_off: defaults::P_OFF,
            t_confirm_ms: defaults::T_CONFIRM_MS,
            t_release_ms: defaults::T_RELEASE_MS,
            cooldown_ms: defaults::COOLDOWN_MS,
        }
    }
}

impl Default for SegmentFileConfig {
    fn default() -> Self {
        Self {
            pre_roll_ms: defaults::PRE_ROLL_MS,
            post_roll_ms: defaults::POST_ROLL_MS,
            max_event_ms: defaults::MAX_EVENT_MS,
            out_dir: PathBuf::from(defaults::OUT_DIR),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns `ConfigFileNotFound` for a missing file and an error for
    /// invalid TOML. Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Err(EarwatchError::ConfigFileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => match e.downcast_ref::<EarwatchError>() {
                Some(EarwatchError::ConfigFileNotFound { .. }) => Self::default(),
                _ => panic!("Failed to load config from {}: {}", path.display(), e),
            },
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - EARWATCH_OUT_DIR → segment.out_dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(out_dir) = std::env::var("EARWATCH_OUT_DIR")
            && !out_dir.is_empty()
        {
            self.segment.out_dir = PathBuf::from(out_dir);
        }

        self
    }

    /// Validate cross-field constraints before the core is constructed.
    ///
    /// Rejects values that would otherwise produce NaN/Inf deep in the
    /// extractor or a state machine that can never leave a state.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> EarwatchError {
            EarwatchError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.chunk_ms == 0 {
            return Err(invalid("audio.chunk_ms", "must be positive"));
        }

        let f = &self.features;
        if !f.n_fft.is_power_of_two() {
            return Err(invalid("features.n_fft", "must be a power of two"));
        }
        if f.win_length < 2 || f.win_length > f.n_fft {
            return Err(invalid("features.win_length", "must be in 2..=n_fft"));
        }
        if f.hop_length == 0 || f.hop_length > f.win_length {
            return Err(invalid("features.hop_length", "must be in 1..=win_length"));
        }
        if f.n_mels == 0 {
            return Err(invalid("features.n_mels", "must be positive"));
        }
        let nyquist = self.audio.sample_rate as f32 / 2.0;
        if f.f_min < 0.0 || f.f_min >= f.f_max {
            return Err(invalid("features.f_min", "must be in 0.0..f_max"));
        }
        if f.f_max > nyquist {
            return Err(invalid("features.f_max", "must not exceed the Nyquist frequency"));
        }
        if f.history_frames == 0 {
            return Err(invalid("features.history_frames", "must be positive"));
        }
        if !(0.0..=1.0).contains(&f.smoothing) {
            return Err(invalid("features.smoothing", "must be in 0.0..=1.0"));
        }

        let d = &self.detection;
        if !(0.0..=1.0).contains(&d.p_on) || !(0.0..=1.0).contains(&d.p_off) {
            return Err(invalid("detection.p_on", "thresholds must be in 0.0..=1.0"));
        }
        if d.p_on <= d.p_off {
            return Err(invalid("detection.p_on", "must be greater than p_off"));
        }

        if self.segment.max_event_ms == 0 {
            return Err(invalid("segment.max_event_ms", "must be positive"));
        }

        Ok(())
    }

    /// Duration of one feature hop in milliseconds, rounded down.
    pub fn hop_ms(&self) -> u32 {
        (self.features.hop_length as u64 * 1000 / self.audio.sample_rate as u64) as u32
    }
}
