//! Inactive model-backed classifier stub.
//!
//! Placeholder for a learned classifier that would score feature windows
//! from the frame ring. Configuration is validated and class names are
//! loaded so wiring can be tested end to end, but no inference runs and
//! the reported probability is always 0.0.

use crate::detect::Detector;
use crate::error::{EarwatchError, Result};
use std::fs;
use std::path::PathBuf;

/// Configuration for the classifier stub.
#[derive(Debug, Clone, Default)]
pub struct ClassifierConfig {
    /// Path to the serialized model. Existence is checked, content is not read.
    pub model_path: PathBuf,
    /// Optional newline-separated class label file.
    pub class_names_path: Option<PathBuf>,
    /// Expected feature window shape.
    pub n_mels: usize,
    pub n_frames: usize,
}

/// Model classifier stub. Always reports 0.0.
#[derive(Debug)]
pub struct ModelClassifier {
    config: ClassifierConfig,
    class_names: Vec<String>,
}

impl ModelClassifier {
    /// Validates the configuration and loads class labels if present.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        if config.n_mels == 0 || config.n_frames == 0 {
            return Err(EarwatchError::ConfigInvalidValue {
                key: "classifier.n_mels".to_string(),
                message: "window shape must be positive".to_string(),
            });
        }
        if !config.model_path.as_os_str().is_empty() && !config.model_path.exists() {
            return Err(EarwatchError::ConfigInvalidValue {
                key: "classifier.model_path".to_string(),
                message: format!("no such file: {}", config.model_path.display()),
            });
        }

        let class_names = match &config.class_names_path {
            Some(path) => fs::read_to_string(path)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            config,
            class_names,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}

impl Detector for ModelClassifier {
    /// Inference backend is not wired up; always reports 0.0.
    fn process(&mut self, _mono: &[f32]) -> f32 {
        0.0
    }

    fn reset(&mut self) {}
}
