//! earwatch - Acoustic event detection and clip capture
//!
//! Streams audio into normalized mel-energy frames, runs a detector over
//! them, debounces the probability into confirmed events, and persists each
//! event with surrounding context as a feature segment.

// Enforce error handling discipline in library code
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod detect;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod segment;
pub mod telemetry;

// Core traits (source → features → probability)
pub use audio::{AudioChunk, AudioSource, MockAudioSource, WavReplaySource};
pub use detect::Detector;

// Pipeline
pub use engine::Engine;

// Stages
pub use detect::{EnergyDetector, EventFsm, EventState, FsmUpdate, ModelClassifier};
pub use dsp::{FeatureExtractor, FrameRing, FrameSnapshot};
pub use segment::{SegmentBuilder, SegmentInfo};
pub use telemetry::{TelemetryBus, TelemetrySnapshot, TimelinePoint};

// Error handling
pub use error::{EarwatchError, Result};

// Config
pub use config::Config;
