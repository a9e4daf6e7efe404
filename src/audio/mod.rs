//! Audio delivery: source trait, chunk type, and WAV replay.

pub mod replay;
pub mod source;

pub use replay::{ReplayConfig, WavReplaySource};
pub use source::{AudioChunk, AudioSource, MockAudioSource, monotonic_ns};
