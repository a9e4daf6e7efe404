//! WAV file replay source.
//!
//! Reads a whole WAV file up front and replays it in fixed-duration chunks,
//! optionally looping and optionally pacing delivery against a monotonic
//! deadline to emulate a live capture device.

use crate::audio::source::{AudioChunk, AudioSource, monotonic_ns};
use crate::defaults;
use crate::error::{EarwatchError, Result};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Configuration for WAV replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Chunk duration in milliseconds.
    pub chunk_ms: u32,
    /// Restart from the beginning when the file ends.
    pub loop_input: bool,
    /// Sleep between chunks to emulate real-time delivery.
    pub realtime: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            chunk_ms: defaults::CHUNK_MS,
            loop_input: false,
            realtime: false,
        }
    }
}

/// Audio source that replays a WAV file in chunks.
///
/// Sample rate and channel count come from the file; chunk timestamps are
/// logical (first sample at 0, advancing by exactly one chunk duration) so
/// offline runs are deterministic regardless of pacing.
pub struct WavReplaySource {
    path: PathBuf,
    config: ReplayConfig,
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
    position: usize,
    next_t0_ns: i64,
    next_deadline_ns: i64,
}

impl WavReplaySource {
    /// Creates a replay source for the given WAV file path.
    pub fn new(path: impl Into<PathBuf>, config: ReplayConfig) -> Self {
        Self {
            path: path.into(),
            config,
            sample_rate: 0,
            channels: 0,
            samples: Vec::new(),
            position: 0,
            next_t0_ns: 0,
            next_deadline_ns: 0,
        }
    }

    /// Sample rate of the opened file, 0 before `start()`.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the opened file, 0 before `start()`.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn samples_per_chunk(&self) -> usize {
        let frames = (self.sample_rate as u64 * self.config.chunk_ms as u64 / 1000) as usize;
        frames.max(1) * self.channels as usize
    }

    fn chunk_ns(&self) -> i64 {
        self.config.chunk_ms as i64 * 1_000_000
    }
}

impl AudioSource for WavReplaySource {
    fn start(&mut self) -> Result<()> {
        let mut reader =
            hound::WavReader::open(&self.path).map_err(|e| EarwatchError::AudioSource {
                message: format!("Failed to open WAV file {}: {}", self.path.display(), e),
            })?;

        let spec = reader.spec();
        self.sample_rate = spec.sample_rate;
        self.channels = spec.channels;

        self.samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| EarwatchError::AudioSource {
                    message: format!("Failed to read WAV samples: {}", e),
                })?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| EarwatchError::AudioSource {
                        message: format!("Failed to read WAV samples: {}", e),
                    })?
            }
        };

        self.position = 0;
        self.next_t0_ns = 0;
        self.next_deadline_ns = monotonic_ns();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.samples.clear();
        self.position = 0;
        Ok(())
    }

    fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        if self.samples.is_empty() {
            return Ok(None);
        }

        if self.position >= self.samples.len() {
            if !self.config.loop_input {
                return Ok(None);
            }
            self.position = 0;
        }

        let end = (self.position + self.samples_per_chunk()).min(self.samples.len());
        let samples = self.samples[self.position..end].to_vec();
        self.position = end;

        if self.config.realtime {
            let now = monotonic_ns();
            if self.next_deadline_ns > now {
                thread::sleep(Duration::from_nanos((self.next_deadline_ns - now) as u64));
            }
            self.next_deadline_ns += self.chunk_ns();
        }

        let chunk = AudioChunk {
            t0_ns: self.next_t0_ns,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples,
        };
        self.next_t0_ns += self.chunk_ns();
        Ok(Some(chunk))
    }
}
