//! Audio source abstraction.
//!
//! Sources deliver timestamped chunks of interleaved f32 PCM. Resampling,
//! looping, and pacing are source concerns; the processing engine only
//! consumes whatever a source hands it.

use crate::defaults;
use crate::error::{EarwatchError, Result};
use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic timestamp in nanoseconds, anchored at first use.
pub fn monotonic_ns() -> i64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_nanos() as i64
}

/// One chunk of captured or replayed audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Monotonic timestamp of the first sample in this chunk.
    pub t0_ns: i64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count; samples are interleaved.
    pub channels: u16,
    /// Interleaved f32 PCM in [-1.0, 1.0], `frames * channels` values.
    pub samples: Vec<f32>,
}

impl AudioChunk {
    /// Number of sample frames (per-channel samples) in this chunk.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration of this chunk in milliseconds, rounded down.
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000 / self.sample_rate as u64) as u32
    }

    /// Averages interleaved channels into `out`, replacing its contents.
    pub fn downmix_into(&self, out: &mut Vec<f32>) {
        out.clear();
        let channels = self.channels as usize;
        if channels <= 1 {
            out.extend_from_slice(&self.samples);
            return;
        }
        out.reserve(self.frames());
        for frame in self.samples.chunks_exact(channels) {
            let sum: f32 = frame.iter().sum();
            out.push(sum / channels as f32);
        }
    }
}

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (file replay vs mock).
pub trait AudioSource: Send {
    /// Start delivering audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read the next chunk, or `None` when the source is exhausted.
    fn next_chunk(&mut self) -> Result<Option<AudioChunk>>;
}

/// Mock audio source for testing
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    chunks: Vec<Vec<f32>>,
    position: usize,
    sample_rate: u32,
    next_t0_ns: i64,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a new mock audio source with no queued chunks
    pub fn new() -> Self {
        Self {
            is_started: false,
            chunks: Vec::new(),
            position: 0,
            sample_rate: defaults::SAMPLE_RATE,
            next_t0_ns: 0,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Queue a mono chunk to be returned in order
    pub fn with_chunk(mut self, samples: Vec<f32>) -> Self {
        self.chunks.push(samples);
        self
    }

    /// Configure the sample rate reported on each chunk
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(EarwatchError::AudioSource {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        if self.should_fail_read {
            return Err(EarwatchError::AudioSource {
                message: self.error_message.clone(),
            });
        }
        let Some(samples) = self.chunks.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;

        let chunk = AudioChunk {
            t0_ns: self.next_t0_ns,
            sample_rate: self.sample_rate,
            channels: 1,
            samples: samples.clone(),
        };
        self.next_t0_ns += samples.len() as i64 * 1_000_000_000 / self.sample_rate as i64;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_frames_and_duration() {
        let chunk = AudioChunk {
            t0_ns: 0,
            sample_rate: 16_000,
            channels: 2,
            samples: vec![0.0; 640],
        };
        assert_eq!(chunk.frames(), 320);
        assert_eq!(chunk.duration_ms(), 20);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let chunk = AudioChunk {
            t0_ns: 0,
            sample_rate: 16_000,
            channels: 1,
            samples: vec![0.1, -0.2, 0.3],
        };
        let mut mono = Vec::new();
        chunk.downmix_into(&mut mono);
        assert_eq!(mono, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_downmix_averages_stereo() {
        let chunk = AudioChunk {
            t0_ns: 0,
            sample_rate: 16_000,
            channels: 2,
            samples: vec![1.0, 0.0, -1.0, -1.0],
        };
        let mut mono = Vec::new();
        chunk.downmix_into(&mut mono);
        assert_eq!(mono, vec![0.5, -1.0]);
    }

    #[test]
    fn test_mock_source_returns_chunks_in_order() {
        let mut source = MockAudioSource::new()
            .with_chunk(vec![0.1; 320])
            .with_chunk(vec![0.2; 320]);

        source.start().unwrap();
        let first = source.next_chunk().unwrap().unwrap();
        let second = source.next_chunk().unwrap().unwrap();
        assert_eq!(first.samples[0], 0.1);
        assert_eq!(second.samples[0], 0.2);
        assert!(second.t0_ns > first.t0_ns);
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_mock_source_timestamps_advance_by_duration() {
        let mut source = MockAudioSource::new()
            .with_sample_rate(16_000)
            .with_chunk(vec![0.0; 320])
            .with_chunk(vec![0.0; 320]);

        let first = source.next_chunk().unwrap().unwrap();
        let second = source.next_chunk().unwrap().unwrap();
        // 320 samples at 16kHz = 20ms
        assert_eq!(second.t0_ns - first.t0_ns, 20_000_000);
    }

    #[test]
    fn test_mock_source_start_failure() {
        let mut source = MockAudioSource::new()
            .with_start_failure()
            .with_error_message("device not found");

        let result = source.start();
        assert!(result.is_err());
        assert!(!source.is_started());
        match result {
            Err(EarwatchError::AudioSource { message }) => {
                assert_eq!(message, "device not found");
            }
            _ => panic!("Expected AudioSource error"),
        }
    }

    #[test]
    fn test_mock_source_read_failure() {
        let mut source = MockAudioSource::new().with_read_failure();
        assert!(source.next_chunk().is_err());
    }

    #[test]
    fn test_audio_source_trait_is_object_safe() {
        let mut source: Box<dyn AudioSource> =
            Box::new(MockAudioSource::new().with_chunk(vec![0.0; 160]));
        source.start().unwrap();
        assert!(source.next_chunk().unwrap().is_some());
        source.stop().unwrap();
    }

    #[test]
    fn test_monotonic_ns_is_nondecreasing() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }
}
