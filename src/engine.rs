//! Wires the processing stages into one per-chunk pipeline.
//!
//! Chunk in, frames out, probability, state machine, bracketing, telemetry.
//! The engine owns every stage and runs them on the caller's thread; only the
//! frame ring and the telemetry bus are shared with other threads.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use tracing::{info, warn};

use crate::audio::{AudioChunk, AudioSource};
use crate::config::Config;
use crate::defaults;
use crate::detect::{Detector, EventFsm, FsmConfig};
use crate::dsp::{ExtractorConfig, FeatureExtractor, FrameRing};
use crate::error::{EarwatchError, Result};
use crate::segment::{SegmentBuilder, SegmentConfig, SegmentInfo};
use crate::telemetry::{TelemetryBus, TelemetrySnapshot, TimelinePoint};

/// Full detection pipeline for one audio stream.
pub struct Engine {
    sample_rate: u32,
    extractor: FeatureExtractor,
    ring: Arc<FrameRing>,
    fsm: EventFsm,
    segments: SegmentBuilder,
    detector: Box<dyn Detector>,
    bus: Arc<TelemetryBus>,
    timeline: VecDeque<TimelinePoint>,

    mono: Vec<f32>,
    frames: Vec<f32>,
}

impl Engine {
    /// Builds the pipeline from a validated configuration.
    pub fn new(config: &Config, detector: Box<dyn Detector>) -> Result<Self> {
        config.validate()?;

        let extractor = FeatureExtractor::new(ExtractorConfig::from_config(config))?;
        let ring = Arc::new(FrameRing::new(
            config.features.n_mels,
            config.features.history_frames,
        )?);
        let fsm = EventFsm::new(FsmConfig::from(&config.detection))?;
        let segments = SegmentBuilder::new(SegmentConfig::from_config(config), Arc::clone(&ring))?;

        Ok(Self {
            sample_rate: config.audio.sample_rate,
            extractor,
            ring,
            fsm,
            segments,
            detector,
            bus: Arc::new(TelemetryBus::new()),
            timeline: VecDeque::with_capacity(defaults::TIMELINE_CAPACITY),
            mono: Vec::new(),
            frames: Vec::new(),
        })
    }

    /// Shared handle to the frame history.
    pub fn ring(&self) -> Arc<FrameRing> {
        Arc::clone(&self.ring)
    }

    /// Shared handle to the telemetry bus.
    pub fn bus(&self) -> Arc<TelemetryBus> {
        Arc::clone(&self.bus)
    }

    /// Runs one chunk through every stage. Returns a segment when one
    /// finished on this chunk.
    pub fn process_chunk(&mut self, chunk: &AudioChunk) -> Result<Option<SegmentInfo>> {
        if chunk.sample_rate != self.sample_rate {
            return Err(EarwatchError::AudioFormatMismatch {
                expected: format!("{} Hz", self.sample_rate),
                actual: format!("{} Hz", chunk.sample_rate),
            });
        }

        chunk.downmix_into(&mut self.mono);
        self.frames.clear();
        let produced = self.extractor.process(&self.mono, &mut self.frames);

        let n_mels = self.ring.n_mels();
        let hop_ns = self.extractor.hop_ns();
        for i in 0..produced {
            let frame = &self.frames[i * n_mels..(i + 1) * n_mels];
            self.ring.push_frame(frame);
            self.segments
                .on_frame_pushed(chunk.t0_ns + hop_ns * i as i64);
        }

        let p = self.detector.process(&self.mono);
        let update = self.fsm.update(p, i64::from(chunk.duration_ms()));
        if update.started {
            info!(t_ns = chunk.t0_ns, p, "event started");
            self.segments.on_event_start(chunk.t0_ns);
        }
        if update.ended {
            info!(t_ns = chunk.t0_ns, "event ended");
            self.segments.on_event_end(chunk.t0_ns);
        }

        if self.timeline.len() == defaults::TIMELINE_CAPACITY {
            self.timeline.pop_front();
        }
        self.timeline.push_back(TimelinePoint {
            t_ns: chunk.t0_ns,
            probability: p,
        });

        self.bus.publish(TelemetrySnapshot::new(
            chunk.t0_ns,
            p,
            update.state,
            update.started,
            update.ended,
            self.timeline.iter().copied().collect(),
        ));

        Ok(self.segments.pop_ready())
    }

    /// Drains a source until it ends or `running` clears, sending finished
    /// segments down `tx`.
    pub fn run(
        &mut self,
        source: &mut dyn AudioSource,
        running: &AtomicBool,
        tx: &Sender<SegmentInfo>,
    ) -> Result<()> {
        source.start()?;
        while running.load(Ordering::Relaxed) {
            let Some(chunk) = source.next_chunk()? else {
                info!("audio source drained");
                break;
            };
            if let Some(segment) = self.process_chunk(&chunk)?
                && tx.send(segment).is_err()
            {
                warn!("segment receiver dropped, stopping");
                break;
            }
        }
        source.stop()
    }

    /// Clears all per-stream state; configuration is kept. An event open at
    /// the time of the reset is abandoned, not finalized.
    pub fn reset(&mut self) {
        self.extractor.reset();
        self.detector.reset();
        self.fsm.reset();
        self.segments.reset();
        self.ring.clear();
        self.timeline.clear();
    }
}
