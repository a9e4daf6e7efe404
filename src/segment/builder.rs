//! Brackets confirmed events with pre/post roll and persists the frames.
//!
//! All bracketing arithmetic runs in frame counts derived from the hop
//! period; wall-clock timestamps are carried along only for naming and
//! metadata. A single-slot mailbox hands finished segments to the caller.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::defaults;
use crate::dsp::{FrameRing, FrameSnapshot};
use crate::error::{EarwatchError, Result};

/// Bracketing parameters, resolved to frame counts at construction.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    pub n_mels: usize,
    /// Frame hop period in milliseconds; the unit all roll windows are
    /// converted into.
    pub hop_ms: u64,
    pub pre_roll_ms: u64,
    pub post_roll_ms: u64,
    pub max_event_ms: u64,
    pub out_dir: PathBuf,
}

impl SegmentConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            n_mels: config.features.n_mels,
            hop_ms: u64::from(config.hop_ms()),
            pre_roll_ms: u64::from(config.segment.pre_roll_ms),
            post_roll_ms: u64::from(config.segment.post_roll_ms),
            max_event_ms: u64::from(config.segment.max_event_ms),
            out_dir: config.segment.out_dir.clone(),
        }
    }
}

/// Metadata for one finished segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub path: PathBuf,
    /// Timestamp the event was confirmed at.
    pub t_start_ns: i64,
    /// Timestamp the event ended at (or was force-terminated).
    pub t_end_ns: i64,
    /// Frames actually written.
    pub frames: usize,
    pub n_mels: usize,
    /// False when the CSV write failed; the segment metadata is still
    /// delivered so the caller can log the loss.
    pub persisted: bool,
}

/// Turns event start/end pulses into persisted feature segments.
pub struct SegmentBuilder {
    config: SegmentConfig,
    ring: Arc<FrameRing>,
    pre_frames: i64,
    post_frames: i64,
    max_event_frames: i64,
    /// Total frames pushed since construction.
    frame_index: i64,
    in_event: bool,
    pending_finalize: bool,
    event_start_frame: i64,
    event_start_ns: i64,
    event_end_ns: i64,
    finalize_at_frame: i64,
    ready: Option<SegmentInfo>,
}

impl SegmentBuilder {
    pub fn new(config: SegmentConfig, ring: Arc<FrameRing>) -> Result<Self> {
        if config.hop_ms == 0 {
            return Err(EarwatchError::ConfigInvalidValue {
                key: "hop_ms".to_string(),
                message: "must be at least 1 ms".to_string(),
            });
        }
        if config.n_mels != ring.n_mels() {
            return Err(EarwatchError::ConfigInvalidValue {
                key: "n_mels".to_string(),
                message: format!(
                    "segment width {} does not match ring width {}",
                    config.n_mels,
                    ring.n_mels()
                ),
            });
        }

        let pre_frames = (config.pre_roll_ms / config.hop_ms) as i64;
        let post_frames = (config.post_roll_ms / config.hop_ms) as i64;
        let max_event_frames = (config.max_event_ms / config.hop_ms) as i64;

        Ok(Self {
            config,
            ring,
            pre_frames,
            post_frames,
            max_event_frames,
            frame_index: 0,
            in_event: false,
            pending_finalize: false,
            event_start_frame: 0,
            event_start_ns: 0,
            event_end_ns: 0,
            finalize_at_frame: 0,
            ready: None,
        })
    }

    /// Frames pushed so far; the index of the next frame.
    pub fn frame_index(&self) -> i64 {
        self.frame_index
    }

    /// Records that one frame entered the ring at `t_ns`.
    ///
    /// Drives the two frame-counted deadlines: force-terminates an event that
    /// exceeded the maximum duration, and finalizes a segment whose post-roll
    /// has fully arrived.
    pub fn on_frame_pushed(&mut self, t_ns: i64) {
        self.frame_index += 1;

        if self.in_event && self.frame_index - self.event_start_frame > self.max_event_frames {
            warn!(
                start_frame = self.event_start_frame,
                "event exceeded maximum duration, force-terminating"
            );
            self.end_event(t_ns);
        }

        if self.pending_finalize && self.frame_index >= self.finalize_at_frame {
            self.finalize();
        }
    }

    /// Marks an event start at `t_ns`. Ignored while already in an event or
    /// while the previous segment's post-roll is still running; the builder
    /// tracks at most one event and never queues overlaps.
    pub fn on_event_start(&mut self, t_ns: i64) {
        if self.in_event || self.pending_finalize {
            return;
        }
        self.in_event = true;
        self.event_start_frame = self.frame_index;
        self.event_start_ns = t_ns;
        debug!(frame = self.event_start_frame, "segment opened");
    }

    /// Marks an event end at `t_ns`. Ignored outside an event.
    pub fn on_event_end(&mut self, t_ns: i64) {
        if !self.in_event {
            return;
        }
        self.end_event(t_ns);
    }

    /// Clears event tracking and the mailbox; the frame counter restarts at
    /// zero so a fresh stream gets fresh bracketing arithmetic.
    pub fn reset(&mut self) {
        self.frame_index = 0;
        self.in_event = false;
        self.pending_finalize = false;
        self.event_start_frame = 0;
        self.event_start_ns = 0;
        self.event_end_ns = 0;
        self.finalize_at_frame = 0;
        self.ready = None;
    }

    pub fn has_ready(&self) -> bool {
        self.ready.is_some()
    }

    /// Takes the finished segment out of the mailbox, if any.
    pub fn pop_ready(&mut self) -> Option<SegmentInfo> {
        self.ready.take()
    }

    fn end_event(&mut self, t_ns: i64) {
        self.in_event = false;
        self.event_end_ns = t_ns;
        self.finalize_at_frame = self.frame_index + self.post_frames;
        debug!(
            end_frame = self.frame_index,
            finalize_at = self.finalize_at_frame,
            "segment closed, waiting for post-roll"
        );
        if self.frame_index >= self.finalize_at_frame {
            // Zero post-roll: the window is already complete.
            self.finalize();
        } else {
            self.pending_finalize = true;
        }
    }

    fn finalize(&mut self) {
        self.pending_finalize = false;

        let begin = (self.event_start_frame - self.pre_frames).max(0);
        let length = (self.finalize_at_frame - begin)
            .clamp(1, defaults::MAX_SEGMENT_FRAMES as i64) as usize;
        let snapshot = self.ring.snapshot_last(length);

        let info = self.persist(&snapshot);
        debug!(
            path = %info.path.display(),
            frames = info.frames,
            persisted = info.persisted,
            "segment finalized"
        );
        if self.ready.is_some() {
            warn!("unclaimed segment dropped from mailbox");
        }
        self.ready = Some(info);
    }

    fn persist(&self, snapshot: &FrameSnapshot) -> SegmentInfo {
        let path = self.config.out_dir.join(format!(
            "seg_{}_{}.csv",
            self.event_start_ns, self.event_end_ns
        ));

        let persisted = match self.write_csv(&path, snapshot) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to persist segment");
                false
            }
        };

        SegmentInfo {
            path,
            t_start_ns: self.event_start_ns,
            t_end_ns: self.event_end_ns,
            frames: snapshot.frames,
            n_mels: snapshot.n_mels,
            persisted,
        }
    }

    /// One comma-separated line per frame, oldest first.
    fn write_csv(&self, path: &Path, snapshot: &FrameSnapshot) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        for frame in snapshot.iter() {
            let mut first = true;
            for value in frame {
                if !first {
                    write!(writer, ",")?;
                }
                write!(writer, "{value}")?;
                first = false;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_setup(tmp: &TempDir) -> (SegmentBuilder, Arc<FrameRing>) {
        let ring = Arc::new(FrameRing::new(4, 1_500).unwrap());
        let config = SegmentConfig {
            n_mels: 4,
            hop_ms: 10,
            pre_roll_ms: 2_000,  // 200 frames
            post_roll_ms: 2_000, // 200 frames
            max_event_ms: 12_000,
            out_dir: tmp.path().to_path_buf(),
        };
        let builder = SegmentBuilder::new(config, Arc::clone(&ring)).unwrap();
        (builder, ring)
    }

    fn push_n(builder: &mut SegmentBuilder, ring: &FrameRing, n: usize, value: f32) {
        for _ in 0..n {
            ring.push_frame(&[value; 4]);
            builder.on_frame_pushed(builder.frame_index() * 10_000_000);
        }
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let ring = Arc::new(FrameRing::new(8, 100).unwrap());
        let config = SegmentConfig {
            n_mels: 4,
            hop_ms: 10,
            pre_roll_ms: 0,
            post_roll_ms: 0,
            max_event_ms: 1_000,
            out_dir: tmp.path().to_path_buf(),
        };
        assert!(SegmentBuilder::new(config, ring).is_err());
    }

    #[test]
    fn test_bracketing_arithmetic() {
        let tmp = TempDir::new().unwrap();
        let (mut builder, ring) = test_setup(&tmp);

        // Event confirmed at frame 500, ends at frame 700. With 200 frames of
        // pre and post roll the segment covers [300, 900): 600 frames.
        push_n(&mut builder, &ring, 500, 0.0);
        builder.on_event_start(5_000_000_000);
        push_n(&mut builder, &ring, 200, 1.0);
        builder.on_event_end(7_000_000_000);
        assert!(!builder.has_ready());

        // Post-roll not yet complete after 199 more frames.
        push_n(&mut builder, &ring, 199, 2.0);
        assert!(!builder.has_ready());

        push_n(&mut builder, &ring, 1, 2.0);
        let info = builder.pop_ready().expect("segment should finalize");
        assert_eq!(info.frames, 600);
        assert_eq!(info.t_start_ns, 5_000_000_000);
        assert_eq!(info.t_end_ns, 7_000_000_000);
        assert!(info.persisted);
        assert!(info.path.exists());
        assert!(!builder.has_ready());
    }

    #[test]
    fn test_pre_roll_clamped_at_stream_start() {
        let tmp = TempDir::new().unwrap();
        let (mut builder, ring) = test_setup(&tmp);

        // Event at frame 50: pre-roll would reach frame -150, clamped to 0.
        push_n(&mut builder, &ring, 50, 0.0);
        builder.on_event_start(0);
        push_n(&mut builder, &ring, 10, 1.0);
        builder.on_event_end(1);
        push_n(&mut builder, &ring, 200, 0.0);

        let info = builder.pop_ready().unwrap();
        // [0, 60 + 200) = 260 frames.
        assert_eq!(info.frames, 260);
    }

    #[test]
    fn test_csv_round_trip() {
        let tmp = TempDir::new().unwrap();
        let ring = Arc::new(FrameRing::new(3, 100).unwrap());
        let config = SegmentConfig {
            n_mels: 3,
            hop_ms: 10,
            pre_roll_ms: 0,
            post_roll_ms: 0,
            max_event_ms: 10_000,
            out_dir: tmp.path().to_path_buf(),
        };
        let mut builder = SegmentBuilder::new(config, Arc::clone(&ring)).unwrap();

        builder.on_event_start(100);
        for i in 0..4 {
            ring.push_frame(&[i as f32, i as f32 + 0.5, i as f32 + 0.25]);
            builder.on_frame_pushed(i);
        }
        builder.on_event_end(200);
        ring.push_frame(&[9.0, 9.0, 9.0]);
        builder.on_frame_pushed(5);

        let info = builder.pop_ready().unwrap();
        let text = fs::read_to_string(&info.path).unwrap();
        let rows: Vec<Vec<f32>> = text
            .lines()
            .map(|line| line.split(',').map(|v| v.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows.len(), info.frames);
        assert_eq!(rows[0].len(), 3);
        assert_eq!(rows[1], vec![1.0, 1.5, 1.25]);
    }

    #[test]
    fn test_duplicate_start_and_end_ignored() {
        let tmp = TempDir::new().unwrap();
        let (mut builder, ring) = test_setup(&tmp);

        push_n(&mut builder, &ring, 10, 0.0);
        builder.on_event_start(1_000);
        builder.on_event_start(2_000); // ignored
        push_n(&mut builder, &ring, 10, 1.0);
        builder.on_event_end(3_000);
        builder.on_event_end(4_000); // ignored
        push_n(&mut builder, &ring, 200, 0.0);

        let info = builder.pop_ready().unwrap();
        assert_eq!(info.t_start_ns, 1_000);
        assert_eq!(info.t_end_ns, 3_000);
    }

    #[test]
    fn test_max_event_self_terminates() {
        let tmp = TempDir::new().unwrap();
        let ring = Arc::new(FrameRing::new(4, 1_500).unwrap());
        let config = SegmentConfig {
            n_mels: 4,
            hop_ms: 10,
            pre_roll_ms: 0,
            post_roll_ms: 100, // 10 frames
            max_event_ms: 500, // 50 frames
            out_dir: tmp.path().to_path_buf(),
        };
        let mut builder = SegmentBuilder::new(config, Arc::clone(&ring)).unwrap();

        push_n(&mut builder, &ring, 10, 0.0);
        builder.on_event_start(0);
        // Never send an end pulse; the builder must cut the event itself.
        push_n(&mut builder, &ring, 100, 1.0);

        let info = builder.pop_ready().expect("runaway event must finalize");
        // Cut fires on the first frame past the 50-frame ceiling, so the
        // event spans 51 frames, plus 10 post-roll frames.
        assert_eq!(info.frames, 61);
    }

    #[test]
    fn test_start_during_pending_finalize_ignored() {
        let tmp = TempDir::new().unwrap();
        let (mut builder, ring) = test_setup(&tmp);

        push_n(&mut builder, &ring, 300, 0.0);
        builder.on_event_start(1);
        push_n(&mut builder, &ring, 10, 1.0);
        builder.on_event_end(2);

        // Start mid post-roll: ignored, no overlap or queuing. The matching
        // end is also ignored since nothing is in-event.
        push_n(&mut builder, &ring, 5, 0.0);
        builder.on_event_start(3);
        builder.on_event_end(4);

        push_n(&mut builder, &ring, 200, 0.0);
        let only = builder.pop_ready().unwrap();
        assert_eq!(only.t_start_ns, 1);
        assert_eq!(only.t_end_ns, 2);
        assert!(!builder.has_ready());
    }

    #[test]
    fn test_reset_mid_event_discards_tracking() {
        let tmp = TempDir::new().unwrap();
        let ring = Arc::new(FrameRing::new(4, 1_500).unwrap());
        let config = SegmentConfig {
            n_mels: 4,
            hop_ms: 10,
            pre_roll_ms: 200,
            post_roll_ms: 200,
            max_event_ms: 500, // 50 frames
            out_dir: tmp.path().to_path_buf(),
        };
        let mut builder = SegmentBuilder::new(config, Arc::clone(&ring)).unwrap();

        // Event opens but never ends before the reset.
        push_n(&mut builder, &ring, 10, 0.0);
        builder.on_event_start(20_000_000);
        push_n(&mut builder, &ring, 5, 1.0);
        builder.reset();
        assert_eq!(builder.frame_index(), 0);

        // A long quiet stream afterwards must not revive the abandoned
        // event through the max-event cut.
        push_n(&mut builder, &ring, 300, 0.0);
        assert!(!builder.has_ready());
        assert!(builder.pop_ready().is_none());
    }

    #[test]
    fn test_reset_drops_unclaimed_segment() {
        let tmp = TempDir::new().unwrap();
        let (mut builder, ring) = test_setup(&tmp);

        push_n(&mut builder, &ring, 300, 0.0);
        builder.on_event_start(1);
        push_n(&mut builder, &ring, 10, 1.0);
        builder.on_event_end(2);
        push_n(&mut builder, &ring, 200, 0.0);
        assert!(builder.has_ready());

        builder.reset();
        assert!(!builder.has_ready());
    }

    #[test]
    fn test_unwritable_out_dir_reports_unpersisted() {
        let tmp = TempDir::new().unwrap();
        let ring = Arc::new(FrameRing::new(2, 100).unwrap());
        let blocker = tmp.path().join("blocked");
        fs::write(&blocker, b"not a directory").unwrap();
        let config = SegmentConfig {
            n_mels: 2,
            hop_ms: 10,
            pre_roll_ms: 0,
            post_roll_ms: 0,
            max_event_ms: 10_000,
            out_dir: blocker,
        };
        let mut builder = SegmentBuilder::new(config, Arc::clone(&ring)).unwrap();

        builder.on_event_start(0);
        ring.push_frame(&[1.0, 1.0]);
        builder.on_frame_pushed(0);
        builder.on_event_end(1);
        ring.push_frame(&[0.0, 0.0]);
        builder.on_frame_pushed(2);

        let info = builder.pop_ready().unwrap();
        assert!(!info.persisted);
        assert!(info.frames > 0);
    }
}
