//! Bounded ring buffer of feature frames.
//!
//! Fixed backing storage (`capacity * n_mels` floats), modulo write cursor,
//! copy-out reads. Push and snapshot each hold the lock for a single copy,
//! so readers never observe a torn write and no critical section grows with
//! time.

use crate::error::{EarwatchError, Result};
use std::sync::Mutex;

#[derive(Debug)]
struct RingInner {
    data: Vec<f32>,
    /// Next write slot, 0..capacity.
    write_idx: usize,
    /// Filled frames, 0..=capacity.
    len: usize,
}

/// Thread-safe store of the most recent feature frames.
#[derive(Debug)]
pub struct FrameRing {
    n_mels: usize,
    capacity_frames: usize,
    inner: Mutex<RingInner>,
}

/// Read-only copy of the last K frames, oldest to newest.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// Number of frames actually returned (may be less than requested).
    pub frames: usize,
    /// Values per frame.
    pub n_mels: usize,
    /// Row-major frame data, `frames * n_mels` values.
    pub data: Vec<f32>,
}

impl FrameSnapshot {
    /// Borrow of frame `i`, oldest first.
    pub fn frame(&self, i: usize) -> &[f32] {
        &self.data[i * self.n_mels..(i + 1) * self.n_mels]
    }

    /// Iterator over frames, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.n_mels)
    }

    fn empty(n_mels: usize) -> Self {
        Self {
            frames: 0,
            n_mels,
            data: Vec::new(),
        }
    }
}

impl FrameRing {
    /// Creates a ring with fixed backing storage; capacity never grows.
    pub fn new(n_mels: usize, capacity_frames: usize) -> Result<Self> {
        if n_mels == 0 {
            return Err(EarwatchError::ConfigInvalidValue {
                key: "n_mels".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if capacity_frames == 0 {
            return Err(EarwatchError::ConfigInvalidValue {
                key: "capacity_frames".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(Self {
            n_mels,
            capacity_frames,
            inner: Mutex::new(RingInner {
                data: vec![0.0; n_mels * capacity_frames],
                write_idx: 0,
                len: 0,
            }),
        })
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Number of frames currently held.
    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.len,
            Err(poisoned) => poisoned.into_inner().len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies one frame into the next write slot, evicting the oldest frame
    /// once at capacity. A frame of the wrong width is ignored.
    pub fn push_frame(&self, frame: &[f32]) {
        if frame.len() != self.n_mels {
            debug_assert_eq!(frame.len(), self.n_mels, "frame width mismatch");
            return;
        }

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let off = inner.write_idx * self.n_mels;
        inner.data[off..off + self.n_mels].copy_from_slice(frame);
        inner.write_idx = (inner.write_idx + 1) % self.capacity_frames;
        inner.len = (inner.len + 1).min(self.capacity_frames);
    }

    /// Drops every held frame; capacity and frame width are kept.
    pub fn clear(&self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.write_idx = 0;
        inner.len = 0;
    }

    /// Returns an oldest-to-newest copy of the last `min(k, held)` frames.
    pub fn snapshot_last(&self, k: usize) -> FrameSnapshot {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let want = k.min(inner.len);
        if want == 0 {
            return FrameSnapshot::empty(self.n_mels);
        }

        let mut data = vec![0.0f32; want * self.n_mels];
        // write_idx points at the next write slot, so the newest frame is
        // write_idx - 1 and the oldest of the last `want` is `want` behind it.
        let start = (inner.write_idx + self.capacity_frames - want) % self.capacity_frames;
        for i in 0..want {
            let src = (start + i) % self.capacity_frames;
            let src_off = src * self.n_mels;
            let dst_off = i * self.n_mels;
            data[dst_off..dst_off + self.n_mels]
                .copy_from_slice(&inner.data[src_off..src_off + self.n_mels]);
        }

        FrameSnapshot {
            frames: want,
            n_mels: self.n_mels,
            data,
        }
    }
}
