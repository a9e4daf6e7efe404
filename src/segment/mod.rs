//! Event bracketing and segment persistence.

mod builder;

pub use builder::{SegmentBuilder, SegmentConfig, SegmentInfo};
