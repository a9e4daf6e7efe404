//! Immutable state snapshot shared between the processing loop and readers.

use crate::defaults;
use crate::detect::EventState;

/// One point of the recent-probability timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelinePoint {
    pub t_ns: i64,
    pub probability: f32,
}

/// Immutable value describing one processing tick.
///
/// Published behind an `Arc`; the publisher and any number of readers share
/// the same allocation and the last holder frees it.
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    /// Monotonic timestamp of the tick.
    pub t_ns: i64,
    /// Latest detection probability.
    pub probability: f32,
    /// Event state at the end of the tick.
    pub state: EventState,
    /// True only on the tick an event start was confirmed.
    pub event_started: bool,
    /// True only on the tick an event end was confirmed.
    pub event_ended: bool,
    /// Recent probabilities, oldest first, at most
    /// [`defaults::TIMELINE_CAPACITY`] points.
    pub timeline: Vec<TimelinePoint>,
}

impl TelemetrySnapshot {
    /// Builds a snapshot, truncating the timeline to its fixed capacity
    /// (keeping the newest points).
    pub fn new(
        t_ns: i64,
        probability: f32,
        state: EventState,
        event_started: bool,
        event_ended: bool,
        mut timeline: Vec<TimelinePoint>,
    ) -> Self {
        if timeline.len() > defaults::TIMELINE_CAPACITY {
            let drop = timeline.len() - defaults::TIMELINE_CAPACITY;
            timeline.drain(..drop);
        }
        Self {
            t_ns,
            probability,
            state,
            event_started,
            event_ended,
            timeline,
        }
    }
}
