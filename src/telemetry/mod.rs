//! Telemetry snapshots and the bus that broadcasts them.

mod bus;
mod snapshot;

pub use bus::{SnapshotCallback, TelemetryBus};
pub use snapshot::{TelemetrySnapshot, TimelinePoint};
