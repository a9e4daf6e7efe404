//! Detection: scalar probability sources and the debounced event state
//! machine that turns them into start/end edges.

pub mod classifier;
pub mod energy;
pub mod fsm;

pub use classifier::{ClassifierConfig, ModelClassifier};
pub use energy::{EnergyDetector, EnergyDetectorConfig};
pub use fsm::{EventFsm, EventState, FsmConfig, FsmUpdate};

/// Trait for per-tick detection probability sources.
///
/// Implementations consume one chunk of mono samples and report a
/// probability in [0, 1]. Stateful implementations are single-writer.
pub trait Detector: Send {
    /// Scores one chunk of mono PCM.
    fn process(&mut self, mono: &[f32]) -> f32;

    /// Clears adapted state.
    fn reset(&mut self);
}
