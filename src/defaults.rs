//! Default configuration constants for earwatch.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz keeps the analysis band wide enough for most acoustic events
/// while staying cheap to transform in real time.
pub const SAMPLE_RATE: u32 = 16_000;

/// Default audio chunk duration in milliseconds delivered by a source.
pub const CHUNK_MS: u32 = 20;

/// Default FFT size. Must be a power of two.
pub const N_FFT: usize = 512;

/// Default analysis window length in samples (25ms at 16kHz).
pub const WIN_LENGTH: usize = 400;

/// Default hop length in samples (10ms at 16kHz).
///
/// One feature frame is produced per hop once a full window is buffered.
pub const HOP_LENGTH: usize = 160;

/// Default number of mel bands per feature frame.
pub const N_MELS: usize = 64;

/// Default lower edge of the mel filterbank in Hz.
pub const F_MIN: f32 = 50.0;

/// Default upper edge of the mel filterbank in Hz.
///
/// Kept slightly below the 8kHz Nyquist limit at the default sample rate.
pub const F_MAX: f32 = 7_600.0;

/// Default gain-compression exponent applied to the per-band moving average.
pub const PCEN_ALPHA: f32 = 0.98;

/// Default gain-compression bias term.
pub const PCEN_DELTA: f32 = 2.0;

/// Default gain-compression root exponent.
pub const PCEN_R: f32 = 0.5;

/// Default smoothing coefficient for the per-band energy moving average.
///
/// Smaller values track background energy more slowly, which flattens
/// drift while preserving fast transients.
pub const PCEN_SMOOTHING: f32 = 0.025;

/// Default stabilizer added to the moving average before exponentiation.
pub const PCEN_EPS: f32 = 1e-6;

/// Floor applied to power and mel energies before log/pow operations.
pub const POWER_FLOOR: f32 = 1e-12;

/// Default frame ring buffer capacity (15s of history at a 10ms hop).
pub const RING_CAPACITY_FRAMES: usize = 1_500;

/// Default probability threshold for entering an event.
pub const P_ON: f32 = 0.65;

/// Default probability threshold for leaving an event.
///
/// Must stay below [`P_ON`]; the gap is the hysteresis band that keeps a
/// noisy probability from toggling the state machine.
pub const P_OFF: f32 = 0.45;

/// Default sustained time above `p_on` before an event start is confirmed (ms).
pub const T_CONFIRM_MS: u32 = 200;

/// Default sustained time below `p_off` before an event end is confirmed (ms).
pub const T_RELEASE_MS: u32 = 300;

/// Default cooldown after an event end during which no start can fire (ms).
pub const COOLDOWN_MS: u32 = 800;

/// Default pre-roll captured before a confirmed event start (ms).
pub const PRE_ROLL_MS: u32 = 2_000;

/// Default post-roll captured after a confirmed event end (ms).
pub const POST_ROLL_MS: u32 = 2_000;

/// Default ceiling on a single event's active duration (ms).
///
/// An event still active past this point is force-ended so a stuck
/// detector can never produce an unbounded clip.
pub const MAX_EVENT_MS: u32 = 12_000;

/// Absolute safety ceiling on a single clip's frame count.
pub const MAX_SEGMENT_FRAMES: usize = 5_000;

/// Default output directory for finalized clip files.
pub const OUT_DIR: &str = "segments";

/// Capacity of the recent-probability timeline carried in each snapshot.
pub const TIMELINE_CAPACITY: usize = 128;
