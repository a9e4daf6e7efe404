//! Event state machine.
//!
//! Converts a noisy detection probability into a clean, debounced event
//! signal with hysteresis: entering an event requires sustained time above
//! `p_on`, leaving requires sustained time below `p_off`, and a cooldown
//! after each event suppresses immediate re-triggering.

use crate::config::DetectionConfig;
use crate::defaults;
use crate::error::{EarwatchError, Result};
use std::fmt;

/// Current state of the event detector.
///
/// `Candidate` is accrual bookkeeping between `Idle` and `Active`; it is
/// visible in snapshots but emits no edge of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventState {
    #[default]
    Idle,
    Candidate,
    Active,
    Cooldown,
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventState::Idle => "IDLE",
            EventState::Candidate => "CANDIDATE",
            EventState::Active => "ACTIVE",
            EventState::Cooldown => "COOLDOWN",
        };
        f.write_str(name)
    }
}

/// Configuration for the event state machine.
#[derive(Debug, Clone, Copy)]
pub struct FsmConfig {
    /// Probability at or above which the confirm timer accrues.
    pub p_on: f32,
    /// Probability at or below which the release timer accrues. Must be
    /// strictly below `p_on`; the gap is the hysteresis band.
    pub p_off: f32,
    /// Sustained time above `p_on` required to confirm a start (ms).
    pub t_confirm_ms: u32,
    /// Sustained time below `p_off` required to confirm an end (ms).
    pub t_release_ms: u32,
    /// Duration after an end during which no start can fire (ms).
    pub cooldown_ms: u32,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            p_on: defaults::P_ON,
            p_off: defaults::P_OFF,
            t_confirm_ms: defaults::T_CONFIRM_MS,
            t_release_ms: defaults::T_RELEASE_MS,
            cooldown_ms: defaults::COOLDOWN_MS,
        }
    }
}

impl From<&DetectionConfig> for FsmConfig {
    fn from(d: &DetectionConfig) -> Self {
        Self {
            p_on: d.p_on,
            p_off: d.p_off,
            t_confirm_ms: d.t_confirm_ms,
            t_release_ms: d.t_release_ms,
            cooldown_ms: d.cooldown_ms,
        }
    }
}

/// Result of one tick, with single-pulse edge flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsmUpdate {
    pub state: EventState,
    /// True only on the tick of the Idle/Candidate → Active transition.
    pub started: bool,
    /// True only on the tick of the Active → Cooldown transition.
    pub ended: bool,
}

/// Debounced event detector driven by `(probability, elapsed_ms)` ticks.
///
/// Single-writer; concurrent calls require external serialization.
#[derive(Debug)]
pub struct EventFsm {
    config: FsmConfig,
    state: EventState,
    confirm_ms: u64,
    release_ms: u64,
    cooldown_left_ms: u64,
}

impl EventFsm {
    /// Creates a state machine, rejecting thresholds without a hysteresis gap.
    pub fn new(config: FsmConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.p_on) || !(0.0..=1.0).contains(&config.p_off) {
            return Err(EarwatchError::ConfigInvalidValue {
                key: "p_on".to_string(),
                message: "thresholds must be in 0.0..=1.0".to_string(),
            });
        }
        if config.p_on <= config.p_off {
            return Err(EarwatchError::ConfigInvalidValue {
                key: "p_on".to_string(),
                message: "must be greater than p_off".to_string(),
            });
        }
        Ok(Self {
            config,
            state: EventState::Idle,
            confirm_ms: 0,
            release_ms: 0,
            cooldown_left_ms: 0,
        })
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    /// Returns to Idle with all timers cleared.
    pub fn reset(&mut self) {
        self.state = EventState::Idle;
        self.confirm_ms = 0;
        self.release_ms = 0;
        self.cooldown_left_ms = 0;
    }

    /// Advances one tick. `p` is clamped to [0, 1], negative `dt_ms` is
    /// treated as zero. Edge flags are true only on the transition tick.
    pub fn update(&mut self, p: f32, dt_ms: i64) -> FsmUpdate {
        let p = p.clamp(0.0, 1.0);
        let dt = dt_ms.max(0) as u64;

        let mut out = FsmUpdate::default();

        match self.state {
            EventState::Idle => {
                self.confirm_ms = 0;
                self.release_ms = 0;

                if p >= self.config.p_on {
                    self.confirm_ms = dt;
                    if self.confirm_ms >= self.config.t_confirm_ms as u64 {
                        self.state = EventState::Active;
                        out.started = true;
                        self.confirm_ms = 0;
                    } else {
                        self.state = EventState::Candidate;
                    }
                }
            }

            EventState::Candidate => {
                self.release_ms = 0;

                if p >= self.config.p_on {
                    self.confirm_ms += dt;
                    if self.confirm_ms >= self.config.t_confirm_ms as u64 {
                        self.state = EventState::Active;
                        out.started = true;
                        self.confirm_ms = 0;
                    }
                } else {
                    // Fell below p_on before confirm, no fractional carry-over.
                    self.state = EventState::Idle;
                    self.confirm_ms = 0;
                }
            }

            EventState::Active => {
                self.confirm_ms = 0;

                if p <= self.config.p_off {
                    self.release_ms += dt;
                    if self.release_ms >= self.config.t_release_ms as u64 {
                        self.state = EventState::Cooldown;
                        self.cooldown_left_ms = self.config.cooldown_ms as u64;
                        out.ended = true;
                        self.release_ms = 0;
                    }
                } else {
                    self.release_ms = 0;
                }
            }

            EventState::Cooldown => {
                self.confirm_ms = 0;
                self.release_ms = 0;

                // Cooldown drains irrespective of p; no start can fire here.
                self.cooldown_left_ms = self.cooldown_left_ms.saturating_sub(dt);
                if self.cooldown_left_ms == 0 {
                    self.state = EventState::Idle;
                }
            }
        }

        out.state = self.state;
        out
    }
}
