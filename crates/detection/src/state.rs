//! Alert state machine with hysteresis and cooldown

use crate::config::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Alert phase
///
/// `Active` is a momentary firing signal, not a held state: after a fire the
/// machine keeps tracking Suspect/Idle so a new alert can re-arm as soon as
/// the cooldown allows. The UI-facing display flag is managed separately by
/// the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertPhase {
    #[default]
    Idle,
    Suspect,
    Active,
}

/// Hysteresis state machine over the drowsiness ratio.
///
/// Arms on `ratio > arm_ratio` (strict), disarms on `ratio <= disarm_ratio`;
/// the band between is sticky in both directions. Once armed for
/// `alert_threshold` continuously, fires, at most once per `cooldown`.
/// All decisions take `now` explicitly so tests can drive simulated time.
pub struct AlertStateMachine {
    phase: AlertPhase,
    suspect_since: Option<Instant>,
    last_fired: Option<Instant>,
    alert_threshold: Duration,
    cooldown: Duration,
    arm_ratio: f32,
    disarm_ratio: f32,
}

impl AlertStateMachine {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            phase: AlertPhase::Idle,
            suspect_since: None,
            last_fired: None,
            alert_threshold: config.alert_threshold(),
            cooldown: config.cooldown(),
            arm_ratio: config.arm_ratio,
            disarm_ratio: config.disarm_ratio,
        }
    }

    /// Feed one window ratio observation. Returns `true` when an alert fires.
    pub fn observe(&mut self, ratio: f32, now: Instant) -> bool {
        match self.phase {
            AlertPhase::Idle => {
                if ratio > self.arm_ratio {
                    self.phase = AlertPhase::Suspect;
                    self.suspect_since = Some(now);
                    debug!(ratio, "suspect armed");
                }
                false
            }
            AlertPhase::Suspect | AlertPhase::Active => {
                if ratio <= self.disarm_ratio {
                    self.phase = AlertPhase::Idle;
                    self.suspect_since = None;
                    debug!(ratio, "suspect disarmed");
                    return false;
                }

                let since = *self.suspect_since.get_or_insert(now);
                if now.duration_since(since) >= self.alert_threshold && self.cooldown_elapsed(now) {
                    self.phase = AlertPhase::Active;
                    self.last_fired = Some(now);
                    return true;
                }
                false
            }
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_fired {
            Some(fired) => now.duration_since(fired) > self.cooldown,
            None => true,
        }
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    /// Progress toward firing in [0, 1]: elapsed suspect time over the
    /// sustain threshold. Zero while not armed.
    pub fn progress(&self, now: Instant) -> f32 {
        match self.suspect_since {
            Some(since) => {
                let elapsed = now.duration_since(since).as_secs_f32();
                (elapsed / self.alert_threshold.as_secs_f32()).min(1.0)
            }
            None => 0.0,
        }
    }

    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }
}
