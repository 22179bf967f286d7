//! Hover-and-hold unlock gesture with optional auto-lock.
//!
//! Every transition goes through [`UnlockGesture::enter`], which drops the
//! pending timer before scheduling the one that belongs to the new state. A
//! timer therefore never outlives the state it was scheduled for.

use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use crate::config::ConfigurationDocument;

/// Shortest duration any gesture timer may be configured to.
pub const MIN_GESTURE_DURATION: Duration = Duration::from_millis(100);
const MAX_GESTURE_DURATION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GestureState {
    Locked,
    AwaitingHold,
    Holding,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureTiming {
    pub wait: Duration,
    pub hold: Duration,
    pub hover_unlock: bool,
    pub auto_lock: Option<Duration>,
}

impl GestureTiming {
    pub fn new(wait_secs: f64, hold_secs: f64, hover_unlock: bool, auto_lock_secs: Option<f64>) -> Self {
        Self {
            wait: clamp_secs(wait_secs),
            hold: clamp_secs(hold_secs),
            hover_unlock,
            auto_lock: auto_lock_secs.map(clamp_secs),
        }
    }

    pub fn from_config(doc: &ConfigurationDocument) -> Self {
        Self::new(
            doc.unlock_wait_time,
            doc.unlock_hold_time,
            doc.enable_hover_unlock,
            doc.enable_auto_lock.then_some(doc.auto_lock_delay),
        )
    }
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self::from_config(&ConfigurationDocument::default())
    }
}

// Zero, negative or NaN durations would either never progress or complete
// instantly.
fn clamp_secs(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= MIN_GESTURE_DURATION.as_secs_f64() {
        MIN_GESTURE_DURATION
    } else {
        Duration::from_secs_f64(secs).min(MAX_GESTURE_DURATION)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureInput {
    HoverEnter,
    HoverLeave,
    PointerActivity,
    Tick,
    LockToggled(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureUpdate {
    pub state: GestureState,
    pub progress: f64,
    /// New value for the lock flag when the gesture itself changed it.
    pub lock_change: Option<bool>,
}

// The timer owned by the current state.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Wait { until: Instant },
    Hold { started: Instant },
    AutoLock { until: Instant },
}

#[derive(Debug)]
pub struct UnlockGesture {
    state: GestureState,
    timing: GestureTiming,
    pending: Option<Pending>,
    progress: f64,
}

impl UnlockGesture {
    pub fn new(locked: bool, timing: GestureTiming, now: Instant) -> Self {
        let mut gesture = Self {
            state: GestureState::Locked,
            timing,
            pending: None,
            progress: 0.0,
        };
        if !locked {
            gesture.enter(GestureState::Unlocked, now);
        }
        gesture
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn timing(&self) -> GestureTiming {
        self.timing
    }

    pub fn is_locked(&self) -> bool {
        self.state != GestureState::Unlocked
    }

    /// True while a timer is running and the owner should keep sending ticks.
    pub fn is_timing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn handle(&mut self, input: GestureInput, now: Instant) -> GestureUpdate {
        // An external toggle overrides whatever the timers would have done.
        let lock_change = match input {
            GestureInput::LockToggled(_) => None,
            _ => self.advance(now),
        };

        match (self.state, input) {
            (_, GestureInput::LockToggled(true)) => self.enter(GestureState::Locked, now),
            (_, GestureInput::LockToggled(false)) => self.enter(GestureState::Unlocked, now),
            (GestureState::Locked, GestureInput::HoverEnter) if self.timing.hover_unlock => {
                self.enter(GestureState::AwaitingHold, now)
            }
            (GestureState::AwaitingHold | GestureState::Holding, GestureInput::HoverLeave) => {
                debug!("Unlock gesture cancelled by pointer leave");
                self.enter(GestureState::Locked, now)
            }
            // The pointer has to rest on the overlay; moving it starts over.
            (GestureState::AwaitingHold | GestureState::Holding, GestureInput::PointerActivity) => {
                debug!("Unlock gesture restarted by pointer movement");
                self.enter(GestureState::AwaitingHold, now)
            }
            (
                GestureState::Unlocked,
                GestureInput::HoverEnter | GestureInput::HoverLeave | GestureInput::PointerActivity,
            ) => {
                if self.timing.auto_lock.is_some() {
                    self.enter(GestureState::Unlocked, now);
                }
            }
            _ => {}
        }

        self.update(lock_change)
    }

    /// Swap in new timing. Disabling hover unlock cancels a gesture in
    /// progress; changing auto-lock restarts or cancels its delay.
    pub fn set_timing(&mut self, timing: GestureTiming, now: Instant) {
        let previous = std::mem::replace(&mut self.timing, timing);
        match self.state {
            GestureState::AwaitingHold | GestureState::Holding if !timing.hover_unlock => {
                self.enter(GestureState::Locked, now)
            }
            GestureState::Unlocked if previous.auto_lock != timing.auto_lock => {
                self.enter(GestureState::Unlocked, now)
            }
            _ => {}
        }
    }

    fn update(&self, lock_change: Option<bool>) -> GestureUpdate {
        GestureUpdate {
            state: self.state,
            progress: self.progress,
            lock_change,
        }
    }

    // Run expired timers up to `now`. Returns a lock flag change if one fired.
    fn advance(&mut self, now: Instant) -> Option<bool> {
        loop {
            match self.pending {
                Some(Pending::Wait { until }) if now >= until => {
                    self.enter(GestureState::Holding, until);
                }
                Some(Pending::Hold { started }) => {
                    let elapsed = now.saturating_duration_since(started);
                    if elapsed >= self.timing.hold {
                        info!("Unlock gesture completed");
                        self.enter(GestureState::Unlocked, started + self.timing.hold);
                        return Some(false);
                    }
                    self.progress =
                        (elapsed.as_secs_f64() / self.timing.hold.as_secs_f64() * 100.0).min(100.0);
                    return None;
                }
                Some(Pending::AutoLock { until }) if now >= until => {
                    info!("Auto-locking overlay after inactivity");
                    self.enter(GestureState::Locked, until);
                    return Some(true);
                }
                _ => return None,
            }
        }
    }

    fn enter(&mut self, state: GestureState, at: Instant) {
        if self.state != state {
            debug!("Unlock gesture {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.progress = 0.0;
        self.pending = match state {
            GestureState::Locked => None,
            GestureState::AwaitingHold => Some(Pending::Wait {
                until: at + self.timing.wait,
            }),
            GestureState::Holding => Some(Pending::Hold { started: at }),
            GestureState::Unlocked => self
                .timing
                .auto_lock
                .map(|delay| Pending::AutoLock { until: at + delay }),
        };
    }
}
