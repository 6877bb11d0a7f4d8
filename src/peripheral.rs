//! Simulated peripherals.
//!
//! `LightBulb` is a stand-in for a real actuator: it flips an in-memory switch
//! and reports what it did. It is what the demo binary and the end-to-end tests
//! dispatch to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::executor::thread_label;
use crate::trigger::Trigger;
use crate::triggerable::{accept_or_report, Triggerable};

/// Switch on.
pub const ACTION_ON: &str = "On";
/// Switch off.
pub const ACTION_OFF: &str = "Off";
/// Flip the switch.
pub const ACTION_TOGGLE: &str = "Toggle";

/// A named on/off light.
///
/// `On` with a non-zero duration schedules an automatic `Off` and a second
/// report once the duration has elapsed. Any command received in the meantime
/// supersedes the scheduled `Off`: the bulb is left alone and the second
/// report says so.
#[derive(Debug)]
pub struct LightBulb {
    name: String,
    // Bit 0 is the switch, the remaining bits count commands.
    state: Arc<AtomicU64>,
}

impl LightBulb {
    /// A bulb that starts switched off.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current switch state.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst) & 1 == 1
    }

    /// Applies a command and returns the previous switch state together with
    /// the generation the command created.
    fn command(&self, next: impl Fn(bool) -> bool) -> (bool, u64) {
        let apply = |s: u64| {
            let generation = (s >> 1) + 1;
            (generation << 1) | u64::from(next(s & 1 == 1))
        };
        let prev = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| Some(apply(s)))
            .unwrap_or_else(|s| s);
        (prev & 1 == 1, (prev >> 1) + 1)
    }

    fn switch_on(&self, trigger: Trigger) {
        let (_, generation) = self.command(|_| true);
        if !trigger.duration.is_zero() {
            self.schedule_off(trigger.clone(), generation);
        }
        let msg = format!(
            "{} executing {ACTION_ON} at {} for duration {:?}",
            self.name,
            Utc::now().to_rfc3339(),
            trigger.duration
        );
        self.reply(trigger, msg);
    }

    fn schedule_off(&self, trigger: Trigger, generation: u64) {
        let name = self.name.clone();
        let state = Arc::clone(&self.state);
        let spawned = thread::Builder::new()
            .name(thread_label(&format!("{name}-off-timer")))
            .spawn(move || {
                let after: Duration = trigger.duration;
                thread::sleep(after);
                // Only switch off if nothing happened since our own `On`.
                let switched = state
                    .compare_exchange(
                        (generation << 1) | 1,
                        generation << 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok();
                let msg = if switched {
                    format!("{name} executed {ACTION_OFF} after {after:?}")
                } else {
                    format!(
                        "{name} skipped {ACTION_OFF} after {after:?}: superseded by a newer command"
                    )
                };
                debug!(receiver = %name, trigger_id = %trigger.id, switched, "deferred switch off");
                if let Err(e) = trigger.with_message(msg).report() {
                    warn!(receiver = %name, error = %e, "failed to send deferred report");
                }
            });
        if let Err(e) = spawned {
            warn!(receiver = %self.name, error = %e, "could not schedule deferred switch off");
        }
    }

    fn reply(&self, trigger: Trigger, message: String) {
        info!(receiver = %self.name, action = %trigger.action, "{message}");
        if let Err(e) = trigger.with_message(message).report() {
            warn!(receiver = %self.name, error = %e, "failed to report");
        }
    }
}

impl Triggerable for LightBulb {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, trigger: Trigger) {
        let Some(trigger) = accept_or_report(&self.name, trigger) else {
            return;
        };

        match trigger.action.as_str() {
            ACTION_ON => self.switch_on(trigger),
            ACTION_OFF => {
                self.command(|_| false);
                let msg = format!("{} executing {ACTION_OFF} at {}", self.name, Utc::now().to_rfc3339());
                self.reply(trigger, msg);
            }
            ACTION_TOGGLE => {
                let (was_on, _) = self.command(|on| !on);
                let msg = format!(
                    "{} executing {ACTION_TOGGLE} at {} (now {})",
                    self.name,
                    Utc::now().to_rfc3339(),
                    if was_on { "off" } else { "on" }
                );
                self.reply(trigger, msg);
            }
            other => {
                debug!(receiver = %self.name, action = other, "ignoring unknown action");
            }
        }
    }
}
