//! The trigger message and its protocol constants.
//!
//! A `Trigger` names a target receiver and an action for it to perform. It
//! travels producer -> dispatcher -> receiver by value, and the receiver (or
//! the dispatcher, on error) republishes the same value on the trigger's
//! reply channel after rewriting `message` and, for errors, `target`/`action`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChannelError, TriggerError, TriggerResult};

/// Target that asks the dispatcher for its registered receiver names.
pub const INTROSPECTION_TARGET: &str = "?";

/// Target reserved for dispatcher-originated reports.
pub const SYSTEM_TARGET: &str = "MISO";

/// Action reserved for error reports.
pub const ERROR_REPORT_ACTION: &str = "ErrorReport";

/// Capacity of the inbound channel returned by [`trigger_channel`] when the
/// caller has no better number.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1;

/// Sending half of a reply channel.
pub type ReportSender = Sender<Trigger>;

/// Receiving half of a reply channel.
pub type ReportReceiver = Receiver<Trigger>;

/// Creates the bounded inbound channel a dispatcher consumes.
///
/// Producers block on send once `capacity` triggers are queued.
#[must_use]
pub fn trigger_channel(capacity: usize) -> (Sender<Trigger>, Receiver<Trigger>) {
    bounded(capacity.max(1))
}

/// Creates a bounded reply channel.
#[must_use]
pub fn report_channel(capacity: usize) -> (ReportSender, ReportReceiver) {
    bounded(capacity.max(1))
}

/// Identifier used to correlate a trigger with the reports it causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(Uuid);

impl TriggerId {
    /// Create a new random trigger id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A requested action on a named target, plus where to report the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Correlation id; deferred reports reuse it.
    pub id: TriggerId,
    /// Name of the intended receiver, or [`INTROSPECTION_TARGET`].
    pub target: String,
    /// Receiver-defined verb.
    pub action: String,
    /// Span meaningful only to the receiver. Zero means no follow-up.
    pub duration: Duration,
    /// Status or error text. Empty on inbound requests.
    #[serde(default)]
    pub message: String,
    /// When the producer created the trigger.
    pub issued_at: DateTime<Utc>,
    /// Reply channel for this trigger's outcome.
    #[serde(skip)]
    pub report_to: Option<ReportSender>,
}

impl Trigger {
    /// Create a trigger for `target` with `action`, no duration and no
    /// reply channel.
    #[must_use]
    pub fn new(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: TriggerId::new(),
            target: target.into(),
            action: action.into(),
            duration: Duration::ZERO,
            message: String::new(),
            issued_at: Utc::now(),
            report_to: None,
        }
    }

    /// The introspection query.
    #[must_use]
    pub fn introspection() -> Self {
        Self::new(INTROSPECTION_TARGET, "")
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the reply channel.
    #[must_use]
    pub fn report_to(mut self, tx: ReportSender) -> Self {
        self.report_to = Some(tx);
        self
    }

    /// True for the `"?"` query.
    #[must_use]
    pub fn is_introspection(&self) -> bool {
        self.target == INTROSPECTION_TARGET
    }

    /// True if this trigger carries failure information.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.action == ERROR_REPORT_ACTION
    }

    /// True for error reports raised by the dispatcher itself.
    #[must_use]
    pub fn is_system_report(&self) -> bool {
        self.target == SYSTEM_TARGET && self.is_error()
    }

    /// Rewrites this trigger into a dispatcher error report.
    #[must_use]
    pub fn into_system_error(mut self, message: impl Into<String>) -> Self {
        self.target = SYSTEM_TARGET.to_string();
        self.action = ERROR_REPORT_ACTION.to_string();
        self.message = message.into();
        self
    }

    /// Rewrites this trigger into an error report raised by `receiver`.
    #[must_use]
    pub fn into_receiver_error(mut self, receiver: &str, message: impl Into<String>) -> Self {
        self.target = receiver.to_string();
        self.action = ERROR_REPORT_ACTION.to_string();
        self.message = message.into();
        self
    }

    /// Publishes this trigger on its own reply channel.
    ///
    /// Blocks while the reply channel is full.
    pub fn report(self) -> TriggerResult<()> {
        let Some(tx) = self.report_to.clone() else {
            return Err(TriggerError::Channel(ChannelError::NoReportChannel { target: self.target }));
        };
        tx.send(self)
            .map_err(|_| TriggerError::disconnected("report_channel"))
    }

    /// JSON rendering without the reply channel.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trigger {}", self.id)?;
        writeln!(f, "\tTarget: {}", self.target)?;
        writeln!(f, "\tAction: {}", self.action)?;
        writeln!(f, "\tDuration: {:?}", self.duration)?;
        writeln!(f, "\tMessage: {}", self.message)?;
        write!(f, "\tError: {}", self.is_error())
    }
}
