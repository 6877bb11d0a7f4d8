//! The receiver capability.

use tracing::warn;

use crate::error::RoutingError;
use crate::trigger::Trigger;

/// Anything addressable by name that can execute a [`Trigger`].
///
/// The dispatcher may run `execute` for the same receiver on several threads
/// at once, so implementations keep their state behind their own
/// synchronization.
pub trait Triggerable: Send + Sync {
    /// Stable name the dispatcher matches `Trigger::target` against.
    fn name(&self) -> &str;

    /// Performs the trigger's action and reports on `trigger.report_to`.
    fn execute(&self, trigger: Trigger);
}

/// Checks that `trigger` is addressed to `receiver`.
///
/// Returns the trigger when it is. Otherwise publishes a misrouting error
/// report on the trigger's reply channel and returns `None`.
pub fn accept_or_report(receiver: &str, trigger: Trigger) -> Option<Trigger> {
    if trigger.target == receiver {
        return Some(trigger);
    }

    let err = RoutingError::Misrouted {
        receiver: receiver.to_string(),
        target: trigger.target.clone(),
    };
    warn!(receiver, target_name = %trigger.target, "rejecting misrouted trigger");
    let report = trigger.into_receiver_error(receiver, err.to_string());
    if let Err(e) = report.report() {
        warn!(receiver, error = %e, "failed to report misrouted trigger");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{report_channel, ERROR_REPORT_ACTION};

    #[test]
    fn accepts_matching_target() {
        let (tx, rx) = report_channel(1);
        let t = Trigger::new("A", "On").report_to(tx);
        let accepted = accept_or_report("A", t).unwrap();
        assert_eq!(accepted.target, "A");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rejects_and_reports_misrouted_target() {
        let (tx, rx) = report_channel(1);
        let t = Trigger::new("B", "On").report_to(tx);
        assert!(accept_or_report("A", t).is_none());

        let report = rx.try_recv().unwrap();
        assert_eq!(report.target, "A");
        assert_eq!(report.action, ERROR_REPORT_ACTION);
        assert!(report.message.contains("A received a trigger intended for B"));
    }

    #[test]
    fn rejects_misrouted_target_without_channel() {
        let t = Trigger::new("B", "On");
        assert!(accept_or_report("A", t).is_none());
    }
}
