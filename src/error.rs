//! Error types for trigger dispatch.
//!
//! Routing and execution failures are normally *reported data*: they travel
//! back to the producer as error triggers on the reply channel. The types in
//! this module are what the engine and receivers use internally to build those
//! reports, and what the handful of fallible API calls (registration, control
//! requests, reporting) return directly.

use thiserror::Error;

/// Errors caught while validating registrations.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Receiver name cannot be empty")]
    EmptyName,

    #[error("Receiver name '{name}' is reserved for the dispatcher")]
    ReservedName {
        name: String,
    },

    #[error("Name {name:?} contains a NUL byte")]
    NulInName {
        name: String,
    },
}

/// Errors produced while matching a trigger to a receiver.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("{target} Target unknown to the Dispatcher ({} known Triggerables named: {})", .known.len(), .known.join(", "))]
    UnknownTarget {
        target: String,
        known: Vec<String>,
    },

    #[error("error - {receiver} received a trigger intended for {target}")]
    Misrouted {
        receiver: String,
        target: String,
    },

    #[error("failed to start execution on {receiver}: {message}")]
    SpawnFailed {
        receiver: String,
        message: String,
    },
}

/// Channel failures: missing or closed reply channels, dead control loops.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Trigger for '{target}' carries no report channel")]
    NoReportChannel {
        target: String,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },
}

/// Top-level error type.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl TriggerError {
    /// Shorthand for a disconnected channel on `path`.
    #[must_use]
    pub fn disconnected(path: impl Into<String>) -> Self {
        Self::Channel(ChannelError::Disconnected { path: path.into() })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a routing error.
    #[must_use]
    pub const fn is_routing(&self) -> bool {
        matches!(self, Self::Routing(_))
    }

    /// Returns true if this is a channel error.
    #[must_use]
    pub const fn is_channel(&self) -> bool {
        matches!(self, Self::Channel(_))
    }
}

/// Result type alias for trigger operations.
pub type TriggerResult<T> = Result<T, TriggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_target_names_registry_size_and_members() {
        let err = RoutingError::UnknownTarget {
            target: "LightBulb3".to_string(),
            known: vec!["LightBulb1".to_string(), "LightBulb2".to_string()],
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("LightBulb3 Target unknown to the Dispatcher"));
        assert!(msg.contains("2 known Triggerables"));
        assert!(msg.contains("LightBulb1, LightBulb2"));
    }

    #[test]
    fn unknown_target_with_empty_registry() {
        let err = RoutingError::UnknownTarget {
            target: "x".to_string(),
            known: Vec::new(),
        };
        assert!(format!("{err}").contains("0 known Triggerables"));
    }

    #[test]
    fn misrouted_names_both_sides() {
        let err = RoutingError::Misrouted {
            receiver: "A".to_string(),
            target: "B".to_string(),
        };
        assert_eq!(format!("{err}"), "error - A received a trigger intended for B");
    }

    #[test]
    fn nul_in_name_is_rendered_escaped() {
        let err = ValidationError::NulInName {
            name: "bulb\0x".to_string(),
        };
        assert_eq!(format!("{err}"), "Name \"bulb\\0x\" contains a NUL byte");
    }

    #[test]
    fn top_level_classification() {
        let v: TriggerError = ValidationError::EmptyName.into();
        assert!(v.is_validation());
        assert!(!v.is_channel());

        let r: TriggerError = RoutingError::Misrouted {
            receiver: "a".to_string(),
            target: "b".to_string(),
        }
        .into();
        assert!(r.is_routing());

        let c = TriggerError::disconnected("dispatch_control");
        assert!(c.is_channel());
        assert!(format!("{c}").contains("dispatch_control"));
    }
}
