//! # trigger - name-addressed command dispatch
//!
//! A producer sends a [`Trigger`] naming a target receiver and an action. The
//! [`Dispatcher`] matches the target against the names of registered
//! [`Triggerable`]s and runs the match concurrently. Outcomes, including
//! routing errors, come back to the producer on the reply channel carried by
//! the trigger itself.
//!
//! ## Protocol
//!
//! - `target == "?"` asks for the registered names.
//! - An unknown target is answered with `target == "MISO"` and
//!   `action == "ErrorReport"`.
//! - Receivers report misrouted triggers with `action == "ErrorReport"` and
//!   their own name as target.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use trigger::{report_channel, trigger_channel, Dispatcher, LightBulb, Trigger, Triggerable};
//!
//! # fn main() -> Result<(), trigger::TriggerError> {
//! let (inbound_tx, inbound_rx) = trigger_channel(1);
//! let (report_tx, report_rx) = report_channel(16);
//!
//! let mut dispatcher = Dispatcher::new(inbound_rx);
//! dispatcher.add_to_dispatch([Arc::new(LightBulb::new("LightBulb1")) as Arc<dyn Triggerable>])?;
//! let _handle = dispatcher.spawn()?;
//!
//! inbound_tx
//!     .send(Trigger::new("LightBulb1", "On").report_to(report_tx))
//!     .expect("dispatcher running");
//! let report = report_rx.recv_timeout(Duration::from_secs(1)).expect("report");
//! println!("{}", report.message);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod peripheral;
pub mod trigger;
pub mod triggerable;

// Re-export primary types at crate root for convenience
pub use bridge::{JsonLinesSink, LogSink, ReportBridge, ReportSink};
pub use dispatcher::{DispatchConfig, DispatchHandle, Dispatcher, Registry};
pub use error::{ChannelError, RoutingError, TriggerError, TriggerResult, ValidationError};
pub use executor::ExecutionMode;
pub use peripheral::LightBulb;
pub use trigger::{
    report_channel, trigger_channel, ReportReceiver, ReportSender, Trigger, TriggerId,
    DEFAULT_INBOUND_CAPACITY, ERROR_REPORT_ACTION, INTROSPECTION_TARGET, SYSTEM_TARGET,
};
pub use triggerable::{accept_or_report, Triggerable};
