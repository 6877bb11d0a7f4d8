//! Upstream report bridge.
//!
//! Reply channels are drained by a bridge thread that forwards every report to
//! a [`ReportSink`]. In a deployment the sink would publish to a message
//! broker; the sinks here log or write JSON lines.

use std::io::Write;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::error::{TriggerError, TriggerResult};
use crate::trigger::{ReportReceiver, Trigger};

/// Destination for reports leaving the process.
pub trait ReportSink: Send + 'static {
    /// Publishes one report.
    fn publish(&mut self, report: &Trigger) -> TriggerResult<()>;
}

/// Logs each report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn publish(&mut self, report: &Trigger) -> TriggerResult<()> {
        if report.is_error() {
            warn!(target_name = %report.target, trigger_id = %report.id, "upstream error report: {}", report.message);
        } else {
            info!(target_name = %report.target, trigger_id = %report.id, "upstream report: {}", report.message);
        }
        Ok(())
    }
}

/// Writes one JSON object per report, newline-terminated.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send + 'static> {
    out: W,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    /// Wraps `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> ReportSink for JsonLinesSink<W> {
    fn publish(&mut self, report: &Trigger) -> TriggerResult<()> {
        let line = report
            .to_json()
            .map_err(|e| TriggerError::disconnected(format!("report encoding: {e}")))?;
        writeln!(self.out, "{line}")
            .and_then(|()| self.out.flush())
            .map_err(|e| TriggerError::disconnected(format!("report sink: {e}")))
    }
}

/// Background consumer of a reply channel.
#[derive(Debug)]
pub struct ReportBridge<S: ReportSink> {
    join: JoinHandle<(S, u64)>,
}

impl<S: ReportSink> ReportBridge<S> {
    /// Starts draining `reports` into `sink` on a named thread.
    ///
    /// The thread stops once every sender of `reports` is dropped.
    pub fn spawn(reports: ReportReceiver, mut sink: S) -> TriggerResult<Self> {
        let join = thread::Builder::new()
            .name("trigger-report-bridge".to_string())
            .spawn(move || {
                let mut published = 0u64;
                for report in &reports {
                    match sink.publish(&report) {
                        Ok(()) => published += 1,
                        Err(e) => warn!(trigger_id = %report.id, error = %e, "dropping report"),
                    }
                }
                (sink, published)
            })
            .map_err(|e| TriggerError::disconnected(format!("report bridge: {e}")))?;
        Ok(Self { join })
    }

    /// Waits for the channel to close; returns the sink and how many reports
    /// it accepted.
    pub fn join(self) -> TriggerResult<(S, u64)> {
        self.join
            .join()
            .map_err(|_| TriggerError::disconnected("report bridge panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::trigger::report_channel;

    #[test]
    fn json_lines_sink_writes_one_line_per_report() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.publish(&Trigger::new("A", "On").with_message("first")).unwrap();
        sink.publish(&Trigger::new("B", "Off").with_message("second")).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let v: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(v["target"], "B");
        assert_eq!(v["message"], "second");
    }

    #[test]
    fn bridge_drains_until_senders_drop() {
        let (tx, rx) = report_channel(4);
        let bridge = ReportBridge::spawn(rx, JsonLinesSink::new(Vec::new())).unwrap();

        for i in 0..3 {
            Trigger::new("A", "On")
                .with_message(format!("report {i}"))
                .report_to(tx.clone())
                .report()
                .unwrap();
        }
        drop(tx);

        let (sink, published) = bridge.join().unwrap();
        assert_eq!(published, 3);
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.contains("report 0"));
        assert!(out.contains("report 2"));
    }

    #[test]
    fn log_sink_accepts_errors_and_statuses() {
        let mut sink = LogSink;
        sink.publish(&Trigger::new("A", "On")).unwrap();
        sink.publish(&Trigger::new("A", "On").into_system_error("x")).unwrap();
    }
}
