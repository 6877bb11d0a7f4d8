//! Execution units for matched triggers.
//!
//! The dispatcher hands every match to an [`Executor`] and moves on. By default
//! each match gets its own thread; a bounded worker pool can be configured
//! instead without changing the fire-and-forget contract.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, warn};

use crate::error::RoutingError;
use crate::trigger::Trigger;
use crate::triggerable::Triggerable;

/// How matched triggers are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One thread per matched trigger.
    #[default]
    SpawnPerMatch,
    /// A fixed set of worker threads fed by a bounded queue. Submitting
    /// blocks the dispatch loop while the queue is full.
    Pool {
        /// Number of worker threads.
        workers: usize,
        /// Maximum queued executions.
        queue_capacity: usize,
    },
}

struct Job {
    receiver: Arc<dyn Triggerable>,
    trigger: Trigger,
}

fn run_job(job: Job) {
    let Job { receiver, trigger } = job;
    debug!(receiver = receiver.name(), trigger_id = %trigger.id, action = %trigger.action, "executing trigger");
    let name = receiver.name().to_string();
    if panic::catch_unwind(AssertUnwindSafe(|| receiver.execute(trigger))).is_err() {
        error!(receiver = %name, "receiver panicked during execute");
    }
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn start(name: &str, workers: usize, queue_capacity: usize) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity.max(1));

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let handle = thread::Builder::new()
                .name(thread_label(&format!("{name}-exec-{idx}")))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        run_job(job);
                    }
                })?;
            handles.push(handle);
        }

        Ok(Self { tx, workers: handles })
    }

    fn shutdown(self) {
        // Close the queue: workers drain what is left, then exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

enum Strategy {
    Spawn,
    Pool(WorkerPool),
}

/// Runs matched triggers without making the caller wait for them.
pub(crate) struct Executor {
    name: String,
    strategy: Strategy,
}

impl Executor {
    /// Builds the executor for `mode`. Pool threads are named after `name`.
    pub(crate) fn start(name: &str, mode: ExecutionMode) -> std::io::Result<Self> {
        let strategy = match mode {
            ExecutionMode::SpawnPerMatch => Strategy::Spawn,
            ExecutionMode::Pool {
                workers,
                queue_capacity,
            } => Strategy::Pool(WorkerPool::start(name, workers, queue_capacity)?),
        };
        Ok(Self {
            name: name.to_string(),
            strategy,
        })
    }

    /// Hands `trigger` to `receiver` on another thread.
    ///
    /// If no execution unit can be started the failure is reported on the
    /// trigger's reply channel as a system error.
    pub(crate) fn submit(&self, receiver: Arc<dyn Triggerable>, trigger: Trigger) {
        let job = Job { receiver, trigger };
        match &self.strategy {
            Strategy::Spawn => {
                let thread_name =
                    thread_label(&format!("{}-exec-{}", self.name, job.receiver.name()));
                // The closure is dropped on spawn failure, so keep what is
                // needed to report it.
                let fallback = (job.receiver.name().to_string(), job.trigger.clone());
                if let Err(e) = thread::Builder::new().name(thread_name).spawn(move || run_job(job)) {
                    let (receiver, trigger) = fallback;
                    report_spawn_failure(&receiver, trigger, &e.to_string());
                }
            }
            Strategy::Pool(pool) => {
                if let Err(returned) = pool.tx.send(job) {
                    let Job { receiver, trigger } = returned.into_inner();
                    report_spawn_failure(receiver.name(), trigger, "execution pool is shut down");
                }
            }
        }
    }

    /// Waits for pooled executions to finish. Spawned threads are detached.
    pub(crate) fn shutdown(self) {
        if let Strategy::Pool(pool) = self.strategy {
            pool.shutdown();
        }
    }
}

/// `thread::Builder::spawn` panics on interior NUL bytes; drop them.
pub(crate) fn thread_label(raw: &str) -> String {
    raw.replace('\0', "")
}

fn report_spawn_failure(receiver: &str, trigger: Trigger, message: &str) {
    let err = RoutingError::SpawnFailed {
        receiver: receiver.to_string(),
        message: message.to_string(),
    };
    error!(receiver, error = %err, "could not start execution");
    if let Err(e) = trigger.into_system_error(err.to_string()).report() {
        warn!(receiver, error = %e, "failed to report execution failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::trigger::report_channel;

    struct Counter {
        name: String,
        calls: AtomicUsize,
        panic_on: Option<&'static str>,
    }

    impl Counter {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                calls: AtomicUsize::new(0),
                panic_on: None,
            }
        }
    }

    impl Triggerable for Counter {
        fn name(&self) -> &str {
            &self.name
        }

        fn execute(&self, trigger: Trigger) {
            if self.panic_on == Some(trigger.action.as_str()) {
                panic!("boom");
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = trigger.with_message("done").report();
        }
    }

    #[test]
    fn spawn_per_match_executes_and_reports() {
        let exec = Executor::start("test", ExecutionMode::SpawnPerMatch).unwrap();
        let receiver = Arc::new(Counter::new("A"));
        let (tx, rx) = report_channel(4);

        exec.submit(receiver.clone(), Trigger::new("A", "On").report_to(tx));

        let report = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(report.message, "done");
        assert_eq!(receiver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spawn_survives_nul_in_receiver_name() {
        let exec = Executor::start("test", ExecutionMode::SpawnPerMatch).unwrap();
        let receiver = Arc::new(Counter::new("bulb\0x"));
        let (tx, rx) = report_channel(4);

        exec.submit(receiver.clone(), Trigger::new("bulb\0x", "On").report_to(tx));

        let report = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(report.message, "done");
        assert_eq!(thread_label("a\0b-exec"), "ab-exec");
    }

    #[test]
    fn pool_executes_every_submission() {
        let exec = Executor::start(
            "test",
            ExecutionMode::Pool {
                workers: 2,
                queue_capacity: 4,
            },
        )
        .unwrap();
        let receiver = Arc::new(Counter::new("A"));
        let (tx, rx) = report_channel(16);

        for _ in 0..8 {
            exec.submit(receiver.clone(), Trigger::new("A", "On").report_to(tx.clone()));
        }
        exec.shutdown();

        assert_eq!(receiver.calls.load(Ordering::SeqCst), 8);
        assert_eq!(rx.len(), 8);
    }

    #[test]
    fn pool_worker_survives_receiver_panic() {
        let exec = Executor::start(
            "test",
            ExecutionMode::Pool {
                workers: 1,
                queue_capacity: 4,
            },
        )
        .unwrap();
        let receiver = Arc::new(Counter {
            panic_on: Some("Explode"),
            ..Counter::new("A")
        });
        let (tx, rx) = report_channel(4);

        exec.submit(receiver.clone(), Trigger::new("A", "Explode").report_to(tx.clone()));
        exec.submit(receiver.clone(), Trigger::new("A", "On").report_to(tx));

        let report = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(report.action, "On");
        exec.shutdown();
        assert_eq!(receiver.calls.load(Ordering::SeqCst), 1);
    }
}
