//! Dispatch engine.
//!
//! The dispatcher owns the receiver registry and a single consuming loop over
//! the inbound trigger channel. Triggers are matched strictly in arrival
//! order; each match is handed to the executor and the loop moves on without
//! waiting for the receiver. Everything the producer learns comes back on the
//! trigger's reply channel:
//!
//! - `target == "?"`: the registry names, comma-separated, in registration order.
//! - unknown target: a `"MISO"` / `"ErrorReport"` trigger describing the miss.
//! - known target: whatever the receiver chooses to report.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, never, select, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::{RoutingError, TriggerError, TriggerResult, ValidationError};
use crate::executor::{ExecutionMode, Executor};
use crate::trigger::{Trigger, INTROSPECTION_TARGET, SYSTEM_TARGET};
use crate::triggerable::Triggerable;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How matched triggers are executed.
    pub execution: ExecutionMode,
    /// Max queued control messages (register/unregister/list) for a spawned
    /// dispatcher.
    pub control_queue_capacity: usize,
    /// Name for the dispatch thread; execution threads derive theirs from it.
    pub thread_name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::SpawnPerMatch,
            control_queue_capacity: 64,
            thread_name: "trigger-dispatch".to_string(),
        }
    }
}

/// Ordered set of addressable receivers.
///
/// Lookup is linear and returns the first receiver with a matching name, so a
/// later registration under an existing name is never reached.
#[derive(Default, Clone)]
pub struct Registry {
    receivers: Vec<Arc<dyn Triggerable>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `receivers` in order.
    ///
    /// Rejects the whole batch if any name is empty or reserved.
    pub fn add<I>(&mut self, receivers: I) -> TriggerResult<usize>
    where
        I: IntoIterator<Item = Arc<dyn Triggerable>>,
    {
        let batch: Vec<Arc<dyn Triggerable>> = receivers.into_iter().collect();
        for r in &batch {
            validate_name(r.name())?;
        }
        let added = batch.len();
        self.receivers.extend(batch);
        Ok(added)
    }

    /// Removes every receiver registered as `name`; returns how many.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.receivers.len();
        self.receivers.retain(|r| r.name() != name);
        before - self.receivers.len()
    }

    /// First receiver whose name equals `target` exactly.
    #[must_use]
    pub fn find(&self, target: &str) -> Option<&Arc<dyn Triggerable>> {
        self.receivers.iter().find(|r| r.name() == target)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.receivers.iter().map(|r| r.name().to_string()).collect()
    }

    /// Number of registered receivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.receivers.iter().map(|r| r.name())).finish()
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    validate_thread_name(name)?;
    if name == SYSTEM_TARGET || name == INTROSPECTION_TARGET {
        return Err(ValidationError::ReservedName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Names end up in OS thread names, which cannot hold NUL bytes.
fn validate_thread_name(name: &str) -> Result<(), ValidationError> {
    if name.contains('\0') {
        return Err(ValidationError::NulInName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Outcome of routing one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RouteOutcome {
    /// The registry listing was sent back.
    Introspected,
    /// A receiver was found and its execution started.
    Matched(String),
    /// No receiver matched; an error report was sent back.
    Unknown,
}

/// Messages a [`DispatchHandle`] sends to a running dispatch loop.
enum ControlMsg {
    Register {
        receivers: Vec<Arc<dyn Triggerable>>,
        reply: Sender<TriggerResult<usize>>,
    },
    Unregister {
        name: String,
        reply: Sender<usize>,
    },
    Names {
        reply: Sender<Vec<String>>,
    },
}

/// The dispatch engine.
pub struct Dispatcher {
    cfg: DispatchConfig,
    inbound: Receiver<Trigger>,
    registry: Registry,
}

impl Dispatcher {
    /// A dispatcher consuming `inbound` with the default configuration.
    #[must_use]
    pub fn new(inbound: Receiver<Trigger>) -> Self {
        Self::with_config(inbound, DispatchConfig::default())
    }

    /// A dispatcher consuming `inbound` with `cfg`.
    #[must_use]
    pub fn with_config(inbound: Receiver<Trigger>, cfg: DispatchConfig) -> Self {
        Self {
            cfg,
            inbound,
            registry: Registry::new(),
        }
    }

    /// Makes `receivers` addressable. An empty batch is a no-op.
    pub fn add_to_dispatch<I>(&mut self, receivers: I) -> TriggerResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Triggerable>>,
    {
        let added = self.registry.add(receivers)?;
        if added > 0 {
            debug!(added, total = self.registry.len(), "adding triggerables to dispatch");
        }
        Ok(())
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// The registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs the loop on the calling thread until every inbound sender is
    /// dropped.
    pub fn dispatch(self) -> TriggerResult<()> {
        validate_thread_name(&self.cfg.thread_name)?;
        let executor = Executor::start(&self.cfg.thread_name, self.cfg.execution)
            .map_err(|e| TriggerError::disconnected(format!("executor: {e}")))?;
        run_loop(self.registry, &executor, &self.inbound, never());
        executor.shutdown();
        Ok(())
    }

    /// Runs the loop on its own named thread.
    ///
    /// The returned handle can add and remove receivers while the loop runs.
    pub fn spawn(self) -> TriggerResult<DispatchHandle> {
        validate_thread_name(&self.cfg.thread_name)?;
        let executor = Executor::start(&self.cfg.thread_name, self.cfg.execution)
            .map_err(|e| TriggerError::disconnected(format!("executor: {e}")))?;
        let (control_tx, control_rx) = bounded::<ControlMsg>(self.cfg.control_queue_capacity.max(1));

        let Self { cfg, inbound, registry } = self;
        let join = thread::Builder::new()
            .name(cfg.thread_name.clone())
            .spawn(move || {
                run_loop(registry, &executor, &inbound, control_rx);
                executor.shutdown();
            })
            .map_err(|e| TriggerError::disconnected(format!("dispatch thread: {e}")))?;

        Ok(DispatchHandle {
            control_tx,
            join: Some(join),
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cfg", &self.cfg)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn run_loop(
    mut registry: Registry,
    executor: &Executor,
    inbound: &Receiver<Trigger>,
    control_rx: Receiver<ControlMsg>,
) {
    info!(targets = registry.len(), names = ?registry.names(), "dispatching");

    let closed = never::<ControlMsg>();
    let mut control_closed = false;

    loop {
        let control = if control_closed { &closed } else { &control_rx };
        select! {
            recv(control) -> msg => match msg {
                Ok(msg) => handle_control(&mut registry, msg),
                // Handle dropped: keep serving triggers with a fixed registry.
                Err(_) => control_closed = true,
            },
            recv(inbound) -> msg => match msg {
                Ok(trigger) => {
                    route(&registry, executor, trigger);
                }
                Err(_) => break,
            },
        }
    }

    info!("inbound channel closed, dispatch loop exiting");
}

fn handle_control(registry: &mut Registry, msg: ControlMsg) {
    match msg {
        ControlMsg::Register { receivers, reply } => {
            let result = registry.add(receivers);
            if let Ok(added) = &result {
                debug!(added, total = registry.len(), "registered triggerables");
            }
            let _ = reply.send(result);
        }
        ControlMsg::Unregister { name, reply } => {
            let removed = registry.remove(&name);
            debug!(name = %name, removed, "unregistered triggerables");
            let _ = reply.send(removed);
        }
        ControlMsg::Names { reply } => {
            let _ = reply.send(registry.names());
        }
    }
}

/// Matches one trigger against `registry` and acts on the result.
pub(crate) fn route(registry: &Registry, executor: &Executor, trigger: Trigger) -> RouteOutcome {
    if trigger.is_introspection() {
        let listing = format!("Valid targets: {}", registry.names().join(", "));
        debug!(trigger_id = %trigger.id, "{listing}");
        if let Err(e) = trigger.with_message(listing).report() {
            warn!(error = %e, "failed to answer introspection query");
        }
        return RouteOutcome::Introspected;
    }

    match registry.find(&trigger.target) {
        Some(receiver) => {
            let name = receiver.name().to_string();
            debug!(receiver = %name, trigger_id = %trigger.id, action = %trigger.action, "matched trigger");
            executor.submit(Arc::clone(receiver), trigger);
            RouteOutcome::Matched(name)
        }
        None => {
            let err = RoutingError::UnknownTarget {
                target: trigger.target.clone(),
                known: registry.names(),
            };
            warn!(trigger_id = %trigger.id, error = %err, "dispatcher error");
            if let Err(e) = trigger.into_system_error(err.to_string()).report() {
                warn!(error = %e, "failed to report unknown target");
            }
            RouteOutcome::Unknown
        }
    }
}

/// Handle to a dispatch loop started with [`Dispatcher::spawn`].
///
/// The loop itself stops when every inbound sender is dropped, not when the
/// handle is. Dropping the handle detaches the thread and freezes the
/// registry.
#[derive(Debug)]
pub struct DispatchHandle {
    control_tx: Sender<ControlMsg>,
    join: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ControlMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register { receivers, .. } => f
                .debug_struct("Register")
                .field("names", &receivers.iter().map(|r| r.name()).collect::<Vec<_>>())
                .finish_non_exhaustive(),
            Self::Unregister { name, .. } => f.debug_struct("Unregister").field("name", name).finish_non_exhaustive(),
            Self::Names { .. } => f.debug_struct("Names").finish_non_exhaustive(),
        }
    }
}

impl DispatchHandle {
    /// Adds `receivers` to the running loop.
    ///
    /// Returns once the loop has applied the change, so triggers sent
    /// afterwards can match them.
    pub fn register<I>(&self, receivers: I) -> TriggerResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Triggerable>>,
    {
        let receivers: Vec<Arc<dyn Triggerable>> = receivers.into_iter().collect();
        if receivers.is_empty() {
            return Ok(());
        }
        let (reply, reply_rx) = bounded(1);
        self.control(ControlMsg::Register { receivers, reply })?;
        reply_rx
            .recv()
            .map_err(|_| TriggerError::disconnected("dispatch_control"))?
            .map(|_| ())
    }

    /// Removes every receiver named `name`; returns how many were removed.
    pub fn unregister(&self, name: &str) -> TriggerResult<usize> {
        let (reply, reply_rx) = bounded(1);
        self.control(ControlMsg::Unregister {
            name: name.to_string(),
            reply,
        })?;
        reply_rx
            .recv()
            .map_err(|_| TriggerError::disconnected("dispatch_control"))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> TriggerResult<Vec<String>> {
        let (reply, reply_rx) = bounded(1);
        self.control(ControlMsg::Names { reply })?;
        reply_rx
            .recv()
            .map_err(|_| TriggerError::disconnected("dispatch_control"))
    }

    /// Waits for the loop to exit. Pooled executions are drained first.
    pub fn join(mut self) -> TriggerResult<()> {
        match self.join.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TriggerError::disconnected("dispatch thread panicked")),
            None => Ok(()),
        }
    }

    fn control(&self, msg: ControlMsg) -> TriggerResult<()> {
        self.control_tx
            .send(msg)
            .map_err(|_| TriggerError::disconnected("dispatch_control"))
    }
}
