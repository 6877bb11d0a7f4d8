//! Trigger dispatch demo.
//!
//! Wires simulated light bulbs, a dispatcher and a fake upstream bridge
//! together, then replays a short scenario: switch on with a timed switch-off,
//! switch off, address an unknown bulb, switch on again, and list the
//! registered targets. Reports are printed to stdout as JSON lines.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use trigger::{
    report_channel, trigger_channel, DispatchConfig, Dispatcher, ExecutionMode, JsonLinesSink,
    LightBulb, ReportBridge, Trigger, TriggerError, Triggerable, DEFAULT_INBOUND_CAPACITY,
};

#[derive(Parser)]
#[command(name = "trigger-demo", about = "Dispatch triggers to simulated light bulbs", version)]
struct Cli {
    /// Number of bulbs to register (named LightBulb1..N)
    #[arg(long, default_value = "2", env = "TRIGGER_DEMO_BULBS")]
    bulbs: usize,

    /// How long the first bulb stays on before the automatic switch-off
    #[arg(long, default_value = "1000", env = "TRIGGER_DEMO_ON_MS")]
    on_ms: u64,

    /// Pause between scenario steps
    #[arg(long, default_value = "200", env = "TRIGGER_DEMO_PAUSE_MS")]
    pause_ms: u64,

    /// Run executions on a fixed pool of this many workers instead of one
    /// thread per trigger
    #[arg(long, env = "TRIGGER_DEMO_WORKERS")]
    workers: Option<usize>,

    /// Inbound queue capacity
    #[arg(long, default_value_t = DEFAULT_INBOUND_CAPACITY)]
    inbound_capacity: usize,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), TriggerError> {
    let (inbound_tx, inbound_rx) = trigger_channel(cli.inbound_capacity);
    let (report_tx, report_rx) = report_channel(16);

    let execution = match cli.workers {
        Some(workers) => ExecutionMode::Pool {
            workers,
            queue_capacity: 16,
        },
        None => ExecutionMode::SpawnPerMatch,
    };
    let mut dispatcher = Dispatcher::with_config(
        inbound_rx,
        DispatchConfig {
            execution,
            ..DispatchConfig::default()
        },
    );
    dispatcher.add_to_dispatch(
        (1..=cli.bulbs).map(|i| Arc::new(LightBulb::new(format!("LightBulb{i}"))) as Arc<dyn Triggerable>),
    )?;

    let bridge = ReportBridge::spawn(report_rx, JsonLinesSink::new(std::io::stdout()))?;
    let dispatch = dispatcher.spawn()?;

    let pause = Duration::from_millis(cli.pause_ms);
    // With a single bulb the Off step goes to LightBulb1.
    let off_target = format!("LightBulb{}", cli.bulbs.clamp(1, 2));
    let unknown = format!("LightBulb{}", cli.bulbs + 1);
    let scenario = [
        Trigger::new("LightBulb1", "On").with_duration(Duration::from_millis(cli.on_ms)),
        Trigger::new(off_target, "Off"),
        Trigger::new(unknown, "Toggle"),
        Trigger::new("LightBulb1", "On"),
        Trigger::introspection(),
    ];

    for t in scenario {
        inbound_tx
            .send(t.report_to(report_tx.clone()))
            .map_err(|_| TriggerError::disconnected("inbound"))?;
        thread::sleep(pause);
    }

    // Closing the inbound side stops the dispatch loop; the bridge stops once
    // the last outstanding report (including timed switch-offs) is delivered.
    drop(inbound_tx);
    drop(report_tx);
    dispatch.join()?;
    let (_, published) = bridge.join()?;
    tracing::info!(published, "demo finished");
    Ok(())
}
