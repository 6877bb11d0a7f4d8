use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use trigger::{
    report_channel, trigger_channel, DispatchConfig, Dispatcher, ExecutionMode, Trigger,
    Triggerable,
};

/// Reports immediately; measures routing and execution overhead only.
struct Echo {
    name: String,
}

impl Triggerable for Echo {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, trigger: Trigger) {
        let _ = trigger.report();
    }
}

fn registry(n: usize) -> Vec<Arc<dyn Triggerable>> {
    (0..n)
        .map(|i| Arc::new(Echo { name: format!("receiver-{i}") }) as Arc<dyn Triggerable>)
        .collect()
}

fn round_trip(c: &mut Criterion, label: &str, execution: ExecutionMode, target: &'static str) {
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));
    group.bench_function(label, |b| {
        b.iter_custom(|iters| {
            let (tx, rx) = trigger_channel(64);
            let mut dispatcher = Dispatcher::with_config(
                rx,
                DispatchConfig {
                    execution,
                    ..DispatchConfig::default()
                },
            );
            // Last registered name: worst case for the linear lookup.
            dispatcher.add_to_dispatch(registry(64)).unwrap();
            let handle = dispatcher.spawn().unwrap();
            let (rtx, rrx) = report_channel(1024);

            let start = Instant::now();
            for _ in 0..iters {
                tx.send(Trigger::new(target, "Ping").report_to(rtx.clone())).unwrap();
                rrx.recv_timeout(Duration::from_secs(5)).unwrap();
            }
            let elapsed = start.elapsed();

            drop(tx);
            handle.join().unwrap();
            elapsed
        });
    });
    group.finish();
}

fn bench_spawn_per_match(c: &mut Criterion) {
    round_trip(c, "spawn_per_match", ExecutionMode::SpawnPerMatch, "receiver-63");
}

fn bench_pool(c: &mut Criterion) {
    round_trip(
        c,
        "pool_4_workers",
        ExecutionMode::Pool {
            workers: 4,
            queue_capacity: 256,
        },
        "receiver-63",
    );
}

fn bench_unknown_target(c: &mut Criterion) {
    round_trip(c, "unknown_target", ExecutionMode::SpawnPerMatch, "missing");
}

criterion_group!(benches, bench_spawn_per_match, bench_pool, bench_unknown_target);
criterion_main!(benches);
