//! Benchmarks for handler resolution and registry snapshots.
//!
//! Resolution runs synchronously inside every `start` call, so it has to
//! stay cheap even with a few hundred registered filters.

use std::time::Duration;

use conduit_engine::{resolve, FilterRegistry, Intent, IntentFilter};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use url::Url;

const ACTIONS: [&str; 4] = ["view", "edit", "open-catalog", "export"];
const SCHEMES: [&str; 3] = ["file", "https", "http"];

/// Register `count` filters spread across actions, schemes and types.
fn populated_registry(count: usize) -> FilterRegistry {
    let registry = FilterRegistry::new();
    let filters = (0..count)
        .map(|i| {
            IntentFilter::new(format!("handler-{}", i % 32))
                .action(ACTIONS[i % ACTIONS.len()])
                .scheme(SCHEMES[i % SCHEMES.len()])
                .mime_type(if i % 2 == 0 { "text/*" } else { "application/xml" })
                .priority((i % 7) as i32)
        })
        .collect();
    registry.register_all(filters).unwrap();
    registry
}

fn catalog_intent() -> Intent {
    let locator = Url::parse("file:///srv/catalogs/seeds.xml").unwrap();
    Intent::for_action("open-catalog")
        .with_type("text/xml")
        .with_locator(locator)
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    group.measurement_time(Duration::from_secs(5));

    for count in [10usize, 100, 1000] {
        let registry = populated_registry(count);
        let snapshot = registry.snapshot();
        let intent = catalog_intent();

        group.bench_with_input(BenchmarkId::new("filters", count), &count, |b, _| {
            b.iter(|| resolve(&intent, &snapshot))
        });
    }

    // Explicit intents skip matching entirely; this is the floor.
    let registry = populated_registry(1000);
    let snapshot = registry.snapshot();
    let explicit = catalog_intent().with_handler("handler-3");
    group.bench_function("explicit_1000", |b| b.iter(|| resolve(&explicit, &snapshot)));

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let registry = populated_registry(1000);

    let mut group = c.benchmark_group("registry");
    group.bench_function("snapshot_1000", |b| b.iter(|| registry.snapshot()));
    group.bench_function("register_unregister_1000", |b| {
        b.iter(|| {
            let handle = registry
                .register(IntentFilter::new("transient").action("view"))
                .unwrap();
            registry.unregister(&handle)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_snapshot);
criterion_main!(benches);
