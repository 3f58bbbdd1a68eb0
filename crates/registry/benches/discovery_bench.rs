use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use registry::{
    Address, InMemoryStore, InstanceStatus, SelectionStrategy, ServiceDescriptor, ServiceDiscovery,
    ServiceQuery, ServiceRegistry, ServiceStore,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn populate(instances: u16) -> (ServiceRegistry, ServiceDiscovery) {
    let store = Arc::new(InMemoryStore::new());
    let registry = ServiceRegistry::new(store.clone(), Duration::from_secs(30), None);
    let discovery = ServiceDiscovery::new(store.clone(), None);

    for i in 0..instances {
        let region = if i % 2 == 0 { "eu-west" } else { "us-east" };
        let id = registry
            .register(
                ServiceDescriptor::new("catalog-api", Address::new("10.0.0.1", 10_000 + i))
                    .with_metadata("region", region)
                    .with_weight(u32::from(i % 4)),
            )
            .unwrap();
        store.update(&id, &mut |record| record.status = InstanceStatus::Healthy);
    }

    (registry, discovery)
}

fn resolve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [10u16, 100, 1000] {
        let (_, discovery) = populate(size);

        group.bench_with_input(BenchmarkId::new("all", size), &size, |b, _| {
            b.iter(|| black_box(discovery.resolve("catalog-api")))
        });

        group.bench_with_input(BenchmarkId::new("round_robin", size), &size, |b, _| {
            b.iter(|| black_box(discovery.resolve_one("catalog-api", SelectionStrategy::RoundRobin)))
        });

        group.bench_with_input(BenchmarkId::new("weighted", size), &size, |b, _| {
            b.iter(|| black_box(discovery.resolve_one("catalog-api", SelectionStrategy::Weighted)))
        });

        let query = ServiceQuery::new("catalog-api").with_tag("region", "eu-west");
        group.bench_with_input(BenchmarkId::new("tag_filter", size), &size, |b, _| {
            b.iter(|| black_box(discovery.resolve_query(&query)))
        });
    }

    group.finish();
}

fn register_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("register");

    let store = Arc::new(InMemoryStore::new());
    let registry = ServiceRegistry::new(store, Duration::from_secs(30), None);

    group.bench_function("register_deregister", |b| {
        b.iter(|| {
            let id = registry
                .register(ServiceDescriptor::new("catalog-api", Address::new("10.0.0.1", 8080)))
                .unwrap();
            black_box(registry.deregister(&id))
        })
    });

    group.finish();
}

criterion_group!(benches, resolve_benchmark, register_benchmark);
criterion_main!(benches);
