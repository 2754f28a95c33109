//! # Metrics Hot Path Benchmarks
//!
//! Both collectors sit on the request path: the router records every proxied request and
//! the application collector every served one. These benchmarks cover the per-request
//! record calls and the snapshot computations behind the metrics endpoints.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use bluegreen_gateway::core::types::Color;
use bluegreen_gateway::observability::metrics::{
    AlertRules, MetricsCollector, MonitoringConfig, RequestRecord,
};
use bluegreen_gateway::observability::router_metrics::RouterMetrics;

fn request(index: u64) -> RequestRecord<'static> {
    const ENDPOINTS: [&str; 4] = ["/api/users/:id", "/api/orders", "/api/cart", "/health"];
    RequestRecord {
        endpoint: ENDPOINTS[(index % 4) as usize],
        method: "GET",
        status: if index % 50 == 0 { 500 } else { 200 },
        latency: Duration::from_micros(500 + (index % 997) * 300),
        session_id: Some("bench-session"),
        feature: None,
    }
}

/// Collector with a full latency sample, so every record also evicts
fn warmed_collector(sample_size: usize) -> MetricsCollector {
    let collector = MetricsCollector::new(MonitoringConfig {
        latency_sample_size: sample_size,
        alerts: AlertRules {
            error_burst_threshold: usize::MAX,
            ..Default::default()
        },
        ..Default::default()
    });
    for i in 0..sample_size as u64 {
        collector.record_request(request(i));
    }
    collector
}

fn benchmark_router_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_metrics");
    group.throughput(Throughput::Elements(1));

    let metrics = RouterMetrics::new();
    let mut i = 0u64;
    group.bench_function("record_request", |b| {
        b.iter(|| {
            i += 1;
            let color = if i % 2 == 0 { Color::Blue } else { Color::Green };
            metrics.record_request(
                black_box(i % 20 != 0),
                black_box(1024),
                Duration::from_micros(i % 5_000),
                Some(color),
            );
        })
    });

    group.bench_function("get_stats", |b| b.iter(|| black_box(metrics.get_stats())));
    group.finish();
}

fn benchmark_collector(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics_collector");

    for sample_size in [1_000usize, 10_000] {
        let collector = warmed_collector(sample_size);
        let mut i = 0u64;

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("record_request", sample_size),
            &sample_size,
            |b, _| {
                b.iter(|| {
                    i += 1;
                    collector.record_request(black_box(request(i)));
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("get_metrics_snapshot", sample_size),
            &sample_size,
            |b, _| b.iter(|| black_box(collector.get_metrics_snapshot())),
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_router_metrics, benchmark_collector);
criterion_main!(benches);
