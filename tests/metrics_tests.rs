//! # Application Metrics Tests
//!
//! Covers the collector end to end: error buckets and windows, alert rules and their
//! cooldown, health verdicts, snapshot persistence, and the axum request hook.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    routing::get,
    Router,
};
use axum_test::TestServer;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use bluegreen_gateway::observability::metrics::{
    AlertKind, AlertRules, HealthLabel, MetricsCollector, MetricsSnapshot, MonitoringConfig,
    RequestRecord, SessionAction, Severity,
};
use bluegreen_gateway::observability::middleware::instrument;

fn record(endpoint: &str, status: u16, latency_ms: u64) -> RequestRecord<'_> {
    RequestRecord {
        endpoint,
        method: "GET",
        status,
        latency: Duration::from_millis(latency_ms),
        session_id: None,
        feature: None,
    }
}

fn collector_with_rules(rules: AlertRules) -> MetricsCollector {
    MetricsCollector::new(MonitoringConfig {
        alerts: rules,
        ..Default::default()
    })
}

/// Rules that never fire on errors, so health is driven by the error rate alone
fn quiet_rules() -> AlertRules {
    AlertRules {
        error_burst_threshold: 10_000,
        ..Default::default()
    }
}

#[test]
fn test_empty_collector_snapshot() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    let snapshot = collector.get_metrics_snapshot();

    assert_eq!(snapshot.summary.total_requests, 0);
    assert_eq!(snapshot.summary.error_rate_percent, 0.0);
    assert!(snapshot.performance.is_none());
    assert!(snapshot.alerts.is_empty());
    assert!(snapshot.last_error.is_none());
    assert_eq!(collector.get_health_status().status, HealthLabel::Healthy);
}

#[test]
fn test_only_2xx_counts_as_success() {
    let collector = collector_with_rules(quiet_rules());
    collector.record_request(record("/ok", 200, 5));
    collector.record_request(record("/created", 201, 5));
    collector.record_request(record("/moved", 302, 5));
    collector.record_request(record("/missing", 404, 5));

    let snapshot = collector.get_metrics_snapshot();
    assert_eq!(snapshot.summary.successful_requests, 2);
    assert_eq!(snapshot.summary.failed_requests, 2);
    assert_eq!(snapshot.summary.error_rate_percent, 50.0);
    // A redirect is a failure but lands in no error bucket
    assert_eq!(snapshot.errors.recent_client, 1);
    assert_eq!(snapshot.errors.recent_server, 0);
}

#[test]
fn test_error_burst_raises_one_critical_alert() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    for _ in 0..4 {
        collector.record_request(record("/api/orders", 500, 10));
    }
    assert!(collector.get_metrics_snapshot().alerts.is_empty());

    collector.record_request(record("/api/orders", 503, 10));
    let alerts = collector.get_metrics_snapshot().alerts;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::ErrorBurst);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].message, "Detected 5 errors in last 5m");

    // Within the cooldown further errors add nothing
    for _ in 0..10 {
        collector.record_request(record("/api/orders", 500, 10));
    }
    assert_eq!(collector.get_metrics_snapshot().alerts.len(), 1);
}

#[test]
fn test_mixed_error_buckets_feed_one_burst() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    collector.record_request(record("/a", 500, 1));
    collector.record_request(record("/b", 404, 1));
    collector.record_request(record("/csrf_token", 400, 1));
    collector.record_request(record("/c", 422, 1));
    collector.record_request(record("/d", 502, 1));

    let snapshot = collector.get_metrics_snapshot();
    assert_eq!(snapshot.errors.recent_server, 2);
    assert_eq!(snapshot.errors.recent_client, 2);
    assert_eq!(snapshot.errors.recent_csrf, 1);
    assert_eq!(snapshot.alerts.len(), 1);
    assert_eq!(snapshot.alerts[0].kind, AlertKind::ErrorBurst);
}

#[tokio::test]
async fn test_alert_raised_again_after_cooldown() {
    let collector = collector_with_rules(AlertRules {
        cooldown: Duration::from_millis(50),
        ..Default::default()
    });
    for _ in 0..5 {
        collector.record_request(record("/a", 500, 1));
    }
    assert_eq!(collector.get_metrics_snapshot().alerts.len(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    collector.record_request(record("/a", 500, 1));

    let alerts = collector.get_metrics_snapshot().alerts;
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[1].message, "Detected 6 errors in last 5m");
}

#[tokio::test]
async fn test_burst_window_drops_old_errors() {
    let collector = collector_with_rules(AlertRules {
        error_burst_window: Duration::from_millis(50),
        ..Default::default()
    });
    for _ in 0..4 {
        collector.record_request(record("/a", 500, 1));
    }
    tokio::time::sleep(Duration::from_millis(80)).await;
    collector.record_request(record("/a", 500, 1));

    assert!(collector.get_metrics_snapshot().alerts.is_empty());
}

#[test]
fn test_latency_alert_needs_more_than_min_samples() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    for _ in 0..10 {
        collector.record_request(record("/slow", 200, 600));
    }
    assert!(collector.get_metrics_snapshot().alerts.is_empty());

    collector.record_request(record("/slow", 200, 600));
    let alerts = collector.get_metrics_snapshot().alerts;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::LatencyHigh);
    assert_eq!(alerts[0].severity, Severity::Warning);
    assert_eq!(alerts[0].message, "P95 latency: 600.0ms");
}

#[test]
fn test_latency_alert_ignores_a_few_outliers() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    for _ in 0..98 {
        collector.record_request(record("/fast", 200, 20));
    }
    collector.record_request(record("/fast", 200, 2_000));
    collector.record_request(record("/fast", 200, 2_000));

    let snapshot = collector.get_metrics_snapshot();
    assert!(snapshot.alerts.is_empty());
    let performance = snapshot.performance.unwrap();
    assert_eq!(performance.p95_ms, 20.0);
    assert_eq!(performance.max_ms, 2_000.0);
}

#[test]
fn test_snapshot_lists_only_recent_alerts() {
    let collector = collector_with_rules(AlertRules {
        error_burst_threshold: 1,
        cooldown: Duration::ZERO,
        ..Default::default()
    });
    for _ in 0..15 {
        collector.record_request(record("/a", 500, 1));
    }

    let alerts = collector.get_metrics_snapshot().alerts;
    assert_eq!(alerts.len(), 10);
    assert_eq!(alerts.last().unwrap().message, "Detected 15 errors in last 5m");
}

#[test]
fn test_health_status_levels() {
    let collector = collector_with_rules(quiet_rules());
    for _ in 0..94 {
        collector.record_request(record("/a", 200, 10));
    }
    assert_eq!(collector.get_health_status().status, HealthLabel::Healthy);

    for _ in 0..6 {
        collector.record_request(record("/a", 404, 10));
    }
    let health = collector.get_health_status();
    assert_eq!(health.status, HealthLabel::Warning);
    assert!((health.error_rate_percent - 6.0).abs() < 1e-9);

    for _ in 0..6 {
        collector.record_request(record("/a", 500, 10));
    }
    let health = collector.get_health_status();
    assert_eq!(health.status, HealthLabel::Degraded);
    assert_eq!(health.recent_5xx, 6);
}

#[test]
fn test_critical_alert_degrades_health() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    for _ in 0..200 {
        collector.record_request(record("/a", 200, 10));
    }
    for _ in 0..5 {
        collector.record_request(record("/a", 500, 10));
    }

    let health = collector.get_health_status();
    assert!(health.error_rate_percent < 5.0);
    assert_eq!(health.status, HealthLabel::Degraded);
    assert_eq!(health.alerts, 1);
}

#[tokio::test]
async fn test_recent_counts_follow_window_but_totals_do_not() {
    let collector = MetricsCollector::new(MonitoringConfig {
        window: Duration::from_millis(50),
        alerts: quiet_rules(),
        ..Default::default()
    });
    collector.record_request(record("/a", 500, 1));
    collector.record_request(record("/a", 404, 1));
    collector.record_error("timeout", "upstream took too long", Some("/a"));
    assert_eq!(collector.get_metrics_snapshot().errors.recent_server, 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    collector.record_request(record("/a", 500, 1));

    let errors = collector.get_metrics_snapshot().errors;
    assert_eq!(errors.recent_server, 1);
    assert_eq!(errors.recent_client, 0);
    assert_eq!(errors.recent_timeout, 0);
    assert_eq!(errors.total_server, 2);
    assert_eq!(errors.total_client, 1);
    assert_eq!(errors.total_timeout, 1);
}

#[test]
fn test_record_error_buckets_and_last_error() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    collector.record_error("timeout", "read timed out", Some("/reports"));
    collector.record_error("database", "connection refused", None);
    collector.record_error("database", "pool exhausted", None);

    let snapshot = collector.get_metrics_snapshot();
    assert_eq!(snapshot.errors.recent_timeout, 1);
    assert_eq!(snapshot.errors.other.get("database"), Some(&2));
    assert_eq!(snapshot.last_error.as_deref(), Some("pool exhausted"));
    // Reported errors are not requests
    assert_eq!(snapshot.summary.total_requests, 0);
}

#[test]
fn test_sessions_tracked_from_requests_and_signals() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    collector.record_request(RequestRecord {
        session_id: Some("alice"),
        ..record("/a", 200, 1)
    });
    collector.record_request(RequestRecord {
        session_id: Some("alice"),
        ..record("/b", 200, 1)
    });
    collector.record_session("bob", SessionAction::Start);
    assert_eq!(collector.get_metrics_snapshot().summary.active_sessions, 2);

    collector.record_session("alice", SessionAction::End);
    collector.record_session("nobody", SessionAction::End);
    assert_eq!(collector.get_metrics_snapshot().summary.active_sessions, 1);
}

#[test]
fn test_top_endpoints_and_feature_usage() {
    let collector = MetricsCollector::new(MonitoringConfig::default());
    for (endpoint, count) in [("/a", 1), ("/b", 7), ("/c", 3), ("/d", 5), ("/e", 2), ("/f", 4)] {
        for _ in 0..count {
            collector.record_request(record(endpoint, 200, 1));
        }
    }
    collector.record_request(RequestRecord {
        method: "POST",
        feature: Some("checkout"),
        ..record("/b", 200, 1)
    });

    let snapshot = collector.get_metrics_snapshot();
    let top: Vec<(&str, u64)> = snapshot
        .top_endpoints
        .iter()
        .map(|entry| (entry.endpoint.as_str(), entry.count))
        .collect();
    assert_eq!(
        top,
        vec![("GET /b", 7), ("GET /d", 5), ("GET /f", 4), ("GET /c", 3), ("GET /e", 2)]
    );
    assert_eq!(snapshot.summary.unique_endpoints, 7);
    assert_eq!(snapshot.feature_usage.get("checkout"), Some(&1));
}

#[tokio::test]
async fn test_persist_metrics_writes_snapshot_file() {
    let dir = TempDir::new().unwrap();
    let collector = MetricsCollector::new(MonitoringConfig {
        metrics_dir: Some(dir.path().join("metrics")),
        ..Default::default()
    });
    collector.record_request(record("/a", 500, 12));

    let path = collector.persist_metrics().await.unwrap();
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("metrics_") && name.ends_with(".json"));

    let content = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(json["errors"]["recent_5xx"], 1);
    assert_eq!(json["summary"]["total_requests"], 1);

    let snapshot: MetricsSnapshot = serde_json::from_str(&content).unwrap();
    assert_eq!(snapshot.errors.total_server, 1);
}

#[tokio::test]
async fn test_persist_metrics_failures_are_swallowed() {
    let dir = TempDir::new().unwrap();
    let not_a_dir = dir.path().join("occupied");
    std::fs::write(&not_a_dir, b"file").unwrap();

    let collector = MetricsCollector::new(MonitoringConfig {
        metrics_dir: Some(not_a_dir),
        ..Default::default()
    });
    assert!(collector.persist_metrics().await.is_none());

    let unconfigured = MetricsCollector::new(MonitoringConfig::default());
    assert!(unconfigured.persist_metrics().await.is_none());
}

#[tokio::test]
async fn test_background_persister() {
    let dir = TempDir::new().unwrap();
    let collector = Arc::new(MetricsCollector::new(MonitoringConfig {
        metrics_dir: Some(dir.path().to_path_buf()),
        persist_interval: Some(Duration::from_millis(20)),
        ..Default::default()
    }));

    let handle = collector.clone().spawn_persister().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();

    assert!(std::fs::read_dir(dir.path()).unwrap().count() >= 1);
    assert!(Arc::new(MetricsCollector::new(MonitoringConfig::default()))
        .spawn_persister()
        .is_none());
}

#[tokio::test]
async fn test_instrumented_service_reports_metrics() {
    let collector = Arc::new(MetricsCollector::new(MonitoringConfig::default()));
    let app = Router::new()
        .route("/api/users/:id", get(|| async { "user" }))
        .route("/api/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let server = TestServer::new(instrument(app, collector.clone())).unwrap();

    server
        .get("/api/users/1")
        .add_header(
            HeaderName::from_static("x-session-id"),
            HeaderValue::from_static("s-9"),
        )
        .await;
    server.get("/api/users/2").await;
    server.get("/api/broken").await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let snapshot: serde_json::Value = response.json();
    assert_eq!(snapshot["summary"]["total_requests"], 3);
    assert_eq!(snapshot["summary"]["active_sessions"], 1);
    assert_eq!(snapshot["top_endpoints"][0]["endpoint"], "GET /api/users/:id");
    assert_eq!(snapshot["top_endpoints"][0]["count"], 2);

    let health: serde_json::Value = server.get("/health/detailed").await.json();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["recent_5xx"], 1);
}
