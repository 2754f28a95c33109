//! # Application Metrics Collection and Monitoring
//!
//! In-process metrics for a backend service running behind the blue-green router. A
//! [`MetricsCollector`] is fed by the request hook in
//! [`crate::observability::middleware`] and answers two questions an operator asks
//! before and after a switch: is the new color throwing errors, and is it slow?
//!
//! ## Features
//! - Request counts, error rate and latency percentiles over a bounded sample
//! - Error buckets (server errors, CSRF rejections, other client errors, timeouts) with
//!   timestamps, so trailing-window counts are recomputed on every snapshot
//! - Threshold alerts with a per-type cooldown
//! - Optional snapshot persistence to a directory
//!
//! Everything sits behind one mutex. Recording an event is constant time: the latency
//! alert tracks how many samples exceed the threshold instead of sorting the sample on
//! every request.
//!
//! ## Usage Example
//! ```rust,no_run
//! use bluegreen_gateway::observability::metrics::{MetricsCollector, MonitoringConfig, RequestRecord};
//! use std::time::Duration;
//!
//! let collector = MetricsCollector::new(MonitoringConfig::default());
//! collector.record_request(RequestRecord {
//!     endpoint: "/api/users",
//!     method: "GET",
//!     status: 200,
//!     latency: Duration::from_millis(42),
//!     session_id: Some("abc"),
//!     feature: None,
//! });
//! let snapshot = collector.get_metrics_snapshot();
//! assert_eq!(snapshot.summary.total_requests, 1);
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::error::{GatewayError, GatewayResult};

/// Number of endpoints listed in a snapshot
const TOP_ENDPOINTS: usize = 5;

/// Number of alerts listed in a snapshot
const RECENT_ALERTS: usize = 10;

/// Alerts kept in memory
const ALERT_HISTORY: usize = 100;

/// Configuration for the application metrics collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Trailing window for the `recent_*` error counts
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Directory receiving persisted snapshots
    pub metrics_dir: Option<PathBuf>,

    /// Period of the background persister (off when unset)
    #[serde(default, with = "humantime_serde")]
    pub persist_interval: Option<Duration>,

    /// Alert thresholds
    pub alerts: AlertRules,

    /// Request header carrying the session identifier
    pub session_header: String,

    /// Request header naming the feature being exercised
    pub feature_header: String,

    /// Latency samples retained for percentiles
    pub latency_sample_size: usize,

    /// Events retained per error bucket
    pub error_retention: usize,

    /// Timeout events retained
    pub timeout_retention: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            metrics_dir: None,
            persist_interval: None,
            alerts: AlertRules::default(),
            session_header: "x-session-id".to_string(),
            feature_header: "x-feature".to_string(),
            latency_sample_size: 10_000,
            error_retention: 1_000,
            timeout_retention: 500,
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.window.is_zero() {
            return Err(GatewayError::config("monitoring.window must be non-zero"));
        }
        if self.latency_sample_size == 0 || self.error_retention == 0 || self.timeout_retention == 0 {
            return Err(GatewayError::config(
                "monitoring sample and retention sizes must be at least 1",
            ));
        }
        if matches!(self.persist_interval, Some(interval) if interval.is_zero()) {
            return Err(GatewayError::config("monitoring.persist_interval must be non-zero"));
        }
        if self.alerts.error_burst_threshold == 0 {
            return Err(GatewayError::config(
                "monitoring.alerts.error_burst_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertRules {
    /// Combined errors within `error_burst_window` that raise a critical alert
    pub error_burst_threshold: usize,

    #[serde(with = "humantime_serde")]
    pub error_burst_window: Duration,

    /// P95 latency above which a warning is raised
    pub latency_p95_threshold_ms: f64,

    /// The latency rule is evaluated only with more samples than this
    pub latency_min_samples: usize,

    /// An alert type raised within this period is not raised again
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            error_burst_threshold: 5,
            error_burst_window: Duration::from_secs(300),
            latency_p95_threshold_ms: 500.0,
            latency_min_samples: 10,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// One completed request as seen by the request hook
#[derive(Debug, Clone, Copy)]
pub struct RequestRecord<'a> {
    pub endpoint: &'a str,
    pub method: &'a str,
    pub status: u16,
    pub latency: Duration,
    pub session_id: Option<&'a str>,
    pub feature: Option<&'a str>,
}

/// Explicit session lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ErrorBurst,
    LatencyHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Latency statistics in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    /// Summarize a sample; `None` when it is empty.
    ///
    /// Percentiles use the nearest-rank index `floor(len * q)` over the sorted sample.
    pub fn from_samples<I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut sorted: Vec<f64> = samples.into_iter().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let len = sorted.len();
        let median = if len % 2 == 1 {
            sorted[len / 2]
        } else {
            (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
        };

        Some(Self {
            min_ms: sorted[0],
            max_ms: sorted[len - 1],
            mean_ms: sorted.iter().sum::<f64>() / len as f64,
            median_ms: median,
            p95_ms: percentile(&sorted, 0.95),
            p99_ms: percentile(&sorted, 0.99),
        })
    }
}

fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    let index = ((sorted.len() as f64 * quantile) as usize).min(sorted.len() - 1);
    sorted[index]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub error_rate_percent: f64,
    pub active_sessions: usize,
    pub unique_endpoints: usize,
    pub uptime_seconds: u64,
}

/// Error counts; `recent_*` are within the configured window, `total_*` since start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCounts {
    #[serde(rename = "recent_5xx")]
    pub recent_server: usize,
    pub recent_csrf: usize,
    #[serde(rename = "recent_4xx")]
    pub recent_client: usize,
    pub recent_timeout: usize,
    #[serde(rename = "total_5xx")]
    pub total_server: u64,
    pub total_csrf: u64,
    #[serde(rename = "total_4xx")]
    pub total_client: u64,
    pub total_timeout: u64,
    /// Errors reported through `record_error` under any other type
    pub other: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: u64,
}

/// Point-in-time view of the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub summary: SnapshotSummary,
    pub errors: ErrorCounts,
    pub performance: Option<LatencySummary>,
    pub last_error: Option<String>,
    pub top_endpoints: Vec<EndpointCount>,
    pub feature_usage: BTreeMap<String, u64>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLabel {
    Healthy,
    Warning,
    Degraded,
}

/// Compact health verdict for monitoring systems
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: HealthLabel,
    pub error_rate_percent: f64,
    pub active_sessions: usize,
    pub p95_latency_ms: f64,
    pub recent_5xx: usize,
    pub alerts: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ErrorEvent {
    at: Instant,
}

/// Bounded, timestamped event list
#[derive(Debug)]
struct EventLog {
    events: VecDeque<ErrorEvent>,
    capacity: usize,
    total: u64,
}

impl EventLog {
    fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total: 0,
        }
    }

    fn push(&mut self, at: Instant) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(ErrorEvent { at });
        self.total += 1;
    }

    fn count_since(&self, cutoff: Option<Instant>) -> usize {
        match cutoff {
            Some(cutoff) => self.events.iter().filter(|e| e.at > cutoff).count(),
            None => self.events.len(),
        }
    }
}

#[derive(Debug)]
struct CollectorState {
    request_count: u64,
    successful_requests: u64,
    failed_requests: u64,

    latencies: VecDeque<f64>,
    /// Samples in `latencies` above the latency alert threshold
    slow_samples: usize,

    server_errors: EventLog,
    csrf_errors: EventLog,
    client_errors: EventLog,
    timeouts: EventLog,
    other_errors: BTreeMap<String, u64>,
    /// Error times inside the burst window, oldest first
    burst: VecDeque<Instant>,

    active_sessions: HashSet<String>,
    endpoint_calls: HashMap<String, u64>,
    feature_usage: BTreeMap<String, u64>,

    alerts: VecDeque<Alert>,
    last_raised: HashMap<AlertKind, Instant>,
    last_error: Option<String>,
}

impl CollectorState {
    fn new(config: &MonitoringConfig) -> Self {
        Self {
            request_count: 0,
            successful_requests: 0,
            failed_requests: 0,
            latencies: VecDeque::new(),
            slow_samples: 0,
            server_errors: EventLog::new(config.error_retention),
            csrf_errors: EventLog::new(config.error_retention),
            client_errors: EventLog::new(config.error_retention),
            timeouts: EventLog::new(config.timeout_retention),
            other_errors: BTreeMap::new(),
            burst: VecDeque::new(),
            active_sessions: HashSet::new(),
            endpoint_calls: HashMap::new(),
            feature_usage: BTreeMap::new(),
            alerts: VecDeque::new(),
            last_raised: HashMap::new(),
            last_error: None,
        }
    }

    fn push_latency(&mut self, latency_ms: f64, config: &MonitoringConfig) {
        let threshold = config.alerts.latency_p95_threshold_ms;
        if self.latencies.len() == config.latency_sample_size {
            if let Some(evicted) = self.latencies.pop_front() {
                if evicted > threshold {
                    self.slow_samples -= 1;
                }
            }
        }
        if latency_ms > threshold {
            self.slow_samples += 1;
        }
        self.latencies.push_back(latency_ms);
    }

    /// Whether the nearest-rank P95 of the sample exceeds the threshold.
    ///
    /// With `n` sorted samples the P95 sits at index `k = floor(n * 0.95)`; it is above the
    /// threshold exactly when at least `n - k` samples are.
    fn p95_exceeds_threshold(&self) -> bool {
        let n = self.latencies.len();
        if n == 0 {
            return false;
        }
        let k = ((n as f64 * 0.95) as usize).min(n - 1);
        self.slow_samples >= n - k
    }

    fn check_alerts(&mut self, rules: &AlertRules, now: Instant) {
        if let Some(cutoff) = now.checked_sub(rules.error_burst_window) {
            while matches!(self.burst.front(), Some(at) if *at <= cutoff) {
                self.burst.pop_front();
            }
        }

        let recent = self.burst.len();
        if recent >= rules.error_burst_threshold {
            self.raise(
                AlertKind::ErrorBurst,
                Severity::Critical,
                rules.cooldown,
                now,
                || {
                    format!(
                        "Detected {} errors in last {}",
                        recent,
                        humantime::format_duration(rules.error_burst_window)
                    )
                },
            );
        }

        if self.latencies.len() > rules.latency_min_samples && self.p95_exceeds_threshold() {
            let latencies = &self.latencies;
            let message = || {
                let p95 = LatencySummary::from_samples(latencies.iter().copied())
                    .map(|summary| summary.p95_ms)
                    .unwrap_or_default();
                format!("P95 latency: {:.1}ms", p95)
            };
            let alert = Self::build_alert(
                &self.last_raised,
                AlertKind::LatencyHigh,
                Severity::Warning,
                rules.cooldown,
                now,
                message,
            );
            if let Some(alert) = alert {
                self.push_alert(alert, now);
            }
        }
    }

    fn raise<F>(&mut self, kind: AlertKind, severity: Severity, cooldown: Duration, now: Instant, message: F)
    where
        F: FnOnce() -> String,
    {
        if let Some(alert) = Self::build_alert(&self.last_raised, kind, severity, cooldown, now, message) {
            self.push_alert(alert, now);
        }
    }

    fn build_alert<F>(
        last_raised: &HashMap<AlertKind, Instant>,
        kind: AlertKind,
        severity: Severity,
        cooldown: Duration,
        now: Instant,
        message: F,
    ) -> Option<Alert>
    where
        F: FnOnce() -> String,
    {
        if let Some(last) = last_raised.get(&kind) {
            if now.duration_since(*last) < cooldown {
                return None;
            }
        }
        Some(Alert {
            kind,
            message: message(),
            severity,
            timestamp: Utc::now(),
        })
    }

    fn push_alert(&mut self, alert: Alert, now: Instant) {
        warn!(
            alert_type = ?alert.kind,
            severity = ?alert.severity,
            message = %alert.message,
            "🚨 Alert raised"
        );
        self.last_raised.insert(alert.kind, now);
        if self.alerts.len() == ALERT_HISTORY {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }
}

/// Thread-safe application metrics collector
pub struct MetricsCollector {
    config: MonitoringConfig,
    state: Mutex<CollectorState>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new(config: MonitoringConfig) -> Self {
        let state = CollectorState::new(&config);
        Self {
            config,
            state: Mutex::new(state),
            start_time: Instant::now(),
        }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Record one completed request.
    ///
    /// Only 2xx counts as successful. Failures are bucketed: 5xx as server errors, a 400
    /// on an endpoint whose name mentions CSRF as a CSRF rejection, any other 4xx as a
    /// client error.
    pub fn record_request(&self, record: RequestRecord<'_>) {
        let now = Instant::now();
        let latency_ms = record.latency.as_secs_f64() * 1000.0;

        let mut state = self.state.lock();
        state.request_count += 1;
        *state
            .endpoint_calls
            .entry(format!("{} {}", record.method, record.endpoint))
            .or_insert(0) += 1;

        if let Some(session_id) = record.session_id {
            if !state.active_sessions.contains(session_id) {
                state.active_sessions.insert(session_id.to_string());
            }
        }
        if let Some(feature) = record.feature {
            *state.feature_usage.entry(feature.to_string()).or_insert(0) += 1;
        }

        state.push_latency(latency_ms, &self.config);

        if (200..300).contains(&record.status) {
            state.successful_requests += 1;
        } else {
            state.failed_requests += 1;
            let bucket = if record.status >= 500 {
                Some(&mut state.server_errors)
            } else if record.status == 400 && record.endpoint.to_ascii_lowercase().contains("csrf") {
                Some(&mut state.csrf_errors)
            } else if (400..500).contains(&record.status) {
                Some(&mut state.client_errors)
            } else {
                None
            };
            if let Some(bucket) = bucket {
                bucket.push(now);
                state.burst.push_back(now);
            }
        }

        state.check_alerts(&self.config.alerts, now);
    }

    /// Record an error that did not come from a response status, such as a timeout
    pub fn record_error(&self, error_type: &str, message: &str, endpoint: Option<&str>) {
        let now = Instant::now();
        debug!(error_type, message, endpoint, "Application error recorded");

        let mut state = self.state.lock();
        if error_type == "timeout" {
            state.timeouts.push(now);
        } else {
            *state.other_errors.entry(error_type.to_string()).or_insert(0) += 1;
        }
        state.last_error = Some(message.to_string());
        state.check_alerts(&self.config.alerts, now);
    }

    pub fn record_session(&self, session_id: &str, action: SessionAction) {
        let mut state = self.state.lock();
        match action {
            SessionAction::Start => {
                state.active_sessions.insert(session_id.to_string());
            }
            SessionAction::End => {
                state.active_sessions.remove(session_id);
            }
        }
    }

    /// Compute the current view; windowed counts and percentiles are derived at call time
    pub fn get_metrics_snapshot(&self) -> MetricsSnapshot {
        let cutoff = Instant::now().checked_sub(self.config.window);
        let state = self.state.lock();

        let total = state.request_count;
        let error_rate_percent = if total > 0 {
            state.failed_requests as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let mut top_endpoints: Vec<EndpointCount> = state
            .endpoint_calls
            .iter()
            .map(|(endpoint, count)| EndpointCount {
                endpoint: endpoint.clone(),
                count: *count,
            })
            .collect();
        top_endpoints.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.endpoint.cmp(&b.endpoint)));
        top_endpoints.truncate(TOP_ENDPOINTS);

        let skip = state.alerts.len().saturating_sub(RECENT_ALERTS);

        MetricsSnapshot {
            timestamp: Utc::now(),
            summary: SnapshotSummary {
                total_requests: total,
                successful_requests: state.successful_requests,
                failed_requests: state.failed_requests,
                error_rate_percent,
                active_sessions: state.active_sessions.len(),
                unique_endpoints: state.endpoint_calls.len(),
                uptime_seconds: self.start_time.elapsed().as_secs(),
            },
            errors: ErrorCounts {
                recent_server: state.server_errors.count_since(cutoff),
                recent_csrf: state.csrf_errors.count_since(cutoff),
                recent_client: state.client_errors.count_since(cutoff),
                recent_timeout: state.timeouts.count_since(cutoff),
                total_server: state.server_errors.total,
                total_csrf: state.csrf_errors.total,
                total_client: state.client_errors.total,
                total_timeout: state.timeouts.total,
                other: state.other_errors.clone(),
            },
            performance: LatencySummary::from_samples(state.latencies.iter().copied()),
            last_error: state.last_error.clone(),
            top_endpoints,
            feature_usage: state.feature_usage.clone(),
            alerts: state.alerts.iter().skip(skip).cloned().collect(),
        }
    }

    /// Degraded on a recent critical alert or an error rate above 10%, warning above 5%
    pub fn get_health_status(&self) -> HealthSummary {
        let snapshot = self.get_metrics_snapshot();
        let error_rate = snapshot.summary.error_rate_percent;
        let critical = snapshot
            .alerts
            .iter()
            .any(|alert| alert.severity == Severity::Critical);

        let status = if critical || error_rate > 10.0 {
            HealthLabel::Degraded
        } else if error_rate > 5.0 {
            HealthLabel::Warning
        } else {
            HealthLabel::Healthy
        };

        HealthSummary {
            status,
            error_rate_percent: error_rate,
            active_sessions: snapshot.summary.active_sessions,
            p95_latency_ms: snapshot.performance.map(|p| p.p95_ms).unwrap_or_default(),
            recent_5xx: snapshot.errors.recent_server,
            alerts: snapshot.alerts.len(),
            timestamp: snapshot.timestamp,
        }
    }

    /// Write a snapshot into `metrics_dir`. Failures are logged, never returned.
    pub async fn persist_metrics(&self) -> Option<PathBuf> {
        let dir = self.config.metrics_dir.as_ref()?;
        let snapshot = self.get_metrics_snapshot();
        let path = dir.join(format!("metrics_{}.json", snapshot.timestamp.timestamp()));

        match write_snapshot(&path, &snapshot).await {
            Ok(()) => {
                debug!(path = %path.display(), "Metrics snapshot persisted");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error persisting metrics");
                None
            }
        }
    }

    /// Persist on `persist_interval` until the task is aborted; `None` when not configured
    pub fn spawn_persister(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.config.persist_interval?;
        self.config.metrics_dir.as_ref()?;

        info!(interval = ?period, "Starting metrics persister");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.persist_metrics().await;
            }
        }))
    }
}

async fn write_snapshot(path: &std::path::Path, snapshot: &MetricsSnapshot) -> GatewayResult<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(endpoint: &str, status: u16, latency_ms: u64) -> RequestRecord<'_> {
        RequestRecord {
            endpoint,
            method: "GET",
            status,
            latency: Duration::from_millis(latency_ms),
            session_id: None,
            feature: None,
        }
    }

    #[test]
    fn test_latency_summary_nearest_rank() {
        let summary = LatencySummary::from_samples((1..=100).map(|v| v as f64)).unwrap();
        assert_eq!(summary.min_ms, 1.0);
        assert_eq!(summary.max_ms, 100.0);
        assert_eq!(summary.median_ms, 50.5);
        assert_eq!(summary.p95_ms, 96.0);
        assert_eq!(summary.p99_ms, 100.0);
        assert!(LatencySummary::from_samples(Vec::new()).is_none());
    }

    #[test]
    fn test_p95_counter_matches_sorted_sample() {
        let config = MonitoringConfig::default();
        let mut state = CollectorState::new(&config);
        for latency in [10.0, 20.0, 900.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0] {
            state.push_latency(latency, &config);
        }
        // p95 index 9 of 10 is the single slow sample
        assert!(state.p95_exceeds_threshold());

        for _ in 0..10 {
            state.push_latency(5.0, &config);
        }
        // 20 samples: index 19 still the slow one
        assert!(state.p95_exceeds_threshold());

        state.push_latency(5.0, &config);
        // 21 samples: index 19 is now a fast one
        assert!(!state.p95_exceeds_threshold());
    }

    #[test]
    fn test_latency_sample_is_bounded() {
        let config = MonitoringConfig {
            latency_sample_size: 3,
            ..Default::default()
        };
        let collector = MetricsCollector::new(config);
        for latency in [900, 900, 1, 1, 1] {
            collector.record_request(request("/a", 200, latency));
        }
        let state = collector.state.lock();
        assert_eq!(state.latencies.len(), 3);
        assert_eq!(state.slow_samples, 0);
    }

    #[test]
    fn test_csrf_classification_is_case_insensitive() {
        let collector = MetricsCollector::new(MonitoringConfig::default());
        collector.record_request(request("/submit_CSRF_form", 400, 5));
        collector.record_request(request("/submit_csrf_form", 403, 5));
        collector.record_request(request("/submit", 400, 5));

        let errors = collector.get_metrics_snapshot().errors;
        assert_eq!(errors.recent_csrf, 1);
        assert_eq!(errors.recent_client, 2);
        assert_eq!(errors.recent_server, 0);
    }
}
