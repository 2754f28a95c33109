//! Proxy-side metrics: one record per forwarded request, whatever its outcome.
//!
//! Counters are kept in-process for the router's own metrics endpoint and mirrored to the
//! `metrics` facade so an installed Prometheus recorder exports them too.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::core::types::Color;
use crate::observability::metrics::LatencySummary;

/// Request durations retained for percentiles
const DEFAULT_SAMPLE_SIZE: usize = 10_000;

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    bytes_proxied: u64,
    total_time_ms: f64,
    blue_requests: u64,
    green_requests: u64,
    unrouted_requests: u64,
    request_times_ms: VecDeque<f64>,
}

/// Requests served by each color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequests {
    pub blue: u64,
    pub green: u64,
}

/// Snapshot returned by [`RouterMetrics::get_stats`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage, 0 when nothing was recorded
    pub success_rate: f64,
    pub bytes_proxied: u64,
    pub avg_request_time_ms: f64,
    pub latency: Option<LatencySummary>,
    pub version_requests: VersionRequests,
    /// Requests answered 503 because no backend was active
    pub unrouted_requests: u64,
    pub uptime_seconds: u64,
}

/// Thread-safe router metrics
pub struct RouterMetrics {
    counters: Mutex<Counters>,
    sample_size: usize,
    start_time: Instant,
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::with_sample_size(DEFAULT_SAMPLE_SIZE)
    }

    pub fn with_sample_size(sample_size: usize) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            sample_size: sample_size.max(1),
            start_time: Instant::now(),
        }
    }

    /// Record one proxied attempt; `served_by` is `None` when no backend was resolvable
    pub fn record_request(&self, success: bool, bytes: u64, elapsed: Duration, served_by: Option<Color>) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        {
            let mut counters = self.counters.lock();
            counters.total_requests += 1;
            if success {
                counters.successful_requests += 1;
            } else {
                counters.failed_requests += 1;
            }
            counters.bytes_proxied += bytes;
            counters.total_time_ms += elapsed_ms;
            match served_by {
                Some(Color::Blue) => counters.blue_requests += 1,
                Some(Color::Green) => counters.green_requests += 1,
                None => counters.unrouted_requests += 1,
            }
            if counters.request_times_ms.len() == self.sample_size {
                counters.request_times_ms.pop_front();
            }
            counters.request_times_ms.push_back(elapsed_ms);
        }

        let version = served_by.map(Color::as_str).unwrap_or("none");
        let outcome = if success { "success" } else { "failure" };
        metrics::counter!("router_requests_total", "version" => version, "outcome" => outcome).increment(1);
        metrics::histogram!("router_request_duration_seconds", "version" => version).record(elapsed.as_secs_f64());
        metrics::counter!("router_bytes_proxied_total").increment(bytes);
    }

    pub fn get_stats(&self) -> RouterStats {
        let counters = self.counters.lock();
        let total = counters.total_requests;
        let (success_rate, avg_request_time_ms) = if total > 0 {
            (
                counters.successful_requests as f64 / total as f64 * 100.0,
                counters.total_time_ms / total as f64,
            )
        } else {
            (0.0, 0.0)
        };

        RouterStats {
            total_requests: total,
            successful_requests: counters.successful_requests,
            failed_requests: counters.failed_requests,
            success_rate,
            bytes_proxied: counters.bytes_proxied,
            avg_request_time_ms,
            latency: LatencySummary::from_samples(counters.request_times_ms.iter().copied()),
            version_requests: VersionRequests {
                blue: counters.blue_requests,
                green: counters.green_requests,
            },
            unrouted_requests: counters.unrouted_requests,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}
