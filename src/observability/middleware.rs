//! Request hook and monitoring routes for axum services.
//!
//! [`instrument`] wraps any router so every response is fed to a [`MetricsCollector`]
//! and adds two read-only routes: `GET /metrics` (full snapshot) and
//! `GET /health/detailed` (health verdict).

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;

use crate::observability::metrics::{HealthSummary, MetricsCollector, MetricsSnapshot, RequestRecord};

/// Endpoint key for requests that matched no route
pub const UNMATCHED_ENDPOINT: &str = "unknown";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Measure one request and record it once the response is ready
pub async fn track_requests(
    State(collector): State<Arc<MetricsCollector>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    // Route templates keep the endpoint table bounded; unmatched paths share one key.
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());

    let config = collector.config();
    let session_id = header_value(request.headers(), &config.session_header);
    let feature = header_value(request.headers(), &config.feature_header);

    let response = next.run(request).await;

    collector.record_request(RequestRecord {
        endpoint: &endpoint,
        method: method.as_str(),
        status: response.status().as_u16(),
        latency: start.elapsed(),
        session_id: session_id.as_deref(),
        feature: feature.as_deref(),
    });

    response
}

/// `GET /metrics` and `GET /health/detailed`
pub fn monitoring_routes<S>(collector: Arc<MetricsCollector>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/metrics", get(metrics_snapshot))
        .route("/health/detailed", get(detailed_health))
        .with_state(collector)
}

/// Add the monitoring routes to `router` and record every request it serves
pub fn instrument<S>(router: Router<S>, collector: Arc<MetricsCollector>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .merge(monitoring_routes(collector.clone()))
        .layer(middleware::from_fn_with_state(collector, track_requests))
}

async fn metrics_snapshot(State(collector): State<Arc<MetricsCollector>>) -> Json<MetricsSnapshot> {
    Json(collector.get_metrics_snapshot())
}

async fn detailed_health(State(collector): State<Arc<MetricsCollector>>) -> Json<HealthSummary> {
    Json(collector.get_health_status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::MonitoringConfig;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn app(collector: Arc<MetricsCollector>) -> Router {
        let routes = Router::new()
            .route("/items/:id", get(|| async { "item" }))
            .route("/fail", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        instrument(routes, collector)
    }

    #[tokio::test]
    async fn test_requests_recorded_with_route_template_and_headers() {
        let collector = Arc::new(MetricsCollector::new(MonitoringConfig::default()));
        let app = app(collector.clone());

        let request = Request::builder()
            .uri("/items/42")
            .header("x-session-id", "s-1")
            .header("x-feature", "search")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder().uri("/fail").body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap();

        let snapshot = collector.get_metrics_snapshot();
        assert_eq!(snapshot.summary.total_requests, 2);
        assert_eq!(snapshot.summary.active_sessions, 1);
        assert_eq!(snapshot.feature_usage.get("search"), Some(&1));
        assert_eq!(snapshot.errors.recent_server, 1);
        assert!(snapshot
            .top_endpoints
            .iter()
            .any(|entry| entry.endpoint == "GET /items/:id"));
    }

    #[tokio::test]
    async fn test_unmatched_paths_share_one_endpoint() {
        let collector = Arc::new(MetricsCollector::new(MonitoringConfig::default()));
        let app = app(collector.clone());

        for i in 0..50 {
            let request = Request::builder()
                .uri(format!("/scan/{}", i))
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let snapshot = collector.get_metrics_snapshot();
        assert_eq!(snapshot.summary.total_requests, 50);
        assert_eq!(snapshot.summary.unique_endpoints, 1);
        assert_eq!(snapshot.top_endpoints.len(), 1);
        assert_eq!(snapshot.top_endpoints[0].endpoint, "GET unknown");
        assert_eq!(snapshot.top_endpoints[0].count, 50);
    }

    #[tokio::test]
    async fn test_health_detailed_route() {
        let collector = Arc::new(MetricsCollector::new(MonitoringConfig::default()));
        let request = Request::builder()
            .uri("/health/detailed")
            .body(Body::empty())
            .unwrap();
        let response = app(collector).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "healthy");
    }
}
