//! # Traffic Router
//!
//! Forwards every request to whichever color the deployment state marks active. The
//! router never writes the state file; it re-reads it at most once per
//! `state_cache_ttl`, so a switch made by the manager takes effect within that interval.
//!
//! ## Outcome per request
//! - no state file, or an unreadable one: `503 No active backend available`, no attempt
//! - backend unreachable or too slow: `502 Bad gateway`
//! - backend answered: its status, headers and body are relayed as they are, 4xx and 5xx
//!   included
//!
//! Redirects are never followed; a `3xx` from the backend goes back to the client.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::core::config::RouterConfig;
use crate::core::error::GatewayResult;
use crate::core::types::Color;
use crate::deployment::state::{DeploymentState, StateStore};
use crate::observability::router_metrics::RouterMetrics;

/// Headers that describe one connection and must not be forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name) || name == "upgrade"
}

/// The backend currently receiving traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveBackend {
    pub color: Color,
    pub port: u16,
}

/// A complete response ready to send to the client
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    fn plain(status: StatusCode, message: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Self {
            status,
            headers,
            body: Bytes::from_static(message.as_bytes()),
        }
    }

    fn no_backend() -> Self {
        Self::plain(StatusCode::SERVICE_UNAVAILABLE, "No active backend available")
    }

    fn bad_gateway() -> Self {
        Self::plain(StatusCode::BAD_GATEWAY, "Bad gateway")
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

struct CachedState {
    state: DeploymentState,
    read_at: Instant,
}

/// Reverse proxy in front of the two colors
pub struct TrafficRouter {
    config: RouterConfig,
    store: StateStore,
    client: reqwest::Client,
    cache: Mutex<Option<CachedState>>,
    metrics: Option<Arc<RouterMetrics>>,
}

impl TrafficRouter {
    pub fn new(config: RouterConfig, metrics: Option<Arc<RouterMetrics>>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            store: StateStore::new(&config.state_file),
            config,
            client,
            cache: Mutex::new(None),
            metrics,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&Arc<RouterMetrics>> {
        self.metrics.as_ref()
    }

    /// Port of the active color, `None` when no usable state exists
    pub async fn get_active_port(&self) -> Option<u16> {
        self.active_backend().await.map(|backend| backend.port)
    }

    pub async fn active_backend(&self) -> Option<ActiveBackend> {
        let state = self.read_state().await?;
        Some(ActiveBackend {
            color: state.active_version,
            port: state.active_port(),
        })
    }

    async fn read_state(&self) -> Option<DeploymentState> {
        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.read_at.elapsed() < self.config.state_cache_ttl {
                    return Some(cached.state.clone());
                }
            }
        }

        match self.store.load().await {
            Ok(Some(state)) => {
                *self.cache.lock() = Some(CachedState {
                    state: state.clone(),
                    read_at: Instant::now(),
                });
                Some(state)
            }
            Ok(None) => {
                debug!(path = %self.store.path().display(), "No deployment state file");
                self.cache.lock().take();
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to read deployment state");
                self.cache.lock().take();
                None
            }
        }
    }

    /// Forward one request to the active backend and record the outcome
    pub async fn proxy_request(
        &self,
        method: &Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
        client_ip: Option<IpAddr>,
    ) -> ProxyResponse {
        let start = Instant::now();

        let Some(backend) = self.active_backend().await else {
            warn!(%method, path = path_and_query, "No active version available");
            self.record(false, 0, start, None);
            return ProxyResponse::no_backend();
        };

        let url = format!(
            "http://{}:{}{}",
            self.config.backend_host, backend.port, path_and_query
        );
        let upstream_method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                error!(%method, error = %e, "❌ Unsupported request method");
                self.record(false, 0, start, Some(backend.color));
                return ProxyResponse::bad_gateway();
            }
        };

        let mut request = self
            .client
            .request(upstream_method, &url)
            .headers(self.forward_headers(headers, client_ip));
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    color = %backend.color,
                    port = backend.port,
                    error = %e,
                    "❌ Proxy error"
                );
                self.record(false, 0, start, Some(backend.color));
                return ProxyResponse::bad_gateway();
            }
        };

        let status = response.status().as_u16();
        let headers = relay_headers(response.headers());
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                error!(
                    color = %backend.color,
                    port = backend.port,
                    status,
                    error = %e,
                    "❌ Backend response interrupted"
                );
                self.record(false, 0, start, Some(backend.color));
                return ProxyResponse::bad_gateway();
            }
        };

        let success = status < 400;
        self.record(success, body.len() as u64, start, Some(backend.color));

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if success {
            info!(%method, path = path_and_query, color = %backend.color, port = backend.port, status, elapsed_ms, "✅ Proxied");
        } else {
            warn!(%method, path = path_and_query, color = %backend.color, port = backend.port, status, elapsed_ms, "Backend error relayed");
        }

        ProxyResponse {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            headers,
            body,
        }
    }

    /// Copy client headers minus Host and hop-by-hop ones, then add the forwarding headers
    fn forward_headers(&self, headers: &HeaderMap, client_ip: Option<IpAddr>) -> reqwest::header::HeaderMap {
        let mut forwarded = reqwest::header::HeaderMap::with_capacity(headers.len() + 3);
        let mut original_host = None;

        for (name, value) in headers {
            if name == header::HOST {
                original_host = value.to_str().ok().map(str::to_string);
                continue;
            }
            if is_hop_by_hop(name.as_str()) || name == header::CONTENT_LENGTH {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
                reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                forwarded.append(name, value);
            }
        }

        let client_ip = client_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let original_host = original_host.unwrap_or_else(|| self.config.listen_addr.to_string());

        for (name, value) in [
            ("x-forwarded-for", client_ip),
            ("x-forwarded-proto", "http".to_string()),
            ("x-forwarded-host", original_host),
        ] {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&value) {
                forwarded.insert(reqwest::header::HeaderName::from_static(name), value);
            }
        }
        forwarded
    }

    fn record(&self, success: bool, bytes: u64, start: Instant, served_by: Option<Color>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(success, bytes, start.elapsed(), served_by);
        }
    }
}

/// Backend response headers minus hop-by-hop ones
fn relay_headers(upstream: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn router(state_file: &Path) -> TrafficRouter {
        let config = RouterConfig {
            state_file: state_file.to_path_buf(),
            ..Default::default()
        };
        TrafficRouter::new(config, Some(Arc::new(RouterMetrics::new()))).unwrap()
    }

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("upgrade"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn test_forward_headers_replace_host() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir.path().join("bg_state.json"));

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("app.example.com"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.9.9.9"));

        let forwarded = router.forward_headers(&headers, Some("10.0.0.7".parse().unwrap()));
        assert!(forwarded.get("host").is_none());
        assert!(forwarded.get("connection").is_none());
        assert_eq!(forwarded.get("x-request-id").unwrap(), "abc");
        assert_eq!(forwarded.get("x-forwarded-for").unwrap(), "10.0.0.7");
        assert_eq!(forwarded.get("x-forwarded-proto").unwrap(), "http");
        assert_eq!(forwarded.get("x-forwarded-host").unwrap(), "app.example.com");
    }

    #[tokio::test]
    async fn test_missing_state_is_503_without_attempt() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir.path().join("bg_state.json"));

        let response = router
            .proxy_request(&Method::GET, "/", &HeaderMap::new(), Bytes::new(), None)
            .await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&response.body[..], b"No active backend available");

        let stats = router.metrics().unwrap().get_stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.unrouted_requests, 1);
    }

    #[tokio::test]
    async fn test_malformed_state_is_503() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bg_state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(router(&path).get_active_port().await, None);
    }
}
