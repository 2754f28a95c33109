//! # Router HTTP Server
//!
//! The public listener of the traffic router, built on Axum. Two reserved `GET` paths are
//! answered locally; every other request, whatever its method or path, falls through to
//! [`TrafficRouter::proxy_request`].
//!
//! | Path | Response |
//! |---|---|
//! | `health_path` (`/__router_health`) | router status and the active color |
//! | `metrics_path` (`/__router_metrics`) | [`RouterStats`] as JSON |
//! | `<metrics_path>/prometheus` | Prometheus text, when a recorder is installed |
//!
//! Each connection is served on its own task, so one slow backend response never holds
//! up other clients.

use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router as AxumRouter,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::Color;
use crate::gateway::proxy::TrafficRouter;
use crate::observability::router_metrics::RouterStats;

/// Shared state of the router handlers
#[derive(Clone)]
pub struct RouterState {
    pub router: Arc<TrafficRouter>,
    pub prometheus: Option<PrometheusHandle>,
}

/// Body of the router health endpoint
#[derive(Debug, Serialize)]
pub struct RouterHealth {
    pub status: &'static str,
    pub active_port: Option<u16>,
    pub active_version: Option<Color>,
}

/// Traffic router server
pub struct RouterServer {
    listen_addr: SocketAddr,
    app: AxumRouter,
}

impl RouterServer {
    pub fn new(router: Arc<TrafficRouter>, prometheus: Option<PrometheusHandle>) -> Self {
        let listen_addr = router.config().listen_addr;
        let app = Self::create_app(RouterState { router, prometheus });
        Self { listen_addr, app }
    }

    /// The complete axum application, for serving or in-process testing
    pub fn app(&self) -> AxumRouter {
        self.app.clone()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    fn create_app(state: RouterState) -> AxumRouter {
        let config = state.router.config();
        let health_path = config.health_path.clone();
        let metrics_path = config.metrics_path.clone();
        let prometheus_path = format!("{}/prometheus", metrics_path.trim_end_matches('/'));

        AxumRouter::new()
            .route(&health_path, get(router_health))
            .route(&metrics_path, get(router_metrics))
            .route(&prometheus_path, get(prometheus_metrics))
            .fallback(proxy)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.listen_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind router to {}: {}", self.listen_addr, e))
        })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "🚦 Traffic router listening");

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::internal(format!("Router server error: {}", e)))?;

        info!("Traffic router stopped");
        Ok(())
    }
}

async fn router_health(State(state): State<RouterState>) -> Json<RouterHealth> {
    let backend = state.router.active_backend().await;
    Json(RouterHealth {
        status: if backend.is_some() { "healthy" } else { "unhealthy" },
        active_port: backend.map(|b| b.port),
        active_version: backend.map(|b| b.color),
    })
}

async fn router_metrics(State(state): State<RouterState>) -> Result<Json<RouterStats>, StatusCode> {
    match state.router.metrics() {
        Some(metrics) if state.router.config().metrics_enabled => Ok(Json(metrics.get_stats())),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn prometheus_metrics(State(state): State<RouterState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn proxy(
    State(state): State<RouterState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, state.router.config().max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Rejected request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    state
        .router
        .proxy_request(
            &parts.method,
            path_and_query,
            &parts.headers,
            body,
            connect_info.map(|ConnectInfo(addr)| addr.ip()),
        )
        .await
        .into_response()
}
