//! # Deployment Control API
//!
//! HTTP surface of the lifecycle manager, served by `bluegreen manager serve`. Every
//! endpoint maps to one manager operation; failures come back as the structured JSON
//! error of [`GatewayError`] with its status code (409 for an unhealthy switch target,
//! 503 for an instance that never became healthy).
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/status` | `get_status` |
//! | POST | `/deploy` | `deploy_new_version` |
//! | POST | `/switch/:color` | `switch_traffic` |
//! | POST | `/rollback` | `rollback` |
//! | POST | `/instances/:color/start` | `start_instance` |
//! | POST | `/instances/:color/stop` | `stop_instance` |
//! | GET | `/health` | liveness of the control API itself |
//!
//! Manager operations run one at a time. A `POST /deploy` holds the manager until the new
//! instance passes its startup probe or runs out of attempts, so a `GET /status` issued
//! meanwhile answers only after the deploy finishes. `/health` never waits.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::error::GatewayResult;
use crate::core::types::Color;
use crate::deployment::manager::{BlueGreenManager, DeploymentStatus};

/// Deployment control state
#[derive(Clone)]
pub struct DeploymentAdminState {
    pub manager: Arc<BlueGreenManager>,
}

/// Deployment control router
pub struct DeploymentAdminRouter;

impl DeploymentAdminRouter {
    /// Create the deployment control router with all endpoints
    pub fn create_router(state: DeploymentAdminState) -> Router {
        Router::new()
            .route("/status", get(get_status))
            .route("/deploy", post(deploy))
            .route("/switch/:color", post(switch_traffic))
            .route("/rollback", post(rollback))
            .route("/instances/:color/start", post(start_instance))
            .route("/instances/:color/stop", post(stop_instance))
            .route("/health", get(health))
            .with_state(state)
    }
}

/// Result of a state-changing operation
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
    pub active_version: Color,
}

/// Result of starting an instance
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    pub color: Color,
    pub pid: u32,
}

async fn get_status(State(state): State<DeploymentAdminState>) -> Json<DeploymentStatus> {
    Json(state.manager.get_status().await)
}

async fn deploy(State(state): State<DeploymentAdminState>) -> GatewayResult<Json<OperationResponse>> {
    let active = state.manager.deploy_new_version().await?;
    Ok(Json(OperationResponse {
        success: true,
        message: format!("Deployed and switched traffic to {}", active),
        active_version: active,
    }))
}

async fn switch_traffic(
    State(state): State<DeploymentAdminState>,
    Path(color): Path<Color>,
) -> GatewayResult<Json<OperationResponse>> {
    state.manager.switch_traffic(color).await?;
    Ok(Json(OperationResponse {
        success: true,
        message: format!("Traffic switched to {}", color),
        active_version: color,
    }))
}

async fn rollback(State(state): State<DeploymentAdminState>) -> GatewayResult<Json<OperationResponse>> {
    let active = state.manager.rollback().await?;
    Ok(Json(OperationResponse {
        success: true,
        message: format!("Rolled back to {}", active),
        active_version: active,
    }))
}

async fn start_instance(
    State(state): State<DeploymentAdminState>,
    Path(color): Path<Color>,
) -> GatewayResult<Json<StartResponse>> {
    let pid = state.manager.start_instance(color).await?;
    Ok(Json(StartResponse {
        success: true,
        color,
        pid,
    }))
}

async fn stop_instance(
    State(state): State<DeploymentAdminState>,
    Path(color): Path<Color>,
) -> GatewayResult<Json<OperationResponse>> {
    state.manager.stop_instance(color).await?;
    let active = state.manager.state().await.active_version;
    Ok(Json(OperationResponse {
        success: true,
        message: format!("{} instance stopped", color),
        active_version: active,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
