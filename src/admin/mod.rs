//! # Admin Module
//!
//! Administrative HTTP endpoints. The only surface today is the deployment control API
//! of the lifecycle manager.
//!
//! ## Security Considerations
//! These endpoints start and stop processes and move production traffic. Bind them to a
//! loopback or otherwise private address (`manager.admin_addr` defaults to
//! `127.0.0.1:5003`).
//!
//! ## Usage Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use bluegreen_gateway::admin::{DeploymentAdminRouter, DeploymentAdminState};
//! use bluegreen_gateway::core::config::ManagerConfig;
//! use bluegreen_gateway::deployment::BlueGreenManager;
//!
//! # async fn run() -> bluegreen_gateway::core::error::GatewayResult<()> {
//! let manager = Arc::new(BlueGreenManager::from_config(ManagerConfig::default()).await?);
//! let app = DeploymentAdminRouter::create_router(DeploymentAdminState { manager });
//! # Ok(())
//! # }
//! ```

pub mod deployment;

pub use deployment::{DeploymentAdminRouter, DeploymentAdminState, OperationResponse, StartResponse};
