//! # bluegreen - Command Line Entry Point
//!
//! One binary, two long-running roles and a set of one-shot operator commands:
//!
//! ```text
//! bluegreen router                  # public reverse proxy (port 5004)
//! bluegreen manager serve           # control API for the lifecycle manager (port 5003)
//! bluegreen manager status          # probe both colors and print the status
//! bluegreen manager deploy          # start the inactive color and switch to it
//! bluegreen manager switch green    # switch traffic after a live health probe
//! bluegreen manager rollback        # switch back to the standby color
//! bluegreen manager start blue      # start one color and wait for its health check
//! bluegreen manager stop blue       # stop one color (SIGTERM, then SIGKILL)
//! ```
//!
//! The router and the manager are meant to run as separate processes; they share
//! nothing but the deployment state file.

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use bluegreen_gateway::admin::{DeploymentAdminRouter, DeploymentAdminState};
use bluegreen_gateway::core::config::GatewayConfig;
use bluegreen_gateway::core::types::Color;
use bluegreen_gateway::deployment::BlueGreenManager;
use bluegreen_gateway::gateway::{RouterServer, TrafficRouter};
use bluegreen_gateway::observability::logging::init_logging;
use bluegreen_gateway::observability::metrics::MetricsCollector;
use bluegreen_gateway::observability::middleware::instrument;
use bluegreen_gateway::observability::router_metrics::RouterMetrics;

/// Blue-green deployment manager and traffic router
#[derive(Debug, Parser)]
#[command(name = "bluegreen", version, about)]
struct Cli {
    /// YAML configuration file; built-in defaults are used when omitted
    #[arg(long, short, env = "BLUEGREEN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the traffic router
    Router,
    /// Lifecycle manager operations
    Manager {
        #[command(subcommand)]
        action: ManagerAction,
    },
}

#[derive(Debug, Subcommand)]
enum ManagerAction {
    /// Probe both colors and print the deployment status
    Status,
    /// Deploy to the inactive color and switch traffic to it
    Deploy,
    /// Switch traffic to a color
    Switch {
        #[arg(value_enum)]
        color: Color,
    },
    /// Switch traffic back to the standby color
    Rollback,
    /// Start one color
    Start {
        #[arg(value_enum)]
        color: Color,
    },
    /// Stop one color
    Stop {
        #[arg(value_enum)]
        color: Color,
    },
    /// Serve the control API
    Serve,
}

#[derive(Serialize)]
struct Outcome {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_version: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = GatewayConfig::load(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;
    init_logging(&config.logging)?;

    match cli.command {
        Command::Router => run_router(config).await,
        Command::Manager { action } => run_manager(config, action).await,
    }
}

async fn run_router(config: GatewayConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "🚀 Starting traffic router");

    let prometheus = if config.router.prometheus_enabled {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable, continuing without it");
                None
            }
        }
    } else {
        None
    };

    let metrics = config
        .router
        .metrics_enabled
        .then(|| Arc::new(RouterMetrics::new()));
    let router = Arc::new(TrafficRouter::new(config.router.clone(), metrics)?);

    match router.active_backend().await {
        Some(backend) => info!(color = %backend.color, port = backend.port, "Active backend"),
        None => warn!(
            state_file = %config.router.state_file.display(),
            "No deployment state yet, answering 503 until the manager writes one"
        ),
    }

    RouterServer::new(router, prometheus)
        .start(shutdown_signal())
        .await?;

    info!("✅ Traffic router shutdown complete");
    Ok(())
}

async fn run_manager(config: GatewayConfig, action: ManagerAction) -> anyhow::Result<()> {
    if matches!(action, ManagerAction::Deploy | ManagerAction::Start { .. }) {
        config.manager.validate_command()?;
    }

    let manager = Arc::new(BlueGreenManager::from_config(config.manager.clone()).await?);

    match action {
        ManagerAction::Status => print_json(&manager.get_status().await)?,
        ManagerAction::Deploy => {
            let active = manager.deploy_new_version().await?;
            print_json(&Outcome {
                success: true,
                active_version: Some(active),
                pid: None,
            })?;
        }
        ManagerAction::Switch { color } => {
            manager.switch_traffic(color).await?;
            print_json(&Outcome {
                success: true,
                active_version: Some(color),
                pid: None,
            })?;
        }
        ManagerAction::Rollback => {
            let active = manager.rollback().await?;
            print_json(&Outcome {
                success: true,
                active_version: Some(active),
                pid: None,
            })?;
        }
        ManagerAction::Start { color } => {
            let pid = manager.start_instance(color).await?;
            print_json(&Outcome {
                success: true,
                active_version: None,
                pid: Some(pid),
            })?;
        }
        ManagerAction::Stop { color } => {
            manager.stop_instance(color).await?;
            print_json(&Outcome {
                success: true,
                active_version: None,
                pid: None,
            })?;
        }
        ManagerAction::Serve => serve_manager(config, manager).await?,
    }
    Ok(())
}

async fn serve_manager(config: GatewayConfig, manager: Arc<BlueGreenManager>) -> anyhow::Result<()> {
    let addr = config.manager.admin_addr;

    let monitor = config
        .manager
        .health_monitor_interval
        .map(|interval| manager.clone().spawn_health_monitor(interval));

    let collector = Arc::new(MetricsCollector::new(config.monitoring.clone()));
    let persister = collector.clone().spawn_persister();

    let app = instrument(
        DeploymentAdminRouter::create_router(DeploymentAdminState { manager }),
        collector.clone(),
    )
    .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control API to {}", addr))?;
    info!(%addr, "🎛️  Deployment control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("control API server error")?;

    if let Some(handle) = monitor {
        handle.abort();
    }
    if let Some(handle) = persister {
        handle.abort();
    }
    collector.persist_metrics().await;

    info!("✅ Deployment control API shutdown complete");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("📡 Received SIGINT (Ctrl+C), initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("📡 Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
