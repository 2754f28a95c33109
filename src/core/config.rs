//! # Configuration Module
//!
//! This module holds the configuration for every process this crate runs: the lifecycle
//! manager, the traffic router, the application metrics collector and logging.
//!
//! ## Key Features
//! - YAML configuration parsing with serde
//! - Human readable durations (`"500ms"`, `"10s"`) through `humantime_serde`
//! - Environment variable override support (`BLUEGREEN_*`)
//! - Validation with detailed error messages
//!
//! Every section implements `Default`, so a partial file (or no file at all) yields a
//! working configuration matching the classic layout: router on 5004, blue on 5005,
//! green on 5006, state in `.local_context/bg_state.json`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::logging::LogConfig;
use crate::observability::metrics::MonitoringConfig;

/// Default location of the shared deployment state file
pub const DEFAULT_STATE_FILE: &str = ".local_context/bg_state.json";

/// Top level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Lifecycle manager settings
    pub manager: ManagerConfig,

    /// Traffic router settings
    pub router: RouterConfig,

    /// Application metrics collector settings
    pub monitoring: MonitoringConfig,

    /// Logging settings
    pub logging: LogConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults.
    ///
    /// Environment overrides and validation apply in both cases.
    pub async fn load(path: Option<&Path>) -> GatewayResult<Self> {
        match path {
            Some(path) => Self::load_from_file(path).await,
            None => {
                let mut config = Self::default();
                config.apply_env_overrides()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: BLUEGREEN_<SECTION>_<FIELD>
    /// For example: BLUEGREEN_MANAGER_BLUE_PORT=7005
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        use std::env;

        if let Ok(port) = env::var("BLUEGREEN_MANAGER_BLUE_PORT") {
            self.manager.blue_port = parse_env("BLUEGREEN_MANAGER_BLUE_PORT", &port)?;
        }

        if let Ok(port) = env::var("BLUEGREEN_MANAGER_GREEN_PORT") {
            self.manager.green_port = parse_env("BLUEGREEN_MANAGER_GREEN_PORT", &port)?;
        }

        if let Ok(command) = env::var("BLUEGREEN_MANAGER_COMMAND") {
            self.manager.command = command.split_whitespace().map(str::to_string).collect();
        }

        if let Ok(addr) = env::var("BLUEGREEN_MANAGER_ADMIN_ADDR") {
            self.manager.admin_addr = parse_env("BLUEGREEN_MANAGER_ADMIN_ADDR", &addr)?;
        }

        // One state file is the only channel between manager and router, so a single
        // variable moves both ends together.
        if let Ok(state_file) = env::var("BLUEGREEN_STATE_FILE") {
            self.manager.state_file = PathBuf::from(&state_file);
            self.router.state_file = PathBuf::from(state_file);
        }

        if let Ok(addr) = env::var("BLUEGREEN_ROUTER_LISTEN_ADDR") {
            self.router.listen_addr = parse_env("BLUEGREEN_ROUTER_LISTEN_ADDR", &addr)?;
        }

        if let Ok(timeout) = env::var("BLUEGREEN_ROUTER_REQUEST_TIMEOUT") {
            self.router.request_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                GatewayError::config(format!("Invalid BLUEGREEN_ROUTER_REQUEST_TIMEOUT: {}", e))
            })?;
        }

        if let Ok(level) = env::var("BLUEGREEN_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> GatewayResult<()> {
        self.manager.validate()?;
        self.router.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> GatewayResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| GatewayError::config(format!("Invalid {}: {}", name, e)))
}

/// Lifecycle manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Program and arguments that start one backend instance
    pub command: Vec<String>,

    /// Working directory for the backend process
    pub working_dir: Option<PathBuf>,

    /// Port assigned to the blue instance
    pub blue_port: u16,

    /// Port assigned to the green instance
    pub green_port: u16,

    /// Path of the persisted deployment state
    pub state_file: PathBuf,

    /// Host the health probe connects to
    pub health_host: String,

    /// Path of the backend health endpoint
    pub health_path: String,

    /// Timeout of a single health probe
    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,

    /// Number of health polls after spawning before giving up
    pub startup_attempts: u32,

    /// Delay between health polls and between stop checks
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How long a stopping instance gets before it is killed
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Environment variable carrying the assigned port
    pub port_env: String,

    /// Extra environment marking the backend as running in production
    pub production_env: BTreeMap<String, String>,

    /// Directory for `<color>.log` files capturing backend output
    pub log_dir: Option<PathBuf>,

    /// Number of history entries shown in status output
    pub history_limit: usize,

    /// Bind address of the manager control API
    pub admin_addr: SocketAddr,

    /// Background health refresh interval for `manager serve` (off when unset)
    #[serde(default, with = "humantime_serde")]
    pub health_monitor_interval: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let mut production_env = BTreeMap::new();
        production_env.insert("APP_ENV".to_string(), "production".to_string());

        Self {
            command: Vec::new(),
            working_dir: None,
            blue_port: 5005,
            green_port: 5006,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            health_host: "127.0.0.1".to_string(),
            health_path: "/health".to_string(),
            health_timeout: Duration::from_secs(5),
            startup_attempts: 30,
            poll_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(10),
            port_env: "PORT".to_string(),
            production_env,
            log_dir: None,
            history_limit: 5,
            admin_addr: SocketAddr::from(([127, 0, 0, 1], 5003)),
            health_monitor_interval: None,
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.blue_port == self.green_port {
            return Err(GatewayError::config(format!(
                "blue_port and green_port must differ (both are {})",
                self.blue_port
            )));
        }
        if self.blue_port == 0 || self.green_port == 0 {
            return Err(GatewayError::config("instance ports must be non-zero"));
        }
        if self.startup_attempts == 0 {
            return Err(GatewayError::config("startup_attempts must be at least 1"));
        }
        if self.poll_interval.is_zero() || self.health_timeout.is_zero() {
            return Err(GatewayError::config(
                "poll_interval and health_timeout must be non-zero",
            ));
        }
        if !self.health_path.starts_with('/') {
            return Err(GatewayError::config(format!(
                "health_path must start with '/': {}",
                self.health_path
            )));
        }
        if self.port_env.is_empty() {
            return Err(GatewayError::config("port_env must not be empty"));
        }
        Ok(())
    }

    /// Checked separately because read-only commands (status, switch) work without it
    pub fn validate_command(&self) -> GatewayResult<()> {
        match self.command.first() {
            Some(program) if !program.is_empty() => Ok(()),
            _ => Err(GatewayError::config(
                "manager.command must name the program that starts a backend instance",
            )),
        }
    }
}

/// Traffic router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Public listen address
    pub listen_addr: SocketAddr,

    /// Deployment state file written by the manager
    pub state_file: PathBuf,

    /// Host the active backend listens on
    pub backend_host: String,

    /// Upstream connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Upstream total request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long a parsed state file is reused before re-reading
    #[serde(with = "humantime_serde")]
    pub state_cache_ttl: Duration,

    /// Record router metrics and serve the metrics endpoint
    pub metrics_enabled: bool,

    /// Serve Prometheus text below the metrics endpoint
    pub prometheus_enabled: bool,

    /// Maximum inbound body size buffered for forwarding
    pub max_body_size: usize,

    /// Reserved path reporting the router's own view of health
    pub health_path: String,

    /// Reserved path serving the router metrics snapshot
    pub metrics_path: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5004)),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            backend_host: "127.0.0.1".to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(9),
            state_cache_ttl: Duration::from_secs(1),
            metrics_enabled: true,
            prometheus_enabled: true,
            max_body_size: 16 * 1024 * 1024, // 16MB
            health_path: "/__router_health".to_string(),
            metrics_path: "/__router_metrics".to_string(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(GatewayError::config(
                "router connect_timeout and request_timeout must be non-zero",
            ));
        }
        for path in [&self.health_path, &self.metrics_path] {
            if !path.starts_with('/') {
                return Err(GatewayError::config(format!(
                    "router control paths must start with '/': {}",
                    path
                )));
            }
        }
        if self.health_path == self.metrics_path {
            return Err(GatewayError::config(
                "router health_path and metrics_path must differ",
            ));
        }
        Ok(())
    }
}
