//! # Blue-Green Lifecycle Manager
//!
//! Owns the two backend instances and the deployment state. Every public operation
//! returns a [`GatewayResult`]; spawn failures, health check timeouts and stop failures
//! are logged where they happen and come back as `Err`, never as panics.
//!
//! ## Guarantees
//! - A color's pid is recorded only after its startup probe passed, and is cleared by a
//!   completed stop. A half-started process is torn down before the error is returned.
//! - The active color changes only in [`BlueGreenManager::switch_traffic`], after a live
//!   probe of the target, and the new state reaches disk in one atomic write.
//! - Operations are serialized: each one holds the state lock from start to finish, so a
//!   deploy and a rollback can never interleave. A deploy therefore blocks status queries
//!   and the health monitor for the whole startup wait.
//! - Every operation re-reads the state file before acting. A one-shot CLI command and a
//!   serving manager share the file, and neither may write back a copy older than it.
//! - An unreadable or malformed state file is an error, never silently replaced.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::core::config::ManagerConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::Color;
use crate::deployment::process::{CommandLauncher, Delivery, GroupSignal, ProcessLauncher};
use crate::deployment::state::{DeploymentState, HistoryEntry, StateStore};
use crate::observability::health::{HealthProbe, HttpHealthProbe};

/// Whether a color currently owns a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Stopped,
}

/// Status of one color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub port: u16,
    pub pid: Option<u32>,
    pub healthy: bool,
    pub status: RunStatus,
}

/// Operator view returned by [`BlueGreenManager::get_status`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub active_version: Color,
    pub active_port: u16,
    pub blue: InstanceStatus,
    pub green: InstanceStatus,
    pub last_switch: Option<chrono::DateTime<Utc>>,
    pub last_check: Option<chrono::DateTime<Utc>>,
    pub history: Vec<HistoryEntry>,
}

impl DeploymentStatus {
    fn from_state(state: &DeploymentState, history_limit: usize) -> Self {
        let instance = |color: Color| {
            let pid = state.pid(color);
            InstanceStatus {
                port: state.port(color),
                pid,
                healthy: state.healthy(color),
                status: if pid.is_some() {
                    RunStatus::Running
                } else {
                    RunStatus::Stopped
                },
            }
        };

        Self {
            active_version: state.active_version,
            active_port: state.active_port(),
            blue: instance(Color::Blue),
            green: instance(Color::Green),
            last_switch: state.last_switch,
            last_check: state.last_check,
            history: state.recent_history(history_limit).to_vec(),
        }
    }
}

/// Blue-green lifecycle manager
pub struct BlueGreenManager {
    config: ManagerConfig,
    store: StateStore,
    launcher: Arc<dyn ProcessLauncher>,
    probe: Arc<dyn HealthProbe>,
    state: Mutex<DeploymentState>,
}

impl BlueGreenManager {
    /// Resume from the state file, or create it with blue active and no processes.
    ///
    /// Configured ports take precedence over the ones stored in the file.
    pub async fn new(
        config: ManagerConfig,
        launcher: Arc<dyn ProcessLauncher>,
        probe: Arc<dyn HealthProbe>,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let store = StateStore::new(&config.state_file);

        let (mut state, mut dirty) = match store.load().await {
            Ok(Some(state)) => (state, false),
            Ok(None) => {
                info!(path = %store.path().display(), "No deployment state found, starting with blue active");
                (DeploymentState::new(config.blue_port, config.green_port), true)
            }
            Err(e) => {
                error!(error = %e, "❌ Failed to load deployment state, refusing to overwrite it");
                return Err(e);
            }
        };

        if state.blue_port != config.blue_port || state.green_port != config.green_port {
            warn!(
                stored_blue = state.blue_port,
                stored_green = state.green_port,
                blue_port = config.blue_port,
                green_port = config.green_port,
                "Stored ports differ from configuration, adopting configured ports"
            );
            state.blue_port = config.blue_port;
            state.green_port = config.green_port;
            dirty = true;
        }

        if dirty {
            store.save(&state).await?;
        }

        Ok(Self {
            config,
            store,
            launcher,
            probe,
            state: Mutex::new(state),
        })
    }

    /// Manager backed by real processes and HTTP health probes
    pub async fn from_config(config: ManagerConfig) -> GatewayResult<Self> {
        let launcher = Arc::new(CommandLauncher::from_config(&config));
        let probe = Arc::new(HttpHealthProbe::from_config(&config)?);
        Self::new(config, launcher, probe).await
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current state, re-read from disk when possible
    pub async fn state(&self) -> DeploymentState {
        let mut state = self.state.lock().await;
        if let Err(e) = self.reload_locked(&mut state).await {
            warn!(error = %e, "⚠️ Could not re-read deployment state, using the last known one");
        }
        state.clone()
    }

    /// Start `color` and wait for its health endpoint; returns the pid
    pub async fn start_instance(&self, color: Color) -> GatewayResult<u32> {
        let mut state = self.state.lock().await;
        self.reload_locked(&mut state).await?;
        self.start_locked(&mut state, color).await
    }

    /// Stop `color`; succeeds when nothing was running
    pub async fn stop_instance(&self, color: Color) -> GatewayResult<()> {
        let mut state = self.state.lock().await;
        self.reload_locked(&mut state).await?;
        self.stop_locked(&mut state, color).await
    }

    /// Start a fresh instance on the inactive color and switch traffic to it.
    ///
    /// The previously active instance keeps running for rollback. On failure the active
    /// color is untouched and a `failed` history entry is recorded.
    pub async fn deploy_new_version(&self) -> GatewayResult<Color> {
        let mut state = self.state.lock().await;
        self.reload_locked(&mut state).await?;
        let active = state.active_version;
        let target = active.other();
        info!(%active, %target, "🔄 Starting blue-green deployment");

        match self.deploy_locked(&mut state, target).await {
            Ok(()) => Ok(target),
            Err(e) => {
                error!(%target, error = %e, "❌ Deployment failed, traffic stays on {}", active);
                state.record_failure(target, Utc::now());
                self.persist_logged(&state).await;
                Err(e)
            }
        }
    }

    /// Make `target` the active color after a live health probe
    pub async fn switch_traffic(&self, target: Color) -> GatewayResult<()> {
        let mut state = self.state.lock().await;
        self.reload_locked(&mut state).await?;
        self.switch_locked(&mut state, target).await
    }

    /// Switch back to the inactive color without restarting anything
    pub async fn rollback(&self) -> GatewayResult<Color> {
        let mut state = self.state.lock().await;
        self.reload_locked(&mut state).await?;
        let target = state.inactive_version();
        info!(%target, "🔄 Rolling back");
        self.switch_locked(&mut state, target).await?;
        Ok(target)
    }

    /// Re-probe both colors, stamp `last_check`, and report.
    ///
    /// When the state file cannot be read, reports the last known state without probing
    /// or writing anything.
    pub async fn get_status(&self) -> DeploymentStatus {
        let mut state = self.state.lock().await;
        match self.reload_locked(&mut state).await {
            Ok(()) => self.refresh_locked(&mut state).await,
            Err(e) => warn!(error = %e, "⚠️ Could not re-read deployment state, reporting the last known one"),
        }
        DeploymentStatus::from_state(&state, self.config.history_limit)
    }

    /// Re-probe both colors and persist the flags. Never switches traffic.
    pub async fn refresh_health(&self) {
        let mut state = self.state.lock().await;
        if let Err(e) = self.reload_locked(&mut state).await {
            warn!(error = %e, "⚠️ Could not re-read deployment state, skipping health refresh");
            return;
        }
        let active = state.active_version;
        let was_healthy = state.healthy(active);
        self.refresh_locked(&mut state).await;
        if was_healthy && !state.healthy(active) {
            warn!(color = %active, port = state.port(active), "⚠️ Active instance is failing its health check");
        }
    }

    /// Refresh health flags every `interval` until the task is aborted
    pub fn spawn_health_monitor(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!(interval = ?interval, "Starting background health monitor");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.refresh_health().await;
            }
        })
    }

    /// Replace the in-memory copy with the file's, keeping the configured ports.
    /// A missing file keeps the in-memory copy; the next write recreates it.
    async fn reload_locked(&self, state: &mut DeploymentState) -> GatewayResult<()> {
        if let Some(mut stored) = self.store.load().await? {
            stored.blue_port = self.config.blue_port;
            stored.green_port = self.config.green_port;
            *state = stored;
        }
        Ok(())
    }

    async fn start_locked(&self, state: &mut DeploymentState, color: Color) -> GatewayResult<u32> {
        if let Some(pid) = state.pid(color) {
            if self.launcher.is_running(pid) {
                warn!(%color, pid, "Instance already running");
                return Err(GatewayError::AlreadyRunning { color, pid });
            }
            warn!(%color, pid, "Recorded process is gone, clearing it");
            state.clear_instance(color);
        }

        let port = state.port(color);
        info!(%color, port, "🚀 Starting instance");

        let pid = self.launcher.spawn(color, port).map_err(|e| {
            error!(%color, port, error = %e, "❌ Failed to start instance");
            e
        })?;

        let attempts = self.config.startup_attempts;
        info!(%color, port, pid, attempts, "⏳ Waiting for health check");

        for attempt in 1..=attempts {
            sleep(self.config.poll_interval).await;

            if self.probe.check(port).await {
                state.mark_running(color, pid);
                if let Err(e) = self.store.save(state).await {
                    error!(%color, pid, error = %e, "Failed to persist started instance, stopping it");
                    state.clear_instance(color);
                    self.terminate_group(color, pid).await.ok();
                    return Err(e);
                }
                info!(%color, port, pid, attempt, "✅ Instance healthy");
                return Ok(pid);
            }

            if !self.launcher.is_running(pid) {
                error!(%color, port, pid, attempt, "❌ Instance exited before becoming healthy");
                state.clear_instance(color);
                self.persist_logged(state).await;
                return Err(GatewayError::spawn(color, "process exited before becoming healthy"));
            }

            debug!(%color, port, attempt, "Instance not ready yet");
        }

        error!(%color, port, pid, attempts, "❌ Instance failed health check, tearing it down");
        if let Err(e) = self.terminate_group(color, pid).await {
            error!(%color, pid, error = %e, "Failed to tear down unhealthy instance");
        }
        state.clear_instance(color);
        self.persist_logged(state).await;
        Err(GatewayError::HealthCheckFailed { color, attempts })
    }

    async fn stop_locked(&self, state: &mut DeploymentState, color: Color) -> GatewayResult<()> {
        let Some(pid) = state.pid(color) else {
            info!(%color, "No process recorded, nothing to stop");
            if state.healthy(color) {
                state.clear_instance(color);
                self.persist_logged(state).await;
            }
            return Ok(());
        };

        info!(%color, pid, "🛑 Stopping instance");
        self.terminate_group(color, pid).await.map_err(|e| {
            error!(%color, pid, error = %e, "❌ Failed to stop instance");
            e
        })?;

        state.clear_instance(color);
        self.persist_logged(state).await;
        info!(%color, pid, "✅ Instance stopped");
        Ok(())
    }

    async fn deploy_locked(&self, state: &mut DeploymentState, target: Color) -> GatewayResult<()> {
        if state.pid(target).is_some() {
            info!(color = %target, "Stopping stale instance on the inactive color");
            self.stop_locked(state, target).await?;
        }

        self.start_locked(state, target).await?;

        if let Err(e) = self.switch_locked(state, target).await {
            if let Err(stop_err) = self.stop_locked(state, target).await {
                error!(color = %target, error = %stop_err, "Failed to stop instance after aborted switch");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn switch_locked(&self, state: &mut DeploymentState, target: Color) -> GatewayResult<()> {
        let from = state.active_version;
        let port = state.port(target);

        if !self.probe.check(port).await {
            warn!(%target, port, "❌ Cannot switch: target is not healthy");
            return Err(GatewayError::Unhealthy { color: target });
        }

        let previous = state.clone();
        state.set_healthy(target, true);
        state.activate(target, Utc::now());

        if let Err(e) = self.store.save(state).await {
            error!(%target, error = %e, "❌ Failed to persist traffic switch");
            *state = previous;
            return Err(e);
        }

        info!(
            %from,
            to = %target,
            active_port = port,
            standby_port = state.port(from),
            "✅ Traffic switched"
        );
        Ok(())
    }

    async fn refresh_locked(&self, state: &mut DeploymentState) {
        let (blue, green) = tokio::join!(
            self.probe.check(state.blue_port),
            self.probe.check(state.green_port)
        );
        state.set_healthy(Color::Blue, blue);
        state.set_healthy(Color::Green, green);
        state.last_check = Some(Utc::now());
        self.persist_logged(state).await;
    }

    /// SIGTERM the group, wait up to `stop_timeout`, then SIGKILL
    async fn terminate_group(&self, color: Color, pid: u32) -> GatewayResult<()> {
        match self.launcher.signal_group(pid, GroupSignal::Terminate) {
            Ok(Delivery::NotFound) => {
                info!(%color, pid, "Process group already gone");
                return Ok(());
            }
            Ok(Delivery::Delivered) => {}
            Err(e) => return Err(GatewayError::stop(color, e.to_string())),
        }

        let deadline = Instant::now() + self.config.stop_timeout;
        loop {
            if !self.launcher.is_running(pid) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }

        warn!(%color, pid, timeout = ?self.config.stop_timeout, "Instance ignored SIGTERM, killing");
        match self.launcher.signal_group(pid, GroupSignal::Kill) {
            Ok(_) => Ok(()),
            Err(e) => Err(GatewayError::stop(color, e.to_string())),
        }
    }

    async fn persist_logged(&self, state: &DeploymentState) {
        if let Err(e) = self.store.save(state).await {
            error!(error = %e, "⚠️ Failed to persist deployment state");
        }
    }
}
