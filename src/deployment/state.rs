//! # Deployment State
//!
//! The persisted record of which color is live. The manager is the only writer; the
//! traffic router and status queries read it. The file is the single channel between
//! the two processes, so every write goes through [`StateStore::save`], which replaces
//! the file atomically (temp file in the same directory, fsync, rename). A reader sees
//! either the previous document or the next one, never a prefix.
//!
//! ## File format
//! ```json
//! {
//!   "active_version": "blue",
//!   "blue_port": 5005,
//!   "green_port": 5006,
//!   "blue_pid": 4242,
//!   "green_pid": null,
//!   "blue_healthy": true,
//!   "green_healthy": false,
//!   "last_switch": "2024-05-01T12:00:00Z",
//!   "last_check": null,
//!   "deployment_history": [
//!     {"timestamp": "2024-05-01T12:00:00Z", "from": "green", "to": "blue", "status": "success"}
//!   ]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::Color;

/// Outcome recorded for one history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchStatus {
    Success,
    Failed,
}

/// One traffic switch (or failed deployment attempt)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub from: Color,
    pub to: Color,
    pub status: SwitchStatus,
}

/// Which color is active, and what the manager knows about both instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub active_version: Color,
    pub blue_port: u16,
    pub green_port: u16,
    #[serde(default)]
    pub blue_pid: Option<u32>,
    #[serde(default)]
    pub green_pid: Option<u32>,
    #[serde(default)]
    pub blue_healthy: bool,
    #[serde(default)]
    pub green_healthy: bool,
    #[serde(default)]
    pub last_switch: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deployment_history: Vec<HistoryEntry>,
}

impl DeploymentState {
    /// Fresh state: blue active, no processes owned
    pub fn new(blue_port: u16, green_port: u16) -> Self {
        Self {
            active_version: Color::Blue,
            blue_port,
            green_port,
            blue_pid: None,
            green_pid: None,
            blue_healthy: false,
            green_healthy: false,
            last_switch: None,
            last_check: None,
            deployment_history: Vec::new(),
        }
    }

    pub fn port(&self, color: Color) -> u16 {
        match color {
            Color::Blue => self.blue_port,
            Color::Green => self.green_port,
        }
    }

    pub fn active_port(&self) -> u16 {
        self.port(self.active_version)
    }

    pub fn inactive_version(&self) -> Color {
        self.active_version.other()
    }

    pub fn pid(&self, color: Color) -> Option<u32> {
        match color {
            Color::Blue => self.blue_pid,
            Color::Green => self.green_pid,
        }
    }

    pub fn healthy(&self, color: Color) -> bool {
        match color {
            Color::Blue => self.blue_healthy,
            Color::Green => self.green_healthy,
        }
    }

    pub fn set_healthy(&mut self, color: Color, healthy: bool) {
        match color {
            Color::Blue => self.blue_healthy = healthy,
            Color::Green => self.green_healthy = healthy,
        }
    }

    /// Record a process that just passed its startup probe
    pub fn mark_running(&mut self, color: Color, pid: u32) {
        match color {
            Color::Blue => self.blue_pid = Some(pid),
            Color::Green => self.green_pid = Some(pid),
        }
        self.set_healthy(color, true);
    }

    /// Forget the process of a color (stopped, gone, or never started)
    pub fn clear_instance(&mut self, color: Color) {
        match color {
            Color::Blue => self.blue_pid = None,
            Color::Green => self.green_pid = None,
        }
        self.set_healthy(color, false);
    }

    /// Flip the active color and append the matching history entry
    pub fn activate(&mut self, target: Color, at: DateTime<Utc>) {
        let from = self.active_version;
        self.active_version = target;
        self.last_switch = Some(at);
        self.deployment_history.push(HistoryEntry {
            timestamp: at,
            from,
            to: target,
            status: SwitchStatus::Success,
        });
    }

    /// Append a failed attempt without touching the active color
    pub fn record_failure(&mut self, target: Color, at: DateTime<Utc>) {
        self.deployment_history.push(HistoryEntry {
            timestamp: at,
            from: self.active_version,
            to: target,
            status: SwitchStatus::Failed,
        });
    }

    /// The last `limit` history entries, oldest first
    pub fn recent_history(&self, limit: usize) -> &[HistoryEntry] {
        let start = self.deployment_history.len().saturating_sub(limit);
        &self.deployment_history[start..]
    }
}

/// Reads and atomically writes the deployment state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, `Ok(None)` when the file does not exist yet
    pub async fn load(&self) -> GatewayResult<Option<DeploymentState>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GatewayError::state(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let state = serde_json::from_slice(&content).map_err(|e| {
            GatewayError::state(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(Some(state))
    }

    /// Replace the state file atomically
    pub async fn save(&self, state: &DeploymentState) -> GatewayResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| GatewayError::internal(format!("State writer task failed: {}", e)))??;

        debug!(path = %self.path.display(), "Deployment state persisted");
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> GatewayResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    // The temp file must live in the target directory so the rename stays on one filesystem.
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        GatewayError::state(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}
