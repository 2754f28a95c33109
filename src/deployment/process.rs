//! # Backend Process Control
//!
//! Spawning and stopping backend instances. Each instance is started as the leader of its
//! own process group, so a stop signal reaches every child the backend forked (worker
//! pools, reloaders) and the whole tree goes down as a unit.
//!
//! The manager talks to processes only through the [`ProcessLauncher`] trait; tests swap
//! in a fake, production uses [`CommandLauncher`]. Signalling relies on `killpg(2)`, so
//! this module is Unix-only, like the signal handling in `main.rs`.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info};

use crate::core::config::ManagerConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::Color;

/// Signal sent to a whole process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Graceful shutdown request (SIGTERM)
    Terminate,
    /// Forced kill (SIGKILL)
    Kill,
}

impl GroupSignal {
    fn raw(self) -> libc::c_int {
        match self {
            GroupSignal::Terminate => libc::SIGTERM,
            GroupSignal::Kill => libc::SIGKILL,
        }
    }
}

/// What happened when a group was signalled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No process is left in the group
    NotFound,
}

/// Process operations the lifecycle manager depends on
pub trait ProcessLauncher: Send + Sync {
    /// Start one instance listening on `port`; returns the pid (which is also the pgid)
    fn spawn(&self, color: Color, port: u16) -> GatewayResult<u32>;

    /// Send `signal` to the process group led by `pid`
    fn signal_group(&self, pid: u32, signal: GroupSignal) -> GatewayResult<Delivery>;

    /// Whether any process of the group led by `pid` is still alive
    fn is_running(&self, pid: u32) -> bool;
}

/// Launches the configured backend command as an independent process group
pub struct CommandLauncher {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    port_env: String,
    production_env: BTreeMap<String, String>,
    log_dir: Option<PathBuf>,
    /// Children spawned by this launcher, kept so exited leaders are reaped instead of
    /// lingering as zombies that still answer `kill(pid, 0)`.
    children: Mutex<HashMap<u32, Child>>,
}

impl CommandLauncher {
    /// The command is only required by `spawn`; signalling works without one.
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            command: config.command.clone(),
            working_dir: config.working_dir.clone(),
            port_env: config.port_env.clone(),
            production_env: config.production_env.clone(),
            log_dir: config.log_dir.clone(),
            children: Mutex::new(HashMap::new()),
        }
    }

    fn output_for(&self, color: Color) -> GatewayResult<(Stdio, Stdio)> {
        match &self.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(dir.join(format!("{}.log", color)))?;
                Ok((Stdio::from(file.try_clone()?), Stdio::from(file)))
            }
            None => Ok((Stdio::null(), Stdio::null())),
        }
    }

    /// Reap the leader if it was ours and has exited
    fn reap(&self, pid: u32) {
        let mut children = self.children.lock();
        if let Some(child) = children.get_mut(&pid) {
            if let Ok(Some(status)) = child.try_wait() {
                debug!(pid, %status, "Reaped backend process");
                children.remove(&pid);
            }
        }
    }
}

impl ProcessLauncher for CommandLauncher {
    fn spawn(&self, color: Color, port: u16) -> GatewayResult<u32> {
        let (program, args) = match self.command.split_first() {
            Some((program, args)) if !program.is_empty() => (program, args),
            _ => {
                return Err(GatewayError::spawn(
                    color,
                    "manager.command must name the program that starts a backend instance",
                ))
            }
        };

        let (stdout, stderr) = self
            .output_for(color)
            .map_err(|e| GatewayError::spawn(color, format!("cannot open log file: {}", e)))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .env(&self.port_env, port.to_string())
            .envs(&self.production_env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| GatewayError::spawn(color, format!("{}: {}", program, e)))?;
        let pid = child.id();

        info!(%color, port, pid, %program, "Spawned backend process group");
        self.children.lock().insert(pid, child);
        Ok(pid)
    }

    fn signal_group(&self, pid: u32, signal: GroupSignal) -> GatewayResult<Delivery> {
        let pgid = libc::pid_t::try_from(pid)
            .map_err(|_| GatewayError::internal(format!("pid {} out of range", pid)))?;

        // SAFETY: killpg only reads its two integer arguments.
        let rc = unsafe { libc::killpg(pgid, signal.raw()) };
        if rc == 0 {
            return Ok(Delivery::Delivered);
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(Delivery::NotFound)
        } else {
            Err(err.into())
        }
    }

    fn is_running(&self, pid: u32) -> bool {
        self.reap(pid);
        let Ok(pgid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs the permission and existence checks only.
        unsafe { libc::killpg(pgid, 0) == 0 }
    }
}
