//! Blue-green deployment: persisted state, backend processes and the lifecycle manager.

pub mod manager;
pub mod process;
pub mod state;

pub use manager::{BlueGreenManager, DeploymentStatus, InstanceStatus, RunStatus};
pub use process::{CommandLauncher, Delivery, GroupSignal, ProcessLauncher};
pub use state::{DeploymentState, HistoryEntry, StateStore, SwitchStatus};
