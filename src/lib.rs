//! # Blue-Green Gateway Library
//!
//! Zero-downtime deployment for a single HTTP service. Two instances of the service
//! ("blue" and "green") run side by side on fixed ports; a traffic router forwards every
//! public request to whichever one the shared deployment state marks active.
//!
//! ## Components
//! - **Lifecycle manager** ([`deployment::manager`]): spawns and stops instances, probes
//!   their health, and flips the active color only after a passing probe.
//! - **Deployment state** ([`deployment::state`]): the JSON file both processes share.
//!   The manager writes it atomically; the router only reads it.
//! - **Traffic router** ([`gateway`]): reverse proxy with a short-lived cache of the
//!   active port; answers 503 with no backend and 502 on upstream failure.
//! - **Metrics** ([`observability`]): proxy-side counters for the router and an
//!   in-process collector with alerts for the service itself.
//!
//! The manager and the router are separate OS processes. The state file is the only
//! channel between them.

/// Error types, configuration and shared data types
pub mod core;

/// Deployment state, process control and the lifecycle manager
pub mod deployment;

/// Reverse proxy and its HTTP server
pub mod gateway;

/// Health probes, logging and metrics
pub mod observability;

/// HTTP control API of the lifecycle manager
pub mod admin;

/// Main error type used throughout the crate
pub use core::error::{GatewayError, GatewayResult};

/// Top level configuration
pub use core::config::GatewayConfig;

pub use core::types::Color;
pub use deployment::{BlueGreenManager, DeploymentState, DeploymentStatus, StateStore};
pub use gateway::{RouterServer, TrafficRouter};
