// Health probes used by the lifecycle manager
pub mod health;

// Structured logging
pub mod logging;

// Application metrics collection and alerts
pub mod metrics;

// Request hook and monitoring routes
pub mod middleware;

// Proxy-side metrics
pub mod router_metrics;

// Re-export commonly used types for convenience
pub use health::{HealthProbe, HttpHealthProbe};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{MetricsCollector, MonitoringConfig};
pub use router_metrics::{RouterMetrics, RouterStats};
