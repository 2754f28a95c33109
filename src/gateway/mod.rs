//! Traffic router: the reverse proxy in front of the blue and green instances.

pub mod proxy;
pub mod server;

pub use proxy::{ActiveBackend, ProxyResponse, TrafficRouter};
pub use server::{RouterServer, RouterState};
