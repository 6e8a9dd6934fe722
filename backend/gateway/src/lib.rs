//! fleetgate Gateway HTTP API Server
//!
//! Read-only operator endpoints over the agent registry, health ring and
//! circuit breakers.

pub mod health_api;
pub mod healthring_api;
pub mod server;
pub mod swarm_api;

pub use server::{build_router, start_server, GatewayState};
