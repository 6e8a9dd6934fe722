//! Core types shared by the fleetgate liveness and routing crates.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{FleetError, Result};
pub use traits::ServiceResolver;
pub use types::NodeStatus;
