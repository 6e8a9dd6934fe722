//! Agent registry and discovery for the fleet.
//!
//! - [`AgentRegistry`]: configured agents, their status and addresses
//! - [`Discovery`]: background reachability loop
//! - [`scan_subnet`]: bounded-concurrency /24 sweep
//! - [`EngineDetector`]: inference engine auto-detection

pub mod agent;
pub mod engines;
pub mod probe;
pub mod reconcile;
pub mod registry;
pub mod scanner;

pub use agent::Agent;
pub use engines::{DetectedEngine, EngineApi, EngineDetector, EngineTarget};
pub use reconcile::{Discovery, DiscoveryOptions};
pub use registry::AgentRegistry;
pub use scanner::{scan_subnet, subnet_hosts, DiscoveredNode, ScanOptions, ServiceSignature};
