//! Telemetry and structured logging for fleetgate.
//!
//! Console + rolling NDJSON output, and the `fleet_events` stream of
//! liveness and breaker transitions.

pub mod event_logger;
pub mod logger;

pub use event_logger::{EventLogger, FleetEvent, FleetEventEntry, FLEET_EVENTS_TARGET};
pub use logger::init_logger;
