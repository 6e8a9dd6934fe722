//! Fleet Event Logger
//!
//! Liveness and routing transitions, emitted on a dedicated tracing target so
//! operators can route them separately (`RUST_LOG=fleet_events=info`).

use chrono::{DateTime, Utc};
use fleetgate_core::NodeStatus;
use serde::Serialize;
use tracing::info;

pub const FLEET_EVENTS_TARGET: &str = "fleet_events";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    AgentStatusChanged {
        agent: String,
        from: NodeStatus,
        to: NodeStatus,
    },
    AgentAddressChanged {
        agent: String,
        from: String,
        to: String,
    },
    MemberHealthChanged {
        member: String,
        from: NodeStatus,
        to: NodeStatus,
        error: Option<String>,
    },
    CircuitTransition {
        backend: String,
        from: String,
        to: String,
    },
    NodeDiscovered {
        address: String,
        services: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct FleetEventEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: FleetEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Serialize the event and emit it on the `fleet_events` target.
    pub fn log_event(event: FleetEvent) {
        let entry = FleetEventEntry {
            timestamp: Utc::now(),
            event,
        };
        match serde_json::to_string(&entry) {
            Ok(json) => info!(target: FLEET_EVENTS_TARGET, event = %json, "Fleet event"),
            Err(e) => info!(target: FLEET_EVENTS_TARGET, event = ?entry, error = %e, "Fleet event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    #[test]
    fn test_entry_serializes_flat_with_tag() {
        let entry = FleetEventEntry {
            timestamp: Utc::now(),
            event: FleetEvent::AgentStatusChanged {
                agent: "harold".into(),
                from: NodeStatus::Unknown,
                to: NodeStatus::Up,
            },
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["type"], "agent_status_changed");
        assert_eq!(v["agent"], "harold");
        assert_eq!(v["to"], "up");
        assert!(v.get("timestamp").is_some());
    }

    struct Targets(Arc<Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> Layer<S> for Targets {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(event.metadata().target().to_string());
        }
    }

    #[test]
    fn test_events_use_the_fleet_events_target() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Targets(seen.clone()));
        tracing::subscriber::with_default(subscriber, || {
            EventLogger::log_event(FleetEvent::AgentAddressChanged {
                agent: "harold".into(),
                from: "192.168.1.128".into(),
                to: "192.168.1.129".into(),
            });
        });
        assert_eq!(*seen.lock().unwrap(), vec![FLEET_EVENTS_TARGET.to_string()]);
    }

    #[test]
    fn test_log_event_without_subscriber_does_not_panic() {
        EventLogger::log_event(FleetEvent::CircuitTransition {
            backend: "local".into(),
            from: "closed".into(),
            to: "open".into(),
        });
    }
}
