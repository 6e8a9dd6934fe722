//! Fallback lane selection.
//!
//! Picks the first lane, primary then fallbacks in order, whose breaker
//! currently allows a request. Selection does not record outcomes; callers
//! report back through `record_success` / `record_failure` once the call ends.

use std::sync::Arc;

use fleetgate_config::FallbackConfig;
use fleetgate_core::{FleetError, Result};
use tracing::{debug, warn};

use crate::registry::CircuitBreakerRegistry;

#[derive(Debug, Clone)]
pub struct LaneSelector {
    config: FallbackConfig,
    registry: Arc<CircuitBreakerRegistry>,
}

impl LaneSelector {
    pub fn new(config: FallbackConfig, registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Lanes in preference order, skipping an empty primary.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.config.primary.as_str())
            .filter(|p| !p.is_empty())
            .chain(self.config.fallbacks.iter().map(String::as_str))
    }

    /// The lane a caller should use right now.
    pub fn select_lane(&self) -> Result<String> {
        if !self.config.use_circuit_breaker {
            if let Some(lane) = self.candidates().next() {
                return Ok(lane.to_string());
            }
        } else {
            for lane in self.candidates() {
                if self.registry.get(lane).allow() {
                    if lane != self.config.primary {
                        debug!(primary = %self.config.primary, lane, "Using fallback lane");
                    }
                    return Ok(lane.to_string());
                }
            }
        }

        warn!(
            primary = %self.config.primary,
            fallbacks = ?self.config.fallbacks,
            "No lane available"
        );
        Err(FleetError::AllLanesUnavailable {
            primary: self.config.primary.clone(),
            fallbacks: self.config.fallbacks.clone(),
        })
    }
}
