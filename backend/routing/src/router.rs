use std::future::Future;
use std::sync::Arc;

use fleetgate_config::FallbackConfig;
use fleetgate_core::{FleetError, Result};
use tracing::{debug, warn};

use crate::fallback::LaneSelector;
use crate::registry::CircuitBreakerRegistry;

/// Runs an operation against the selected lane and reports the outcome to
/// that lane's breaker.
#[derive(Debug, Clone)]
pub struct FallbackRouter {
    selector: LaneSelector,
}

impl FallbackRouter {
    pub fn new(config: FallbackConfig, registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            selector: LaneSelector::new(config, registry),
        }
    }

    pub fn selector(&self) -> &LaneSelector {
        &self.selector
    }

    /// Select a lane, then run `op` with its name. One attempt per call;
    /// a failure trips the breaker so the next call may land elsewhere.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let lane = self.selector.select_lane()?;
        let breaker = self.selector.registry().get(&lane);

        match op(lane.clone()).await {
            Ok(value) => {
                breaker.record_success();
                debug!(lane = %lane, "Lane call succeeded");
                Ok(value)
            }
            Err(e) => {
                breaker.record_failure();
                warn!(lane = %lane, error = %e, "Lane call failed");
                Err(FleetError::Other(e))
            }
        }
    }
}
