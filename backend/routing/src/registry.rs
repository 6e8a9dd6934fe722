//! Lazily populated map of backend name → circuit breaker.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::debug;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStats};

/// Creates one breaker per backend on first reference and hands out the same
/// instance thereafter. All breakers share the registry's config.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            config: config.normalized(),
        }
    }

    /// Breaker for `name`, created on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(cb) = self.breakers.read().get(name) {
            return cb.clone();
        }

        let guard = self.breakers.upgradable_read();
        if let Some(cb) = guard.get(name) {
            return cb.clone();
        }
        let mut breakers = RwLockUpgradableReadGuard::upgrade(guard);
        debug!(backend = %name, "Creating circuit breaker");
        let cb = Arc::new(CircuitBreaker::new(name, self.config.clone()));
        breakers.insert(name.to_string(), cb.clone());
        cb
    }

    /// Existing breaker for `name`, without creating one.
    pub fn peek(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }

    /// Stats for every breaker, sorted by name.
    pub fn all_stats(&self) -> Vec<CircuitStats> {
        let mut stats: Vec<CircuitStats> =
            self.breakers.read().values().map(|cb| cb.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}
