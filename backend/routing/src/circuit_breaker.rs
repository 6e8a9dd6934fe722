//! Per-backend circuit breaker.
//!
//! Closed → Open after `failure_threshold` consecutive failures. Open rejects
//! until `recovery_timeout` has elapsed since the transition, then the next
//! `allow()` moves to HalfOpen and lets that call through as a probe.
//! HalfOpen closes after `success_threshold` consecutive successes and
//! reopens on any single failure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetgate_config::{defaults, CircuitBreakerSettings};
use fleetgate_logging::{EventLogger, FleetEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Called with (backend name, old state, new state) after every transition.
pub type StateObserver = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
    pub on_state_change: Option<StateObserver>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: defaults::DEFAULT_RECOVERY_TIMEOUT,
            success_threshold: defaults::DEFAULT_SUCCESS_THRESHOLD,
            on_state_change: None,
        }
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .field("success_threshold", &self.success_threshold)
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

impl CircuitBreakerConfig {
    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.on_state_change = Some(observer);
        self
    }

    /// Replace zero values with the defaults.
    pub fn normalized(mut self) -> Self {
        if self.failure_threshold == 0 {
            self.failure_threshold = defaults::DEFAULT_FAILURE_THRESHOLD;
        }
        if self.recovery_timeout.is_zero() {
            self.recovery_timeout = defaults::DEFAULT_RECOVERY_TIMEOUT;
        }
        if self.success_threshold == 0 {
            self.success_threshold = defaults::DEFAULT_SUCCESS_THRESHOLD;
        }
        self
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.unwrap_or(0),
            recovery_timeout: settings.recovery_timeout.unwrap_or_default(),
            success_threshold: settings.success_threshold.unwrap_or(0),
            on_state_change: None,
        }
        .normalized()
    }
}

/// Point-in-time view of a breaker, safe to serialize.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub consecutive_successes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    consecutive_successes: u32,
    state_changed: Instant,
    state_changed_at: DateTime<Utc>,
    last_failure_at: Option<DateTime<Utc>>,
}

type Transition = (CircuitState, CircuitState);

impl BreakerInner {
    /// Apply a state change and its counter resets. Returns the transition, if any.
    fn transition_to(&mut self, new_state: CircuitState) -> Option<Transition> {
        if self.state == new_state {
            return None;
        }
        let old_state = self.state;
        self.state = new_state;
        self.state_changed = Instant::now();
        self.state_changed_at = Utc::now();
        self.consecutive_successes = 0;
        if new_state == CircuitState::Closed {
            self.failures = 0;
        }
        Some((old_state, new_state))
    }
}

/// Fault-tolerance state machine for one named backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: config.normalized(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                consecutive_successes: 0,
                state_changed: Instant::now(),
                state_changed_at: Utc::now(),
                last_failure_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a request may proceed right now.
    pub fn allow(&self) -> bool {
        let (allowed, transition) = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => (true, None),
                CircuitState::Open => {
                    if inner.state_changed.elapsed() >= self.config.recovery_timeout {
                        (true, inner.transition_to(CircuitState::HalfOpen))
                    } else {
                        (false, None)
                    }
                }
            }
        };
        self.notify(transition);
        allowed
    }

    pub fn record_success(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.failures = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        inner.transition_to(CircuitState::Closed)
                    } else {
                        None
                    }
                }
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    pub fn record_failure(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.failures += 1;
            inner.consecutive_successes = 0;
            inner.last_failure_at = Some(Utc::now());
            match inner.state {
                CircuitState::Closed if inner.failures >= self.config.failure_threshold => {
                    inner.transition_to(CircuitState::Open)
                }
                CircuitState::HalfOpen => inner.transition_to(CircuitState::Open),
                _ => None,
            }
        };
        self.notify(transition);
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failures(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.inner.lock().consecutive_successes
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        CircuitStats {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            consecutive_successes: inner.consecutive_successes,
            last_failure: inner.last_failure_at,
            last_state_change: inner.state_changed_at,
        }
    }

    /// Force the breaker closed.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.failures = 0;
            inner.consecutive_successes = 0;
            inner.transition_to(CircuitState::Closed)
        };
        self.notify(transition);
    }

    /// Runs with the lock released so observers may call back into the breaker.
    fn notify(&self, transition: Option<Transition>) {
        let Some((from, to)) = transition else {
            return;
        };
        match to {
            CircuitState::Open => warn!(backend = %self.name, %from, %to, "Circuit opened"),
            CircuitState::HalfOpen => {
                info!(backend = %self.name, %from, %to, "Circuit probing recovery")
            }
            CircuitState::Closed => info!(backend = %self.name, %from, %to, "Circuit closed"),
        }
        EventLogger::log_event(FleetEvent::CircuitTransition {
            backend: self.name.clone(),
            from: from.to_string(),
            to: to.to_string(),
        });
        if let Some(observer) = &self.config.on_state_change {
            debug!(backend = %self.name, "Invoking circuit observer");
            observer(&self.name, from, to);
        }
    }
}
