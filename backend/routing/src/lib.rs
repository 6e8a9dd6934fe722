//! Circuit breakers and fallback lane selection for inference backends.

pub mod circuit_breaker;
pub mod fallback;
pub mod registry;
pub mod router;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats, StateObserver,
};
pub use fallback::LaneSelector;
pub use registry::CircuitBreakerRegistry;
pub use router::FallbackRouter;
