pub mod circuit_breakers;

pub use circuit_breakers::{
    BreakerContext, CircuitBreakerConfig, CircuitBreakerManager, PositionSnapshot,
};
