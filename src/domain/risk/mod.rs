pub mod breaker_event;
pub mod signal;

pub use breaker_event::{BreakerType, CircuitBreakerEvent, Severity};
pub use signal::{ExecutionMode, SignalAction, StrategySignal};
