pub mod activity;
pub mod readiness;
pub mod stream_health;

pub use activity::MarketDataActivity;
pub use readiness::{SafetyConfigSource, SafetyMonitor};
pub use stream_health::StreamHealthMonitor;
