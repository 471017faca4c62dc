pub mod backoff;
pub mod rate_limit;
pub mod service;

pub use backoff::Backoff;
pub use rate_limit::TokenBucket;
pub use service::{IngestConfig, MarketDataIngestService};
