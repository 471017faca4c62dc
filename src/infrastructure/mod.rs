pub mod http;
pub mod observability;
pub mod persistence;
pub mod stream;
pub mod vix_provider;

pub use vix_provider::HttpVixProvider;
