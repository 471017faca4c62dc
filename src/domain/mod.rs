// Market data domain
pub mod market;

// Fill ledger and P&L attribution
pub mod ledger;

// Intent / proposal contracts
pub mod intent;

// Marketplace fees and period performance
pub mod marketplace;

// Port interfaces
pub mod ports;

// Risk signals and breaker events
pub mod risk;

// Global safety state
pub mod safety;

// Canonical time handling
pub mod time;

// Domain-specific error types
pub mod errors;
