use thiserror::Error;

/// Errors related to market data parsing and stream health
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    #[error("Missing required tick field: {field}")]
    MissingField { field: String },

    #[error("Negative size for {symbol}: {size}")]
    NegativeSize { symbol: String, size: String },

    #[error("Invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: String },

    #[error("Invalid timeframe: '{value}'")]
    InvalidTimeframe { value: String },

    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Reconnect retry window exceeded after {window_secs}s")]
    RetryWindowExceeded { window_secs: u64 },
}

/// Errors raised at the fill-ledger boundary
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("trade[{field}] is required")]
    MissingField { field: &'static str },

    #[error("trade[{field}] must be a positive number, got {value}")]
    NonPositive { field: &'static str, value: String },

    #[error("trade[{field}] must be a non-negative number, got {value}")]
    Negative { field: &'static str, value: String },

    #[error("trade[side] must be 'buy' or 'sell', got '{value}'")]
    InvalidSide { value: String },
}

/// Errors related to the global safety state
#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("unsafe_to_run_strategies: {}", .reason_codes.join(","))]
    UnsafeToRun { reason_codes: Vec<String> },
}

/// Contract violations in the intent/proposal flow
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("intent symbol must not be empty")]
    EmptySymbol,

    #[error("malformed intent payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("confidence must be within [0, 1], got {value}")]
    ConfidenceOutOfRange { value: f64 },

    #[error("limit_price must be > 0")]
    NonPositiveLimitPrice,

    #[error("proposal quantity must be > 0")]
    NonPositiveQuantity,

    #[error("revenue share percentages must sum to 1.0, got {total}")]
    BadRevenueSplit { total: f64 },

    #[error("fee_rate must be >= 0")]
    NegativeFeeRate,
}
