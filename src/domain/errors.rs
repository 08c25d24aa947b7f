use thiserror::Error;

/// Input validation failures, rejected before any mutation takes place.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid trade side: {0} (must be BUY or SELL)")]
    InvalidSide(String),

    #[error("Invalid quantity: {0} (must be positive)")]
    InvalidQuantity(f64),

    #[error("Invalid price: {0} (must be positive)")]
    InvalidPrice(f64),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown horizon: {0}")]
    UnknownHorizon(String),

    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    #[error("Value must be non-negative")]
    MustBeNonNegative,

    #[error("Value must be finite")]
    MustBeFinite,
}

impl From<ValidationError> for String {
    fn from(error: ValidationError) -> Self {
        error.to_string()
    }
}

/// Failure of a single decision's evaluation attempt. Retryable: the
/// decision stays pending and is picked up again on the next scheduler
/// tick.
#[derive(Debug, Error, Clone)]
pub enum EvaluationError {
    #[error("Quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },
}
