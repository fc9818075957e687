//! Error types for the application

use thiserror::Error;

/// Result type alias using our TraderError
pub type Result<T> = std::result::Result<T, TraderError>;

/// Main error type for engine and executor operations
#[derive(Error, Debug)]
pub enum TraderError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A condition record that can never enter the engine
    #[error("Invalid condition {task_id}: {reason}")]
    InvalidCondition { task_id: String, reason: String },

    /// Trigger fired but a risk check refused the order
    #[error("Risk rejected: {0}")]
    RiskRejected(#[from] RiskRejection),

    /// Execution backend failure
    #[error("Execution backend error: {0}")]
    Backend(#[from] BackendError),

    /// Engine was asked to start twice
    #[error("Engine already running")]
    AlreadyRunning,

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reason a triggered trade was refused before any order was placed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskRejection {
    #[error("daily loss limit reached: pnl {daily_pnl:.2} <= -{max_daily_loss:.2}")]
    DailyLossLimit { daily_pnl: f64, max_daily_loss: f64 },

    #[error("position too large: notional {notional:.2} > {max_position_size:.2}")]
    PositionTooLarge { notional: f64, max_position_size: f64 },

    #[error("computed position size is zero at price {price:.2}")]
    ZeroShares { price: f64 },

    #[error("no usable market price for {symbol}")]
    NoMarketPrice { symbol: String },
}

/// Why a condition could not be evaluated against a snapshot
///
/// Never propagated out of the engine: the condition is left unsatisfied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// The snapshot has no value for the indicator
    #[error("indicator '{0}' missing")]
    MissingIndicator(String),

    /// The value exists but is NaN or infinite
    #[error("indicator '{indicator}' is not finite ({value})")]
    NonFinite { indicator: String, value: f64 },
}

/// Errors reported by an execution backend
///
/// Network and timeout failures are retryable; the rest are final answers
/// from the venue.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("invalid order: {0}")]
    Invalid(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("unknown order: {0}")]
    UnknownOrder(String),
}

impl BackendError {
    /// Whether the same request could succeed if sent again
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Timeout(_) | BackendError::Network(_))
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TraderError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        TraderError::ChannelSend(err.to_string())
    }
}
