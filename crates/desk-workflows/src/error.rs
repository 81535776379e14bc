//! Error types for compensating-action workflows.

use desk_client::{ApiError, FormStoreError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Workflow errors.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Fail-closed safety verification rejected the action.
    #[error("safety verification blocked: {0}")]
    SafetyBlocked(String),

    /// The symbol has open orders that structurally cannot be cancelled.
    #[error("{count} open order(s) cannot be cancelled; reverse aborted")]
    UncancellableOrders { count: usize },

    /// Open orders did not clear within the polling window.
    #[error("timed out waiting for {remaining} open order(s) to clear")]
    CancelTimeout { remaining: usize },

    /// The position did not read flat twice in a row within the window.
    #[error("timed out waiting for position in {symbol} to go flat")]
    FlattenTimeout { symbol: String },

    /// No position exists to act on.
    #[error("no open position in {symbol}")]
    NoPosition { symbol: String },

    /// No usable market price for a fail-closed sizing decision.
    #[error("no market price available for {symbol}")]
    PriceUnavailable { symbol: String },

    /// The market price carries no parseable, fresh timestamp.
    #[error("market price for {symbol} is stale or unstamped")]
    StalePrice { symbol: String },

    /// Order size failed the fat-finger check.
    #[error("fat-finger check failed: {0}")]
    FatFinger(String),

    /// One-click trading has not been armed by its first-use confirmation.
    #[error("one-click trading is not armed")]
    NotArmed,

    /// One-click fired again before the cooldown elapsed.
    #[error("one-click cooldown: {remaining_ms}ms remaining")]
    Cooldown { remaining_ms: i64 },

    /// The daily one-click notional ledger would exceed its cap.
    #[error("daily one-click notional cap exceeded: {used} + {attempted} > {cap}")]
    DailyCapExceeded {
        used: Decimal,
        attempted: Decimal,
        cap: Decimal,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    FormStore(#[from] FormStoreError),
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
