//! Error types for the grid trading engine

use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::{OrderSide, OrderType};

/// Errors that can occur while running the grid engine
#[derive(Error, Debug, Clone)]
pub enum GridBotError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Grid level not found at price {0}")]
    LevelNotFound(Decimal),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Insufficient fiat balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Insufficient crypto balance: required {required}, available {available}")]
    InsufficientCryptoBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("{order_type:?} {side:?} order on {pair} for {quantity} @ {price} failed: {reason}")]
    OrderExecutionFailed {
        reason: String,
        side: OrderSide,
        order_type: OrderType,
        pair: String,
        quantity: Decimal,
        price: Decimal,
    },

    #[error("Order {id} is {status}, expected {expected}")]
    UnexpectedOrderStatus {
        id: String,
        status: String,
        expected: String,
    },

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Operation aborted by shutdown signal")]
    Shutdown,
}

impl GridBotError {
    /// Known trading failures are reported as "order failed" notifications;
    /// anything else is surfaced as the generic "error occurred" kind so
    /// operators can tell expected rejections apart from bugs.
    pub fn is_expected_trading_failure(&self) -> bool {
        matches!(
            self,
            GridBotError::OrderExecutionFailed { .. }
                | GridBotError::InsufficientBalance { .. }
                | GridBotError::InsufficientCryptoBalance { .. }
        )
    }
}

/// Result type for grid engine operations
pub type Result<T> = std::result::Result<T, GridBotError>;
