//! Order quantity validation against available balances
//!
//! When the requested quantity is unaffordable it is adjusted downward to
//! what the balance allows (minus a small tolerance margin to avoid dust
//! rejections at the exchange). Adjustments below a threshold fraction of
//! the requested quantity are rejected instead of silently shrinking the
//! order to nothing.

use log::warn;
use rust_decimal::Decimal;

use crate::errors::{GridBotError, Result};

/// Validates and, where possible, adjusts order quantities
#[derive(Debug, Clone, Copy)]
pub struct OrderValidator {
    /// Fraction of the balance kept back when adjusting, e.g. 0.001
    tolerance: Decimal,
    /// Minimum accepted fraction of the requested quantity
    threshold_ratio: Decimal,
}

impl OrderValidator {
    pub fn new(tolerance: Decimal, threshold_ratio: Decimal) -> Self {
        Self {
            tolerance,
            threshold_ratio,
        }
    }

    /// Validate a buy quantity against the available fiat balance,
    /// adjusting downward when the full quantity is unaffordable.
    pub fn adjust_and_validate_buy_quantity(
        &self,
        balance: Decimal,
        order_quantity: Decimal,
        price: Decimal,
    ) -> Result<Decimal> {
        let required = order_quantity * price;
        if required <= balance {
            return Ok(order_quantity);
        }

        let affordable = (balance * (Decimal::ONE - self.tolerance)) / price;
        self.accept_adjusted(affordable, order_quantity).ok_or(
            GridBotError::InsufficientBalance {
                required,
                available: balance,
            },
        )
    }

    /// Validate a sell quantity against the available crypto balance,
    /// adjusting downward when the full quantity is not held.
    pub fn adjust_and_validate_sell_quantity(
        &self,
        crypto_balance: Decimal,
        order_quantity: Decimal,
    ) -> Result<Decimal> {
        if order_quantity <= crypto_balance {
            return Ok(order_quantity);
        }

        let available = crypto_balance * (Decimal::ONE - self.tolerance);
        self.accept_adjusted(available, order_quantity).ok_or(
            GridBotError::InsufficientCryptoBalance {
                required: order_quantity,
                available: crypto_balance,
            },
        )
    }

    fn accept_adjusted(&self, adjusted: Decimal, requested: Decimal) -> Option<Decimal> {
        if adjusted > Decimal::ZERO && adjusted >= requested * self.threshold_ratio {
            warn!(
                "Order quantity adjusted from {} to {} to fit available balance",
                requested, adjusted
            );
            Some(adjusted)
        } else {
            None
        }
    }
}

impl Default for OrderValidator {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(1, 3),       // 0.001
            threshold_ratio: Decimal::new(5, 1), // 0.5
        }
    }
}
