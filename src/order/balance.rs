//! Balance tracking with reservation accounting
//!
//! Owns the fiat/crypto balances and their reserved counterparts. Every
//! mutation happens under the tracker's own lock; no other component writes
//! these fields. Reservations move funds out of the available balance when
//! an order is placed; a fill releases the reservation, credits the opposite
//! balance and accumulates fees. A reservation shortfall (e.g. slippage
//! beyond the reserved estimate) is drawn from the available balance and the
//! reservation clamped to zero.

use std::sync::Arc;

use log::info;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::errors::{GridBotError, Result};
use crate::events::{Event, EventBus, EventKind};
use crate::exchange::Exchange;
use crate::order::{Order, OrderSide, OrderStatus};

use super::fees::FeeCalculator;

#[derive(Debug, Clone, Default)]
struct BalanceState {
    balance: Decimal,
    crypto_balance: Decimal,
    reserved_fiat: Decimal,
    reserved_crypto: Decimal,
    total_fees: Decimal,
}

/// Consistent point-in-time view of all balance fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub balance: Decimal,
    pub crypto_balance: Decimal,
    pub reserved_fiat: Decimal,
    pub reserved_crypto: Decimal,
    pub total_fees: Decimal,
}

/// Tracks fiat/crypto balances, reservations and accumulated fees
pub struct BalanceTracker {
    fee_calculator: FeeCalculator,
    state: Mutex<BalanceState>,
}

impl BalanceTracker {
    /// Initialize from configured balances (backtest / paper trading)
    pub fn new(
        fee_calculator: FeeCalculator,
        initial_balance: Decimal,
        initial_crypto_balance: Decimal,
    ) -> Self {
        Self {
            fee_calculator,
            state: Mutex::new(BalanceState {
                balance: initial_balance,
                crypto_balance: initial_crypto_balance,
                ..BalanceState::default()
            }),
        }
    }

    /// Initialize from a live balance fetch (live trading)
    pub async fn from_exchange(
        fee_calculator: FeeCalculator,
        exchange: &dyn Exchange,
        base_currency: &str,
        quote_currency: &str,
    ) -> Result<Self> {
        let balances = exchange.get_balance().await?;
        let quote = balances.free_of(quote_currency);
        let base = balances.free_of(base_currency);
        info!(
            "Fetched balances - {}: {}, {}: {}",
            quote_currency, quote, base_currency, base
        );
        Ok(Self::new(fee_calculator, quote, base))
    }

    /// Register the fill handler on the event bus
    pub async fn subscribe(self: &Arc<Self>, events: &EventBus) {
        let tracker = Arc::clone(self);
        events
            .subscribe(EventKind::OrderFilled, "balance_tracker", move |event| {
                let tracker = Arc::clone(&tracker);
                async move {
                    if let Event::OrderFilled(order) = event {
                        tracker.update_on_order_completion(&order).await;
                    }
                    Ok(())
                }
            })
            .await;
    }

    /// Apply a filled order to the balances
    pub async fn update_on_order_completion(&self, order: &Order) {
        let mut state = self.state.lock().await;
        match order.side {
            OrderSide::Buy => self.apply_buy_fill(&mut state, order.filled, order.price),
            OrderSide::Sell => self.apply_sell_fill(&mut state, order.filled, order.price),
        }
    }

    fn apply_buy_fill(&self, state: &mut BalanceState, quantity: Decimal, price: Decimal) {
        let fee = self.fee_calculator.calculate_fee(quantity * price);
        let total_cost = quantity * price + fee;

        state.reserved_fiat -= total_cost;
        if state.reserved_fiat < Decimal::ZERO {
            // Reservation was short (slippage past the reserved estimate):
            // draw the overflow from the available balance.
            let overflow = -state.reserved_fiat;
            state.balance -= overflow;
            state.reserved_fiat = Decimal::ZERO;
        }

        state.crypto_balance += quantity;
        state.total_fees += fee;
        info!("Buy order completed: {} crypto purchased at {}", quantity, price);
    }

    fn apply_sell_fill(&self, state: &mut BalanceState, quantity: Decimal, price: Decimal) {
        let fee = self.fee_calculator.calculate_fee(quantity * price);
        let sale_proceeds = quantity * price - fee;

        state.reserved_crypto -= quantity;
        if state.reserved_crypto < Decimal::ZERO {
            let overflow = -state.reserved_crypto;
            state.crypto_balance -= overflow;
            state.reserved_crypto = Decimal::ZERO;
        }

        state.balance += sale_proceeds;
        state.total_fees += fee;
        info!("Sell order completed: {} crypto sold at {}", quantity, price);
    }

    /// Settle the one-shot initial purchase from the exchange's reported
    /// fill (live/paper path; the backtest path goes through the fill event
    /// instead, and both produce the same balance deltas for equal fills).
    pub async fn update_after_initial_purchase(&self, initial_order: &Order) -> Result<()> {
        if initial_order.status != OrderStatus::Closed {
            return Err(GridBotError::UnexpectedOrderStatus {
                id: initial_order.id.clone(),
                status: initial_order.status.to_string(),
                expected: OrderStatus::Closed.to_string(),
            });
        }

        let mut state = self.state.lock().await;
        let average = initial_order.average.unwrap_or(initial_order.price);
        let total_cost = initial_order.filled * average;
        let fee = self
            .fee_calculator
            .calculate_fee(initial_order.amount * average);

        state.crypto_balance += initial_order.filled;
        state.balance -= total_cost + fee;
        state.total_fees += fee;
        info!(
            "Initial purchase settled. Crypto balance: {}, fiat balance: {}, total fees: {}",
            state.crypto_balance, state.balance, state.total_fees
        );
        Ok(())
    }

    /// Reserve fiat for a pending buy order
    pub async fn reserve_funds_for_buy(&self, amount: Decimal) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.balance < amount {
            return Err(GridBotError::InsufficientBalance {
                required: amount,
                available: state.balance,
            });
        }

        state.reserved_fiat += amount;
        state.balance -= amount;
        info!(
            "Reserved {} fiat for a buy order, remaining fiat balance: {}",
            amount, state.balance
        );
        Ok(())
    }

    /// Reserve crypto for a pending sell order
    pub async fn reserve_funds_for_sell(&self, quantity: Decimal) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.crypto_balance < quantity {
            return Err(GridBotError::InsufficientCryptoBalance {
                required: quantity,
                available: state.crypto_balance,
            });
        }

        state.reserved_crypto += quantity;
        state.crypto_balance -= quantity;
        info!(
            "Reserved {} crypto for a sell order, remaining crypto balance: {}",
            quantity, state.crypto_balance
        );
        Ok(())
    }

    pub async fn balance(&self) -> Decimal {
        self.state.lock().await.balance
    }

    pub async fn crypto_balance(&self) -> Decimal {
        self.state.lock().await.crypto_balance
    }

    pub async fn reserved_fiat(&self) -> Decimal {
        self.state.lock().await.reserved_fiat
    }

    pub async fn reserved_crypto(&self) -> Decimal {
        self.state.lock().await.reserved_crypto
    }

    pub async fn total_fees(&self) -> Decimal {
        self.state.lock().await.total_fees
    }

    /// Fiat balance including reserved funds
    pub async fn adjusted_fiat_balance(&self) -> Decimal {
        let state = self.state.lock().await;
        state.balance + state.reserved_fiat
    }

    /// Crypto balance including reserved funds
    pub async fn adjusted_crypto_balance(&self) -> Decimal {
        let state = self.state.lock().await;
        state.crypto_balance + state.reserved_crypto
    }

    /// Total account value in fiat at the given price. Reads every field
    /// under one lock acquisition so the result is a consistent snapshot.
    pub async fn total_balance_value(&self, price: Decimal) -> Decimal {
        let state = self.state.lock().await;
        state.balance
            + state.reserved_fiat
            + (state.crypto_balance + state.reserved_crypto) * price
    }

    /// Consistent snapshot of all balance fields
    pub async fn snapshot(&self) -> BalanceSnapshot {
        let state = self.state.lock().await;
        BalanceSnapshot {
            balance: state.balance,
            crypto_balance: state.crypto_balance,
            reserved_fiat: state.reserved_fiat,
            reserved_crypto: state.reserved_crypto,
            total_fees: state.total_fees,
        }
    }
}
