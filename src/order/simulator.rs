//! Backtest fill simulation
//!
//! Detects grid levels crossed by a bar's high/low range and synthesizes
//! fills for the matching open orders, publishing the same `OrderFilled`
//! events the live path would.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::errors::Result;
use crate::events::{Event, EventBus};
use crate::grid::GridManager;
use crate::order::OrderSide;

use super::book::OrderBook;

/// Simulates order fills during backtesting
pub struct OrderSimulator {
    book: Arc<OrderBook>,
    grid: Arc<Mutex<GridManager>>,
    events: Arc<EventBus>,
}

impl OrderSimulator {
    pub fn new(book: Arc<OrderBook>, grid: Arc<Mutex<GridManager>>, events: Arc<EventBus>) -> Self {
        Self { book, grid, events }
    }

    /// Fill every open order whose grid level lies within the bar's
    /// [low, high] range. Called once per bar boundary.
    pub async fn simulate_order_fills(
        &self,
        high_price: Decimal,
        low_price: Decimal,
        timestamp: i64,
    ) -> Result<()> {
        let pending_orders = self.book.open_orders().await;

        let (crossed_buy_levels, crossed_sell_levels) = {
            let grid = self.grid.lock().await;
            let buys: HashSet<Decimal> = grid
                .sorted_buy_grids()
                .iter()
                .copied()
                .filter(|p| low_price <= *p && *p <= high_price)
                .collect();
            let sells: HashSet<Decimal> = grid
                .sorted_sell_grids()
                .iter()
                .copied()
                .filter(|p| low_price <= *p && *p <= high_price)
                .collect();
            (buys, sells)
        };

        debug!(
            "Simulating fills: high {}, low {}, pending orders: {}",
            high_price,
            low_price,
            pending_orders.len()
        );

        for order in pending_orders {
            let crossed = match order.side {
                OrderSide::Buy => crossed_buy_levels.contains(&order.price),
                OrderSide::Sell => crossed_sell_levels.contains(&order.price),
            };
            if crossed {
                self.simulate_fill(&order.id, timestamp).await?;
            }
        }

        Ok(())
    }

    /// Mark an order fully filled and publish the fill event
    pub async fn simulate_fill(&self, order_id: &str, timestamp: i64) -> Result<()> {
        let filled = self.book.mark_filled(order_id, timestamp).await?;
        info!(
            "Simulated fill for {} order at price {} with amount {} at timestamp {}",
            filled.side, filled.price, filled.amount, timestamp
        );
        self.events.publish(Event::OrderFilled(filled)).await;
        Ok(())
    }
}
