//! Order orchestration
//!
//! Places the initial ladder of grid orders, reacts to fill and cancel
//! events, re-places paired orders, performs the one-shot initial purchase
//! and executes take-profit / stop-loss liquidations. Every per-level
//! operation is isolated: one level's failure is logged, reported through
//! the notifier, and never aborts sibling levels.

use std::sync::Arc;

use log::{error, info, warn};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::config::TradingMode;
use crate::errors::Result;
use crate::events::{Event, EventBus, EventKind};
use crate::grid::GridManager;
use crate::notify::{NotificationKind, Notifier};
use crate::order::{Order, OrderSide};

use super::balance::BalanceTracker;
use super::book::OrderBook;
use super::execution::OrderExecution;
use super::simulator::OrderSimulator;
use super::validator::OrderValidator;

/// Reason for a forced liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    TakeProfit,
    StopLoss,
}

impl TriggerKind {
    fn event_name(&self) -> &'static str {
        match self {
            TriggerKind::TakeProfit => "Take profit",
            TriggerKind::StopLoss => "Stop loss",
        }
    }

    fn notification_kind(&self) -> NotificationKind {
        match self {
            TriggerKind::TakeProfit => NotificationKind::TakeProfitTriggered,
            TriggerKind::StopLoss => NotificationKind::StopLossTriggered,
        }
    }
}

/// Reacts to fill/cancel events and keeps the grid populated with orders
pub struct OrderManager {
    grid: Arc<Mutex<GridManager>>,
    validator: OrderValidator,
    balance: Arc<BalanceTracker>,
    book: Arc<OrderBook>,
    events: Arc<EventBus>,
    execution: Arc<dyn OrderExecution>,
    notifier: Arc<Notifier>,
    simulator: Option<Arc<OrderSimulator>>,
    trading_mode: TradingMode,
    pair: String,
}

impl OrderManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        grid: Arc<Mutex<GridManager>>,
        validator: OrderValidator,
        balance: Arc<BalanceTracker>,
        book: Arc<OrderBook>,
        events: Arc<EventBus>,
        execution: Arc<dyn OrderExecution>,
        notifier: Arc<Notifier>,
        simulator: Option<Arc<OrderSimulator>>,
        trading_mode: TradingMode,
        pair: String,
    ) -> Self {
        Self {
            grid,
            validator,
            balance,
            book,
            events,
            execution,
            notifier,
            simulator,
            trading_mode,
            pair,
        }
    }

    /// Register the fill and cancel handlers on the event bus
    pub async fn subscribe(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        self.events
            .subscribe(EventKind::OrderFilled, "order_manager", move |event| {
                let manager = Arc::clone(&manager);
                async move {
                    if let Event::OrderFilled(order) = event {
                        manager.on_order_filled(&order).await;
                    }
                    Ok(())
                }
            })
            .await;

        let manager = Arc::clone(self);
        self.events
            .subscribe(EventKind::OrderCancelled, "order_manager", move |event| {
                let manager = Arc::clone(&manager);
                async move {
                    if let Event::OrderCancelled(order) = event {
                        manager.on_order_cancelled(&order).await;
                    }
                    Ok(())
                }
            })
            .await;
    }

    /// Place the initial ladder of buy and sell limit orders around the
    /// current price.
    pub async fn initialize_grid_orders(&self, current_price: Decimal) {
        self.initialize_side_orders(OrderSide::Buy, current_price)
            .await;
        self.initialize_side_orders(OrderSide::Sell, current_price)
            .await;
    }

    async fn initialize_side_orders(&self, side: OrderSide, current_price: Decimal) {
        let candidate_prices = {
            let grid = self.grid.lock().await;
            match side {
                OrderSide::Buy => grid.sorted_buy_grids().to_vec(),
                OrderSide::Sell => grid.sorted_sell_grids().to_vec(),
            }
        };

        for price in candidate_prices {
            match side {
                OrderSide::Buy if price >= current_price => {
                    info!(
                        "Skipping grid level at price {} for BUY order: above current price",
                        price
                    );
                    continue;
                }
                OrderSide::Sell if price <= current_price => {
                    info!(
                        "Skipping grid level at price {} for SELL order: below or equal to current price",
                        price
                    );
                    continue;
                }
                _ => {}
            }

            let can_place = self.grid.lock().await.can_place_order(price, side);
            if !can_place {
                continue;
            }

            if let Err(e) = self.place_initial_order(side, price, current_price).await {
                self.handle_order_init_error(side, price, e).await;
            }
        }
    }

    async fn place_initial_order(
        &self,
        side: OrderSide,
        price: Decimal,
        current_price: Decimal,
    ) -> Result<()> {
        let total_balance_value = self.balance.total_balance_value(current_price).await;
        let order_quantity = self
            .grid
            .lock()
            .await
            .order_size_for_level(total_balance_value, current_price);

        let adjusted_quantity = match side {
            OrderSide::Buy => self.validator.adjust_and_validate_buy_quantity(
                self.balance.balance().await,
                order_quantity,
                price,
            )?,
            OrderSide::Sell => self
                .validator
                .adjust_and_validate_sell_quantity(
                    self.balance.crypto_balance().await,
                    order_quantity,
                )?,
        };

        info!(
            "Placing initial {} limit order at grid level {} for {} {}",
            side, price, adjusted_quantity, self.pair
        );
        let order = self
            .execution
            .execute_limit_order(side, &self.pair, adjusted_quantity, price)
            .await?;

        match side {
            OrderSide::Buy => {
                self.balance
                    .reserve_funds_for_buy(adjusted_quantity * price)
                    .await?
            }
            OrderSide::Sell => self.balance.reserve_funds_for_sell(adjusted_quantity).await?,
        }

        self.grid.lock().await.mark_order_pending(price, &order)?;
        self.book.add_order(order, Some(price)).await;
        Ok(())
    }

    async fn handle_order_init_error(
        &self,
        side: OrderSide,
        price: Decimal,
        error: crate::errors::GridBotError,
    ) {
        if error.is_expected_trading_failure() {
            error!(
                "Failed to initialize {} order at grid level {} - {}",
                side, price, error
            );
            self.notifier
                .notify(
                    NotificationKind::OrderFailed,
                    &format!("Error while placing initial {side} order. {error}"),
                )
                .await;
        } else {
            error!(
                "Unexpected error during {} order initialization at grid level {}: {}",
                side, price, error
            );
            self.notifier
                .notify(
                    NotificationKind::ErrorOccurred,
                    &format!("Error while placing initial {side} order: {error}"),
                )
                .await;
        }
    }

    async fn on_order_cancelled(&self, order: &Order) {
        // TODO: re-place the order at its grid level once reservation
        // release on cancellation is settled; until then cancellations only
        // notify the operator.
        warn!(
            "Order cancelled at grid level - re-placement not yet implemented: {}",
            order
        );
        self.notifier
            .notify(NotificationKind::OrderCancelled, &order.to_string())
            .await;
    }

    async fn on_order_filled(&self, order: &Order) {
        let Some(level_price) = self.book.level_for_order(&order.id).await else {
            error!(
                "Could not handle order completion - no grid level found for filled order {}",
                order
            );
            return;
        };

        if let Err(e) = self.handle_order_completion(order, level_price).await {
            error!("Failed while handling filled order - {}", e);
            self.notifier
                .notify(
                    NotificationKind::OrderFailed,
                    &format!("Failed handling filled order. {e}"),
                )
                .await;
        }
    }

    async fn handle_order_completion(&self, order: &Order, level_price: Decimal) -> Result<()> {
        match order.side {
            OrderSide::Buy => self.handle_buy_order_completion(order, level_price).await,
            OrderSide::Sell => self.handle_sell_order_completion(order, level_price).await,
        }
    }

    async fn handle_buy_order_completion(
        &self,
        order: &Order,
        level_price: Decimal,
    ) -> Result<()> {
        info!("Buy order completed at grid level {}", level_price);

        let paired_sell_price = {
            let mut grid = self.grid.lock().await;
            grid.complete_order(level_price, OrderSide::Buy);
            grid.paired_sell_level(level_price)
                .filter(|&p| grid.can_place_order(p, OrderSide::Sell))
        };

        match paired_sell_price {
            Some(target) => {
                self.place_paired_order(OrderSide::Sell, level_price, target, order.filled)
                    .await
            }
            None => {
                warn!(
                    "No valid sell grid level found for buy grid level {}. Skipping sell order placement",
                    level_price
                );
                Ok(())
            }
        }
    }

    async fn handle_sell_order_completion(
        &self,
        order: &Order,
        level_price: Decimal,
    ) -> Result<()> {
        info!("Sell order completed at grid level {}", level_price);

        let paired_buy_price = {
            let mut grid = self.grid.lock().await;
            grid.complete_order(level_price, OrderSide::Sell);
            self.resolve_paired_buy_level(&grid, level_price)
        };

        match paired_buy_price {
            Some(target) => {
                self.place_paired_order(OrderSide::Buy, level_price, target, order.filled)
                    .await
            }
            None => {
                error!(
                    "Failed to find or create a paired buy grid level for grid level {}",
                    level_price
                );
                Ok(())
            }
        }
    }

    /// Prefer the level's existing paired buy level when it is still
    /// buy-eligible, otherwise fall back to the grid level immediately
    /// below.
    fn resolve_paired_buy_level(
        &self,
        grid: &GridManager,
        sell_level_price: Decimal,
    ) -> Option<Decimal> {
        let existing = grid
            .level(sell_level_price)
            .and_then(|level| level.paired_buy_level);

        if let Some(paired) = existing {
            if grid.can_place_order(paired, OrderSide::Buy) {
                info!(
                    "Found valid paired buy level {} for sell level {}",
                    paired, sell_level_price
                );
                return Some(paired);
            }
        }

        match grid.grid_level_below(sell_level_price) {
            Some(fallback) => {
                info!(
                    "Paired fallback buy level {} with sell level {}",
                    fallback, sell_level_price
                );
                Some(fallback)
            }
            None => {
                warn!(
                    "No valid fallback buy level found below sell level {}",
                    sell_level_price
                );
                None
            }
        }
    }

    /// Place an order at the target level and pair it with the source level
    async fn place_paired_order(
        &self,
        side: OrderSide,
        source_price: Decimal,
        target_price: Decimal,
        quantity: Decimal,
    ) -> Result<()> {
        let adjusted_quantity = match side {
            OrderSide::Buy => self.validator.adjust_and_validate_buy_quantity(
                self.balance.balance().await,
                quantity,
                target_price,
            )?,
            OrderSide::Sell => self
                .validator
                .adjust_and_validate_sell_quantity(self.balance.crypto_balance().await, quantity)?,
        };

        let order = self
            .execution
            .execute_limit_order(side, &self.pair, adjusted_quantity, target_price)
            .await?;

        self.grid
            .lock()
            .await
            .pair_grid_levels(source_price, target_price, side)?;

        match side {
            OrderSide::Buy => {
                self.balance
                    .reserve_funds_for_buy(order.amount * target_price)
                    .await?
            }
            OrderSide::Sell => self.balance.reserve_funds_for_sell(order.amount).await?,
        }

        self.grid.lock().await.mark_order_pending(target_price, &order)?;
        self.book.add_order(order.clone(), Some(target_price)).await;
        self.notifier
            .notify(NotificationKind::OrderPlaced, &order.to_string())
            .await;
        Ok(())
    }

    /// One-shot market buy sizing the portfolio to its 50% crypto target
    pub async fn perform_initial_purchase(&self, current_price: Decimal) {
        let fiat_balance = self.balance.balance().await;
        let crypto_balance = self.balance.crypto_balance().await;
        let initial_quantity = self.grid.lock().await.initial_order_quantity(
            fiat_balance,
            crypto_balance,
            current_price,
        );

        if initial_quantity <= Decimal::ZERO {
            warn!("Initial purchase quantity is zero or negative. Skipping initial purchase");
            return;
        }

        info!(
            "Performing initial crypto purchase: {} at price {}",
            initial_quantity, current_price
        );

        let buy_order = match self
            .execution
            .execute_market_order(OrderSide::Buy, &self.pair, initial_quantity, current_price)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                error!("Failed while executing initial purchase - {}", e);
                self.notifier
                    .notify(
                        NotificationKind::OrderFailed,
                        &format!("Error while performing initial purchase. {e}"),
                    )
                    .await;
                return;
            }
        };

        info!("Initial crypto purchase completed. Order details: {}", buy_order);
        self.book.add_order(buy_order.clone(), None).await;
        self.notifier
            .notify(
                NotificationKind::OrderPlaced,
                &format!("Initial purchase done: {buy_order}"),
            )
            .await;

        // The backtest path settles through the simulated fill event; live
        // and paper modes settle directly from the exchange's reported fill.
        // Both produce the same balance deltas for equivalent fills.
        let settle_result = if self.trading_mode == TradingMode::Backtest {
            match &self.simulator {
                Some(simulator) => {
                    simulator
                        .simulate_fill(&buy_order.id, buy_order.timestamp)
                        .await
                }
                None => {
                    error!("Backtest mode without an order simulator; cannot settle initial purchase");
                    Ok(())
                }
            }
        } else {
            self.balance.update_after_initial_purchase(&buy_order).await
        };

        if let Err(e) = settle_result {
            error!("Failed to settle initial purchase - {}", e);
            self.notifier
                .notify(
                    NotificationKind::OrderFailed,
                    &format!("Error while performing initial purchase. {e}"),
                )
                .await;
        }
    }

    /// Market-sell the entire crypto balance on a take-profit or stop-loss
    /// trigger. The caller is expected to stop the session afterwards.
    pub async fn execute_take_profit_or_stop_loss_order(
        &self,
        current_price: Decimal,
        trigger: TriggerKind,
    ) {
        let event = trigger.event_name();
        let quantity = self.balance.crypto_balance().await;

        match self
            .execution
            .execute_market_order(OrderSide::Sell, &self.pair, quantity, current_price)
            .await
        {
            Ok(order) => {
                self.book.add_order(order.clone(), None).await;
                self.notifier
                    .notify(trigger.notification_kind(), &order.to_string())
                    .await;
                info!("{} triggered at {} and sell order executed", event, current_price);
            }
            Err(e) if e.is_expected_trading_failure() => {
                error!("Order execution failed: {}", e);
                self.notifier
                    .notify(
                        NotificationKind::OrderFailed,
                        &format!("Failed to place {event} order: {e}"),
                    )
                    .await;
            }
            Err(e) => {
                error!(
                    "Failed to execute {} sell order at {}: {}",
                    event, current_price, e
                );
                self.notifier
                    .notify(
                        NotificationKind::ErrorOccurred,
                        &format!("Failed to place {event} order: {e}"),
                    )
                    .await;
            }
        }
    }

    /// Forward a bar boundary to the fill simulator (backtest only)
    pub async fn simulate_order_fills(
        &self,
        high_price: Decimal,
        low_price: Decimal,
        timestamp: i64,
    ) -> Result<()> {
        match &self.simulator {
            Some(simulator) => {
                simulator
                    .simulate_order_fills(high_price, low_price, timestamp)
                    .await
            }
            None => {
                warn!("simulate_order_fills called outside backtest mode");
                Ok(())
            }
        }
    }
}
