//! Order execution strategies
//!
//! [`BacktestOrderExecutor`] synthesizes orders locally against a simulated
//! clock; fills are produced later by the order simulator. The
//! [`LiveOrderExecutor`] talks to the exchange, retrying market orders with
//! a per-attempt slippage nudge and cancelling partial fills before the next
//! attempt. A shutdown flag is observed between attempts, never mid-call.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use rust_decimal::Decimal;
use tokio::time::sleep;

use crate::config::ExecutionSettings;
use crate::errors::{GridBotError, Result};
use crate::exchange::Exchange;
use crate::order::{Order, OrderSide, OrderStatus, OrderType};

/// Places orders on behalf of the order manager
#[async_trait]
pub trait OrderExecution: Send + Sync {
    async fn execute_market_order(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order>;

    async fn execute_limit_order(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order>;
}

/// Shared simulated clock, advanced by the backtest loop at each bar so
/// synthesized orders carry reproducible timestamps.
#[derive(Clone, Default)]
pub struct SimulatedClock {
    now_ms: Arc<AtomicI64>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, timestamp_ms: i64) {
        self.now_ms.store(timestamp_ms, Ordering::SeqCst);
    }

    pub fn now(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Backtest executor: orders are created locally and rest open until the
/// simulator detects a crossed grid level.
pub struct BacktestOrderExecutor {
    clock: SimulatedClock,
}

impl BacktestOrderExecutor {
    pub fn new(clock: SimulatedClock) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl OrderExecution for BacktestOrderExecutor {
    async fn execute_market_order(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order> {
        let mut order = Order::new(
            side,
            OrderType::Market,
            pair,
            quantity,
            price,
            self.clock.now(),
        );
        order.average = Some(price);
        Ok(order)
    }

    async fn execute_limit_order(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order> {
        Ok(Order::new(
            side,
            OrderType::Limit,
            pair,
            quantity,
            price,
            self.clock.now(),
        ))
    }
}

/// Live executor backed by the exchange collaborator
pub struct LiveOrderExecutor {
    exchange: Arc<dyn Exchange>,
    max_retries: u32,
    retry_delay: Duration,
    max_slippage: Decimal,
    shutdown: Arc<AtomicBool>,
}

impl LiveOrderExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, settings: &ExecutionSettings) -> Self {
        Self {
            exchange,
            max_retries: settings.max_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            max_slippage: settings.max_slippage,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned shutdown flag
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Nudge the price by a slippage allowance proportional to the attempt
    /// number: up for buys, down for sells.
    fn adjust_price(&self, side: OrderSide, price: Decimal, attempt: u32) -> Decimal {
        let adjustment =
            self.max_slippage / Decimal::from(self.max_retries) * Decimal::from(attempt);
        match side {
            OrderSide::Buy => price * (Decimal::ONE + adjustment),
            OrderSide::Sell => price * (Decimal::ONE - adjustment),
        }
    }

    async fn handle_partial_fill(&self, order: &Order, pair: &str) {
        info!(
            "Order {} partially filled with {}. Attempting to cancel and retry full quantity",
            order.id, order.filled
        );
        if !self.retry_cancel_order(&order.id, pair).await {
            error!(
                "Unable to cancel partially filled order {} after retries",
                order.id
            );
        }
    }

    async fn retry_cancel_order(&self, order_id: &str, pair: &str) -> bool {
        for cancel_attempt in 0..self.max_retries {
            match self.exchange.cancel_order(order_id, pair).await {
                Ok(OrderStatus::Cancelled) => {
                    info!("Successfully cancelled order {}", order_id);
                    return true;
                }
                Ok(status) => {
                    warn!(
                        "Cancel attempt {} for order {} returned status {}",
                        cancel_attempt + 1,
                        order_id,
                        status
                    );
                }
                Err(e) => {
                    warn!(
                        "Error during cancel attempt {} for order {}: {}",
                        cancel_attempt + 1,
                        order_id,
                        e
                    );
                }
            }
            sleep(self.retry_delay).await;
        }
        false
    }
}

#[async_trait]
impl OrderExecution for LiveOrderExecutor {
    async fn execute_market_order(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order> {
        let mut price = price;

        for attempt in 0..self.max_retries {
            // Cooperative cancellation: checked between attempts only.
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(GridBotError::Shutdown);
            }

            match self
                .exchange
                .place_order(pair, OrderType::Market, side, quantity, price)
                .await
            {
                Ok(order) if order.status == OrderStatus::Closed => return Ok(order),
                Ok(order) if order.status == OrderStatus::PartiallyFilled => {
                    self.handle_partial_fill(&order, pair).await;
                }
                Ok(order) => {
                    warn!(
                        "Market order {} came back {} instead of filled",
                        order.id, order.status
                    );
                }
                Err(e) => {
                    error!("Attempt {} failed with error: {}", attempt + 1, e);
                }
            }

            sleep(self.retry_delay).await;
            info!(
                "Retrying order. Attempt {}/{}",
                attempt + 1,
                self.max_retries
            );
            price = self.adjust_price(side, price, attempt);
        }

        Err(GridBotError::OrderExecutionFailed {
            reason: "failed to execute market order after maximum retries".into(),
            side,
            order_type: OrderType::Market,
            pair: pair.to_string(),
            quantity,
            price,
        })
    }

    async fn execute_limit_order(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order> {
        self.exchange
            .place_order(pair, OrderType::Limit, side, quantity, price)
            .await
            .map_err(|e| GridBotError::OrderExecutionFailed {
                reason: e.to_string(),
                side,
                order_type: OrderType::Limit,
                pair: pair.to_string(),
                quantity,
                price,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{mock::MockExchange, Balances, Candle};
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    fn fast_settings() -> ExecutionSettings {
        ExecutionSettings {
            max_retries: 3,
            retry_delay_ms: 1,
            max_slippage: dec!(0.03),
        }
    }

    #[tokio::test]
    async fn test_backtest_limit_order_rests_with_simulated_timestamp() {
        let clock = SimulatedClock::new();
        clock.set(1_700_000_000_000);
        let executor = BacktestOrderExecutor::new(clock.clone());

        let order = executor
            .execute_limit_order(OrderSide::Buy, "BTC/USDT", dec!(1), dec!(100))
            .await
            .unwrap();

        assert!(order.is_open());
        assert_eq!(order.timestamp, 1_700_000_000_000);

        clock.set(1_700_000_060_000);
        let later = executor
            .execute_limit_order(OrderSide::Sell, "BTC/USDT", dec!(1), dec!(110))
            .await
            .unwrap();
        assert_eq!(later.timestamp, 1_700_000_060_000);
    }

    #[tokio::test]
    async fn test_live_market_order_succeeds_first_attempt() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        let executor = LiveOrderExecutor::new(exchange.clone(), &fast_settings());

        let order = executor
            .execute_market_order(OrderSide::Buy, "BTC/USDT", dec!(1), dec!(100))
            .await
            .unwrap();

        assert!(order.is_filled());
        assert_eq!(exchange.placed_order_count().await, 1);
    }

    #[tokio::test]
    async fn test_live_market_order_exhausts_retries() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        exchange.set_should_fail(true).await;
        let executor = LiveOrderExecutor::new(exchange, &fast_settings());

        let result = executor
            .execute_market_order(OrderSide::Buy, "BTC/USDT", dec!(1), dec!(100))
            .await;

        assert!(matches!(
            result,
            Err(GridBotError::OrderExecutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_flag_aborts_between_attempts() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        exchange.set_should_fail(true).await;
        let executor = LiveOrderExecutor::new(exchange.clone(), &fast_settings());
        executor.shutdown_flag().store(true, Ordering::SeqCst);

        let result = executor
            .execute_market_order(OrderSide::Buy, "BTC/USDT", dec!(1), dec!(100))
            .await;

        assert!(matches!(result, Err(GridBotError::Shutdown)));
        assert_eq!(exchange.placed_order_count().await, 0);
    }

    #[tokio::test]
    async fn test_limit_order_failure_maps_to_execution_error() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        exchange.set_should_fail(true).await;
        let executor = LiveOrderExecutor::new(exchange, &fast_settings());

        let result = executor
            .execute_limit_order(OrderSide::Sell, "BTC/USDT", dec!(1), dec!(110))
            .await;

        match result {
            Err(GridBotError::OrderExecutionFailed { side, .. }) => {
                assert_eq!(side, OrderSide::Sell)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// Exchange that rejects market orders until the final attempt and
    /// records the price of each attempt.
    struct FlakyExchange {
        attempt_prices: Mutex<Vec<Decimal>>,
        succeed_on_attempt: usize,
    }

    #[async_trait]
    impl Exchange for FlakyExchange {
        async fn get_balance(&self) -> Result<Balances> {
            Ok(Balances::default())
        }

        async fn place_order(
            &self,
            pair: &str,
            order_type: OrderType,
            side: OrderSide,
            amount: Decimal,
            price: Decimal,
        ) -> Result<Order> {
            let mut prices = self.attempt_prices.lock().await;
            prices.push(price);
            if prices.len() < self.succeed_on_attempt {
                return Err(GridBotError::Exchange("transient".into()));
            }
            let mut order = Order::new(side, order_type, pair, amount, price, 0);
            order.average = Some(price);
            order.mark_filled(0);
            Ok(order)
        }

        async fn cancel_order(&self, _order_id: &str, _pair: &str) -> Result<OrderStatus> {
            Ok(OrderStatus::Cancelled)
        }

        async fn get_current_price(&self, _pair: &str) -> Result<Decimal> {
            Ok(dec!(100))
        }

        async fn fetch_ohlcv(
            &self,
            _pair: &str,
            _timeframe: &str,
            _start: &str,
            _end: &str,
        ) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_retry_nudges_buy_price_upward() {
        let exchange = Arc::new(FlakyExchange {
            attempt_prices: Mutex::new(Vec::new()),
            succeed_on_attempt: 3,
        });
        let executor = LiveOrderExecutor::new(exchange.clone(), &fast_settings());

        let order = executor
            .execute_market_order(OrderSide::Buy, "BTC/USDT", dec!(1), dec!(100))
            .await
            .unwrap();

        let prices = exchange.attempt_prices.lock().await.clone();
        assert_eq!(prices.len(), 3);
        assert_eq!(prices[0], dec!(100));
        // Attempt index 0 applies no adjustment; later attempts nudge up.
        assert_eq!(prices[1], dec!(100));
        assert!(prices[2] > prices[1]);
        assert!(order.is_filled());
    }
}
