//! Exchange boundary - implemented by collaborators, consumed here
//!
//! This engine does not own any exchange connectivity; it talks to an
//! [`Exchange`] implementation supplied by the embedding application. The
//! [`mock`] module provides an in-memory implementation for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::order::{Order, OrderSide, OrderStatus, OrderType};

/// Free balances per currency, as reported by the exchange
#[derive(Debug, Clone, Default)]
pub struct Balances {
    pub free: HashMap<String, Decimal>,
}

impl Balances {
    /// Free balance of a currency, zero when absent
    pub fn free_of(&self, currency: &str) -> Decimal {
        self.free.get(currency).copied().unwrap_or(Decimal::ZERO)
    }
}

/// One OHLCV bar
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open timestamp (ms)
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Exchange operations used by this engine
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Fetch account balances (used at startup in live mode)
    async fn get_balance(&self) -> Result<Balances>;

    /// Place an order and return the exchange's view of it
    async fn place_order(
        &self,
        pair: &str,
        order_type: OrderType,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> Result<Order>;

    /// Cancel an order, returning its resulting status
    async fn cancel_order(&self, order_id: &str, pair: &str) -> Result<OrderStatus>;

    /// Current market price for the pair
    async fn get_current_price(&self, pair: &str) -> Result<Decimal>;

    /// Historical OHLCV bars for backtesting
    async fn fetch_ohlcv(
        &self,
        pair: &str,
        timeframe: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<Candle>>;
}

/// Mock exchange for testing without a real connection
pub mod mock {
    use super::*;
    use crate::errors::GridBotError;
    use chrono::Utc;
    use tokio::sync::Mutex;

    /// In-memory [`Exchange`]: limit orders rest, market orders fill at the
    /// requested price, balances and candles are settable.
    pub struct MockExchange {
        pub placed_orders: Mutex<Vec<Order>>,
        pub cancelled_orders: Mutex<Vec<String>>,
        current_price: Mutex<Decimal>,
        balances: Mutex<Balances>,
        candles: Mutex<Vec<Candle>>,
        should_fail: Mutex<bool>,
    }

    impl MockExchange {
        pub fn new(current_price: Decimal) -> Self {
            Self {
                placed_orders: Mutex::new(Vec::new()),
                cancelled_orders: Mutex::new(Vec::new()),
                current_price: Mutex::new(current_price),
                balances: Mutex::new(Balances::default()),
                candles: Mutex::new(Vec::new()),
                should_fail: Mutex::new(false),
            }
        }

        pub async fn set_current_price(&self, price: Decimal) {
            *self.current_price.lock().await = price;
        }

        pub async fn set_should_fail(&self, fail: bool) {
            *self.should_fail.lock().await = fail;
        }

        pub async fn set_free_balance(&self, currency: &str, amount: Decimal) {
            self.balances
                .lock()
                .await
                .free
                .insert(currency.to_string(), amount);
        }

        pub async fn set_candles(&self, candles: Vec<Candle>) {
            *self.candles.lock().await = candles;
        }

        pub async fn placed_order_count(&self) -> usize {
            self.placed_orders.lock().await.len()
        }
    }

    #[async_trait]
    impl Exchange for MockExchange {
        async fn get_balance(&self) -> Result<Balances> {
            Ok(self.balances.lock().await.clone())
        }

        async fn place_order(
            &self,
            pair: &str,
            order_type: OrderType,
            side: OrderSide,
            amount: Decimal,
            price: Decimal,
        ) -> Result<Order> {
            if *self.should_fail.lock().await {
                return Err(GridBotError::Exchange("mock failure".into()));
            }

            let mut order = Order::new(
                side,
                order_type,
                pair,
                amount,
                price,
                Utc::now().timestamp_millis(),
            );

            if order_type == OrderType::Market {
                order.average = Some(price);
                order.mark_filled(order.timestamp);
            }

            self.placed_orders.lock().await.push(order.clone());
            Ok(order)
        }

        async fn cancel_order(&self, order_id: &str, _pair: &str) -> Result<OrderStatus> {
            self.cancelled_orders
                .lock()
                .await
                .push(order_id.to_string());
            Ok(OrderStatus::Cancelled)
        }

        async fn get_current_price(&self, _pair: &str) -> Result<Decimal> {
            Ok(*self.current_price.lock().await)
        }

        async fn fetch_ohlcv(
            &self,
            _pair: &str,
            _timeframe: &str,
            _start_date: &str,
            _end_date: &str,
        ) -> Result<Vec<Candle>> {
            Ok(self.candles.lock().await.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockExchange;
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_market_order_fills_immediately() {
        let exchange = MockExchange::new(dec!(100));

        let order = exchange
            .place_order("BTC/USDT", OrderType::Market, OrderSide::Buy, dec!(2), dec!(100))
            .await
            .unwrap();

        assert!(order.is_filled());
        assert_eq!(order.average, Some(dec!(100)));
        assert_eq!(exchange.placed_order_count().await, 1);
    }

    #[tokio::test]
    async fn test_mock_limit_order_rests_open() {
        let exchange = MockExchange::new(dec!(100));

        let order = exchange
            .place_order("BTC/USDT", OrderType::Limit, OrderSide::Sell, dec!(1), dec!(110))
            .await
            .unwrap();

        assert!(order.is_open());
        assert_eq!(order.filled, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_mock_failure_flag() {
        let exchange = MockExchange::new(dec!(100));
        exchange.set_should_fail(true).await;

        let result = exchange
            .place_order("BTC/USDT", OrderType::Limit, OrderSide::Buy, dec!(1), dec!(90))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_balances_free_of() {
        let exchange = MockExchange::new(dec!(100));
        exchange.set_free_balance("USDT", dec!(5000)).await;

        let balances = exchange.get_balance().await.unwrap();
        assert_eq!(balances.free_of("USDT"), dec!(5000));
        assert_eq!(balances.free_of("BTC"), Decimal::ZERO);
    }
}
