//! Order book: index of orders and their grid levels
//!
//! Canonical store for every order the engine has placed. Grid orders carry
//! a link to their level price; non-grid orders (initial purchase,
//! take-profit / stop-loss) are tracked without one. Orders are kept in
//! placement order so backtest replay walks them deterministically.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::errors::{GridBotError, Result};

use super::order::Order;

#[derive(Default)]
struct BookInner {
    /// Orders in placement order
    orders: Vec<Order>,
    /// Order id -> position in `orders`
    index: HashMap<String, usize>,
    /// Order id -> grid level price
    order_to_level: HashMap<String, Decimal>,
}

/// Async order index. All access goes through the book's own lock.
pub struct OrderBook {
    inner: Mutex<BookInner>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BookInner::default()),
        }
    }

    /// Register an order, optionally linked to a grid level price
    pub async fn add_order(&self, order: Order, level_price: Option<Decimal>) {
        let mut inner = self.inner.lock().await;
        if let Some(price) = level_price {
            inner.order_to_level.insert(order.id.clone(), price);
        }
        let position = inner.orders.len();
        inner.index.insert(order.id.clone(), position);
        inner.orders.push(order);
    }

    /// Snapshot of all currently open orders, in placement order
    pub async fn open_orders(&self) -> Vec<Order> {
        let inner = self.inner.lock().await;
        inner
            .orders
            .iter()
            .filter(|o| o.is_open())
            .cloned()
            .collect()
    }

    /// All registered orders, in placement order
    pub async fn orders(&self) -> Vec<Order> {
        self.inner.lock().await.orders.clone()
    }

    /// Grid level price for an order, if it is a grid order
    pub async fn level_for_order(&self, order_id: &str) -> Option<Decimal> {
        self.inner.lock().await.order_to_level.get(order_id).copied()
    }

    /// Fetch an order by id
    pub async fn get_order(&self, order_id: &str) -> Option<Order> {
        let inner = self.inner.lock().await;
        inner
            .index
            .get(order_id)
            .and_then(|&i| inner.orders.get(i))
            .cloned()
    }

    /// Mark an order fully filled and return the updated order
    pub async fn mark_filled(&self, order_id: &str, timestamp: i64) -> Result<Order> {
        let mut inner = self.inner.lock().await;
        let position = *inner
            .index
            .get(order_id)
            .ok_or_else(|| GridBotError::OrderNotFound(order_id.to_string()))?;
        let order = &mut inner.orders[position];
        order.mark_filled(timestamp);
        Ok(order.clone())
    }

    /// Number of orders ever registered
    pub async fn len(&self) -> usize {
        self.inner.lock().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.orders.is_empty()
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderSide, OrderType};
    use rust_decimal_macros::dec;

    fn limit_order(price: Decimal) -> Order {
        Order::new(
            OrderSide::Buy,
            OrderType::Limit,
            "BTC/USDT",
            dec!(1),
            price,
            0,
        )
    }

    #[tokio::test]
    async fn test_add_and_lookup_grid_order() {
        let book = OrderBook::new();
        let order = limit_order(dec!(100));
        let id = order.id.clone();

        book.add_order(order, Some(dec!(100))).await;

        assert_eq!(book.level_for_order(&id).await, Some(dec!(100)));
        assert_eq!(book.open_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_non_grid_order_has_no_level() {
        let book = OrderBook::new();
        let order = limit_order(dec!(100));
        let id = order.id.clone();

        book.add_order(order, None).await;

        assert_eq!(book.level_for_order(&id).await, None);
    }

    #[tokio::test]
    async fn test_open_orders_preserve_placement_order() {
        let book = OrderBook::new();
        for price in [dec!(105), dec!(95), dec!(100)] {
            book.add_order(limit_order(price), Some(price)).await;
        }

        let prices: Vec<Decimal> = book.open_orders().await.iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![dec!(105), dec!(95), dec!(100)]);
    }

    #[tokio::test]
    async fn test_mark_filled_removes_from_open_set() {
        let book = OrderBook::new();
        let order = limit_order(dec!(100));
        let id = order.id.clone();
        book.add_order(order, Some(dec!(100))).await;

        let filled = book.mark_filled(&id, 42).await.unwrap();

        assert!(filled.is_filled());
        assert_eq!(filled.last_trade_timestamp, Some(42));
        assert!(book.open_orders().await.is_empty());
        // The order itself is retained for history
        assert_eq!(book.len().await, 1);
    }

    #[tokio::test]
    async fn test_mark_filled_unknown_order_fails() {
        let book = OrderBook::new();
        let result = book.mark_filled("missing", 0).await;
        assert!(matches!(result, Err(GridBotError::OrderNotFound(_))));
    }
}
