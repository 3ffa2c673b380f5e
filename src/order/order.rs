//! Order entity shared with the execution layer

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting, not yet (fully) filled
    Open,
    /// Fully filled
    Closed,
    /// Cancelled before completion
    Cancelled,
    /// Partially filled, remainder still open
    PartiallyFilled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Closed => write!(f, "closed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::PartiallyFilled => write!(f, "partially_filled"),
        }
    }
}

/// An order as seen by this engine. Created through the execution layer,
/// mutated to filled by the fill path (live exchange or simulator), never
/// mutated by the grid or balance components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier
    pub id: String,
    /// Buy or sell
    pub side: OrderSide,
    /// Market or limit
    pub order_type: OrderType,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Trading pair, e.g. "BTC/USDT"
    pub pair: String,
    /// Requested price (limit price, or reference price for market orders)
    pub price: Decimal,
    /// Average fill price, if reported by the execution layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<Decimal>,
    /// Requested quantity
    pub amount: Decimal,
    /// Filled quantity
    pub filled: Decimal,
    /// Remaining quantity
    pub remaining: Decimal,
    /// Placement timestamp (ms)
    pub timestamp: i64,
    /// Timestamp of the last fill (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_timestamp: Option<i64>,
}

impl Order {
    /// Create a freshly placed, unfilled order
    pub fn new(
        side: OrderSide,
        order_type: OrderType,
        pair: impl Into<String>,
        amount: Decimal,
        price: Decimal,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            side,
            order_type,
            status: OrderStatus::Open,
            pair: pair.into(),
            price,
            average: None,
            amount,
            filled: Decimal::ZERO,
            remaining: amount,
            timestamp,
            last_trade_timestamp: None,
        }
    }

    /// Create an order stamped with the current wall clock (live/paper path)
    pub fn new_now(
        side: OrderSide,
        order_type: OrderType,
        pair: impl Into<String>,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self::new(
            side,
            order_type,
            pair,
            amount,
            price,
            Utc::now().timestamp_millis(),
        )
    }

    /// Whether the order is still resting on the book
    pub fn is_open(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Whether the order has been fully filled
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Closed
    }

    /// Mark the order fully filled at the given timestamp
    pub fn mark_filled(&mut self, timestamp: i64) {
        self.filled = self.amount;
        self.remaining = Decimal::ZERO;
        self.status = OrderStatus::Closed;
        self.last_trade_timestamp = Some(timestamp);
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {:?} {} @ {} ({}, filled {})",
            self.id, self.side, self.order_type, self.amount, self.price, self.status, self.filled
        )
    }
}
