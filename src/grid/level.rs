//! Grid level: a fixed price point with a cycle state and order history

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::OrderSide;

/// Cycle state of a grid level
///
/// `ReadyToBuyOrSell` only occurs under the hedged strategy. A level enters a
/// waiting state exclusively through [`GridLevel::record_pending_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridCycleState {
    ReadyToBuy,
    ReadyToSell,
    ReadyToBuyOrSell,
    WaitingForBuyFill,
    WaitingForSellFill,
    Completed,
}

/// A single grid level
///
/// Paired levels are non-owning cross-references stored as price keys into
/// the manager's flat level store, set at pairing time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    /// Price of this level, immutable after construction
    pub price: Decimal,
    /// Current cycle state
    pub cycle_state: GridCycleState,
    /// Ids of buy orders placed at this level, append-only
    pub buy_orders: Vec<String>,
    /// Ids of sell orders placed at this level, append-only
    pub sell_orders: Vec<String>,
    /// Price of the paired buy level, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_buy_level: Option<Decimal>,
    /// Price of the paired sell level, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_sell_level: Option<Decimal>,
}

impl GridLevel {
    /// Create a level in its strategy-assigned initial state
    pub fn new(price: Decimal, cycle_state: GridCycleState) -> Self {
        Self {
            price,
            cycle_state,
            buy_orders: Vec::new(),
            sell_orders: Vec::new(),
            paired_buy_level: None,
            paired_sell_level: None,
        }
    }

    /// Append an order to the side's log and transition into the waiting
    /// state. This is the only way a level enters a waiting state, so the
    /// log append and the transition stay atomic.
    pub fn record_pending_order(&mut self, side: OrderSide, order_id: String) {
        match side {
            OrderSide::Buy => {
                self.buy_orders.push(order_id);
                self.cycle_state = GridCycleState::WaitingForBuyFill;
            }
            OrderSide::Sell => {
                self.sell_orders.push(order_id);
                self.cycle_state = GridCycleState::WaitingForSellFill;
            }
        }
    }

    /// Whether the level is waiting on a fill
    pub fn is_waiting(&self) -> bool {
        matches!(
            self.cycle_state,
            GridCycleState::WaitingForBuyFill | GridCycleState::WaitingForSellFill
        )
    }

    /// Id of the most recent order on the given side
    pub fn latest_order(&self, side: OrderSide) -> Option<&String> {
        match side {
            OrderSide::Buy => self.buy_orders.last(),
            OrderSide::Sell => self.sell_orders.last(),
        }
    }
}

impl std::fmt::Display for GridLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GridLevel(price={}, state={:?}, buys={}, sells={})",
            self.price,
            self.cycle_state,
            self.buy_orders.len(),
            self.sell_orders.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_pending_buy_order_transitions_state() {
        let mut level = GridLevel::new(dec!(100), GridCycleState::ReadyToBuy);

        level.record_pending_order(OrderSide::Buy, "order-1".into());

        assert_eq!(level.cycle_state, GridCycleState::WaitingForBuyFill);
        assert_eq!(level.buy_orders, vec!["order-1".to_string()]);
        assert!(level.is_waiting());
    }

    #[test]
    fn test_record_pending_sell_order_transitions_state() {
        let mut level = GridLevel::new(dec!(110), GridCycleState::ReadyToSell);

        level.record_pending_order(OrderSide::Sell, "order-2".into());

        assert_eq!(level.cycle_state, GridCycleState::WaitingForSellFill);
        assert_eq!(level.latest_order(OrderSide::Sell), Some(&"order-2".to_string()));
    }

    #[test]
    fn test_order_logs_are_append_only() {
        let mut level = GridLevel::new(dec!(100), GridCycleState::ReadyToBuy);

        level.record_pending_order(OrderSide::Buy, "a".into());
        level.cycle_state = GridCycleState::ReadyToBuy;
        level.record_pending_order(OrderSide::Buy, "b".into());

        assert_eq!(level.buy_orders.len(), 2);
        assert_eq!(level.latest_order(OrderSide::Buy), Some(&"b".to_string()));
    }
}
