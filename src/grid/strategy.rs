//! Grid pairing strategies
//!
//! Pure policy layer: initial level states, state transitions on completed
//! orders, order-placement eligibility and buy→sell pairing. Selected once
//! at startup and fixed for the session.

use std::collections::HashMap;

use log::info;
use rust_decimal::Decimal;

use crate::config::StrategyType;
use crate::order::OrderSide;

use super::level::{GridCycleState, GridLevel};

/// Grid strategy variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridStrategy {
    /// Buy levels below the central price, sell levels above it. A filled
    /// buy arms the level for a sell and vice versa. Pairing scans the sell
    /// candidates for the nearest available level above the buy price.
    Simple,
    /// Every level but the topmost is buy-eligible and every level but the
    /// bottommost is sell-eligible; fills move levels to a neutral state and
    /// flip previously paired counter-levels. Pairing is ladder adjacency.
    Hedged,
}

impl GridStrategy {
    pub fn for_type(strategy_type: StrategyType) -> Self {
        match strategy_type {
            StrategyType::SimpleGrid => GridStrategy::Simple,
            StrategyType::HedgedGrid => GridStrategy::Hedged,
        }
    }

    /// Build the initial level store and the buy/sell candidate subsets for
    /// an ascending price ladder.
    pub fn initialize_levels(
        &self,
        price_grids: &[Decimal],
        central_price: Decimal,
    ) -> (Vec<Decimal>, Vec<Decimal>, HashMap<Decimal, GridLevel>) {
        match self {
            GridStrategy::Simple => {
                let buy_grids: Vec<Decimal> = price_grids
                    .iter()
                    .copied()
                    .filter(|p| *p <= central_price)
                    .collect();
                let sell_grids: Vec<Decimal> = price_grids
                    .iter()
                    .copied()
                    .filter(|p| *p > central_price)
                    .collect();
                let levels = price_grids
                    .iter()
                    .map(|&price| {
                        let state = if price <= central_price {
                            GridCycleState::ReadyToBuy
                        } else {
                            GridCycleState::ReadyToSell
                        };
                        (price, GridLevel::new(price, state))
                    })
                    .collect();
                (buy_grids, sell_grids, levels)
            }
            GridStrategy::Hedged => {
                let top = match price_grids.last() {
                    Some(&top) => top,
                    None => return (Vec::new(), Vec::new(), HashMap::new()),
                };
                // All except the top grid are buy candidates, all except the
                // bottom grid are sell candidates.
                let buy_grids = price_grids[..price_grids.len() - 1].to_vec();
                let sell_grids = price_grids[1..].to_vec();
                let levels = price_grids
                    .iter()
                    .map(|&price| {
                        let state = if price == top {
                            GridCycleState::ReadyToSell
                        } else {
                            GridCycleState::ReadyToBuyOrSell
                        };
                        (price, GridLevel::new(price, state))
                    })
                    .collect();
                (buy_grids, sell_grids, levels)
            }
        }
    }

    /// Resolve the sell level paired with a filled buy level.
    ///
    /// Simple scans the sell candidates in ascending order and returns the
    /// first sell-eligible level strictly above the buy price. Hedged
    /// returns the next level up the ladder without consulting eligibility;
    /// that asymmetry is deliberate and preserved.
    pub fn paired_sell_level(
        &self,
        buy_price: Decimal,
        levels: &HashMap<Decimal, GridLevel>,
        sorted_sell_grids: &[Decimal],
        sorted_prices: &[Decimal],
        price_index: &HashMap<Decimal, usize>,
    ) -> Option<Decimal> {
        match self {
            GridStrategy::Simple => {
                for &sell_price in sorted_sell_grids {
                    let sell_level = levels.get(&sell_price)?;
                    if !self.can_place_order(sell_level, OrderSide::Sell) {
                        continue;
                    }
                    if sell_price > buy_price {
                        return Some(sell_price);
                    }
                }
                None
            }
            GridStrategy::Hedged => {
                let current_index = *price_index.get(&buy_price)?;
                sorted_prices.get(current_index + 1).copied()
            }
        }
    }

    /// Transition a level (and, for hedged, its paired counter-level) after
    /// an order on it completed.
    pub fn complete_order(
        &self,
        levels: &mut HashMap<Decimal, GridLevel>,
        price: Decimal,
        side: OrderSide,
    ) {
        match self {
            GridStrategy::Simple => {
                if let Some(level) = levels.get_mut(&price) {
                    level.cycle_state = match side {
                        OrderSide::Buy => GridCycleState::ReadyToSell,
                        OrderSide::Sell => GridCycleState::ReadyToBuy,
                    };
                    info!(
                        "{} order completed at grid level {}, transitioning to {:?}",
                        side, price, level.cycle_state
                    );
                }
            }
            GridStrategy::Hedged => {
                let paired = match levels.get_mut(&price) {
                    Some(level) => {
                        level.cycle_state = GridCycleState::ReadyToBuyOrSell;
                        info!(
                            "{} order completed at grid level {}, transitioning to ReadyToBuyOrSell",
                            side, price
                        );
                        match side {
                            OrderSide::Buy => level.paired_sell_level,
                            OrderSide::Sell => level.paired_buy_level,
                        }
                    }
                    None => None,
                };

                if let Some(paired_price) = paired {
                    if let Some(paired_level) = levels.get_mut(&paired_price) {
                        paired_level.cycle_state = match side {
                            OrderSide::Buy => GridCycleState::ReadyToSell,
                            OrderSide::Sell => GridCycleState::ReadyToBuy,
                        };
                        info!(
                            "Paired grid level {} transitioned to {:?}",
                            paired_price, paired_level.cycle_state
                        );
                    }
                }
            }
        }
    }

    /// Whether an order of the given side may be placed on the level
    pub fn can_place_order(&self, level: &GridLevel, side: OrderSide) -> bool {
        match self {
            GridStrategy::Simple => match side {
                OrderSide::Buy => level.cycle_state == GridCycleState::ReadyToBuy,
                OrderSide::Sell => level.cycle_state == GridCycleState::ReadyToSell,
            },
            GridStrategy::Hedged => match side {
                OrderSide::Buy => matches!(
                    level.cycle_state,
                    GridCycleState::ReadyToBuy | GridCycleState::ReadyToBuyOrSell
                ),
                OrderSide::Sell => matches!(
                    level.cycle_state,
                    GridCycleState::ReadyToSell | GridCycleState::ReadyToBuyOrSell
                ),
            },
        }
    }
}
