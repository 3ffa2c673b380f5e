//! Grid manager: owns the price ladder and the level store
//!
//! Builds the grid from the configured price range (arithmetic or geometric
//! spacing), splits it into buy/sell candidate subsets around the central
//! price, and exposes the pairing/transition facade. All state transitions
//! are delegated to the active [`GridStrategy`].

use std::collections::HashMap;

use log::{info, warn};
use rust_decimal::{Decimal, MathematicalOps};

use crate::config::{GridSettings, SpacingType};
use crate::errors::{GridBotError, Result};
use crate::order::{Order, OrderSide};

use super::level::GridLevel;
use super::strategy::GridStrategy;

/// Owns the full grid: price ladder, level store, candidate subsets and the
/// price → ladder-index map used for neighbor lookups.
pub struct GridManager {
    strategy: GridStrategy,
    price_grids: Vec<Decimal>,
    central_price: Decimal,
    sorted_buy_grids: Vec<Decimal>,
    sorted_sell_grids: Vec<Decimal>,
    levels: HashMap<Decimal, GridLevel>,
    price_index: HashMap<Decimal, usize>,
}

impl GridManager {
    /// Build the grid and initialize level states for the configured
    /// strategy. Fails with `InvalidConfig` for unusable grid settings.
    pub fn new(settings: &GridSettings) -> Result<Self> {
        if settings.num_grids < 2 {
            return Err(GridBotError::InvalidConfig(
                "num_grids must be at least 2".into(),
            ));
        }
        if settings.bottom_range <= Decimal::ZERO || settings.bottom_range >= settings.top_range {
            return Err(GridBotError::InvalidConfig(
                "grid range must satisfy 0 < bottom < top".into(),
            ));
        }

        let (price_grids, central_price) = Self::calculate_price_grids_and_central_price(settings);

        let strategy = GridStrategy::for_type(settings.strategy);
        let (sorted_buy_grids, sorted_sell_grids, levels) =
            strategy.initialize_levels(&price_grids, central_price);

        let price_index = price_grids
            .iter()
            .enumerate()
            .map(|(i, &p)| (p, i))
            .collect();

        info!(
            "Grid initialized: {} levels in [{}, {}], central price {}",
            price_grids.len(),
            settings.bottom_range,
            settings.top_range,
            central_price
        );

        Ok(Self {
            strategy,
            price_grids,
            central_price,
            sorted_buy_grids,
            sorted_sell_grids,
            levels,
            price_index,
        })
    }

    fn calculate_price_grids_and_central_price(
        settings: &GridSettings,
    ) -> (Vec<Decimal>, Decimal) {
        let bottom = settings.bottom_range;
        let top = settings.top_range;
        let num_grids = settings.num_grids as usize;
        let steps = Decimal::from(settings.num_grids - 1);

        match settings.spacing {
            SpacingType::Arithmetic => {
                let step = (top - bottom) / steps;
                let grids = (0..num_grids)
                    .map(|i| bottom + step * Decimal::from(i as u32))
                    .collect();
                let central_price = (top + bottom) / Decimal::TWO;
                (grids, central_price)
            }
            SpacingType::Geometric => {
                // Equal ratio step: the (n-1)-th root of the range ratio.
                let ratio = (top / bottom).powd(Decimal::ONE / steps);
                let mut grids = Vec::with_capacity(num_grids);
                let mut current = bottom;
                for _ in 0..num_grids {
                    grids.push(current);
                    current *= ratio;
                }

                let central_index = grids.len() / 2;
                let central_price = if num_grids % 2 == 0 {
                    (grids[central_index - 1] + grids[central_index]) / Decimal::TWO
                } else {
                    grids[central_index]
                };
                (grids, central_price)
            }
        }
    }

    /// Full ascending price ladder
    pub fn price_grids(&self) -> &[Decimal] {
        &self.price_grids
    }

    /// The pivot price dividing buy-eligible from sell-eligible levels
    pub fn central_price(&self) -> Decimal {
        self.central_price
    }

    /// Grid orders are first placed when the market crosses this price
    pub fn trigger_price(&self) -> Decimal {
        self.central_price
    }

    /// Buy-candidate prices, ascending
    pub fn sorted_buy_grids(&self) -> &[Decimal] {
        &self.sorted_buy_grids
    }

    /// Sell-candidate prices, ascending
    pub fn sorted_sell_grids(&self) -> &[Decimal] {
        &self.sorted_sell_grids
    }

    /// Look up a level by price
    pub fn level(&self, price: Decimal) -> Option<&GridLevel> {
        self.levels.get(&price)
    }

    /// Equal fiat allocation across all levels, converted at current price
    pub fn order_size_for_level(
        &self,
        total_balance_value: Decimal,
        current_price: Decimal,
    ) -> Decimal {
        total_balance_value / Decimal::from(self.levels.len() as u64) / current_price
    }

    /// Initial purchase sizing: target 50% of total portfolio value in
    /// crypto, clamped to the available fiat, converted at current price.
    pub fn initial_order_quantity(
        &self,
        current_fiat_balance: Decimal,
        current_crypto_balance: Decimal,
        current_price: Decimal,
    ) -> Decimal {
        let crypto_value = current_crypto_balance * current_price;
        let total_portfolio_value = current_fiat_balance + crypto_value;
        let target_crypto_allocation = total_portfolio_value / Decimal::TWO;
        let fiat_to_allocate = (target_crypto_allocation - crypto_value)
            .min(current_fiat_balance)
            .max(Decimal::ZERO);
        fiat_to_allocate / current_price
    }

    /// Cross-link two levels. Buy pairing records `target` as the buy level
    /// of `source` and `source` as the sell level of `target`; sell pairing
    /// is symmetric.
    pub fn pair_grid_levels(
        &mut self,
        source_price: Decimal,
        target_price: Decimal,
        pairing_side: OrderSide,
    ) -> Result<()> {
        if !self.levels.contains_key(&source_price) {
            return Err(GridBotError::LevelNotFound(source_price));
        }
        if !self.levels.contains_key(&target_price) {
            return Err(GridBotError::LevelNotFound(target_price));
        }

        match pairing_side {
            OrderSide::Buy => {
                if let Some(source) = self.levels.get_mut(&source_price) {
                    source.paired_buy_level = Some(target_price);
                }
                if let Some(target) = self.levels.get_mut(&target_price) {
                    target.paired_sell_level = Some(source_price);
                }
                info!(
                    "Paired sell grid level {} with buy grid level {}",
                    source_price, target_price
                );
            }
            OrderSide::Sell => {
                if let Some(source) = self.levels.get_mut(&source_price) {
                    source.paired_sell_level = Some(target_price);
                }
                if let Some(target) = self.levels.get_mut(&target_price) {
                    target.paired_buy_level = Some(source_price);
                }
                info!(
                    "Paired buy grid level {} with sell grid level {}",
                    source_price, target_price
                );
            }
        }

        Ok(())
    }

    /// Resolve the sell level paired with the given buy level, per strategy
    pub fn paired_sell_level(&self, buy_price: Decimal) -> Option<Decimal> {
        let result = self.strategy.paired_sell_level(
            buy_price,
            &self.levels,
            &self.sorted_sell_grids,
            &self.price_grids,
            &self.price_index,
        );
        if result.is_none() {
            warn!("No suitable sell level found for buy grid level {buy_price}");
        }
        result
    }

    /// The grid level immediately below the given one, if any
    pub fn grid_level_below(&self, price: Decimal) -> Option<Decimal> {
        let current_index = *self.price_index.get(&price)?;
        if current_index > 0 {
            Some(self.price_grids[current_index - 1])
        } else {
            None
        }
    }

    /// Record a placed order on its level and transition into the waiting
    /// state. The append and the transition happen in one call so a waiting
    /// level always has a matching open order.
    pub fn mark_order_pending(&mut self, price: Decimal, order: &Order) -> Result<()> {
        let level = self
            .levels
            .get_mut(&price)
            .ok_or(GridBotError::LevelNotFound(price))?;
        level.record_pending_order(order.side, order.id.clone());
        info!(
            "{} order {} marked pending at grid level {}",
            order.side, order.id, price
        );
        Ok(())
    }

    /// Transition a level after an order on it completed
    pub fn complete_order(&mut self, price: Decimal, side: OrderSide) {
        self.strategy.complete_order(&mut self.levels, price, side);
    }

    /// Whether an order of the given side may be placed at the price
    pub fn can_place_order(&self, price: Decimal, side: OrderSide) -> bool {
        match self.levels.get(&price) {
            Some(level) => self.strategy.can_place_order(level, side),
            None => {
                warn!("can_place_order queried for unknown grid level {price}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyType;
    use crate::grid::level::GridCycleState;
    use crate::order::OrderType;
    use rust_decimal_macros::dec;

    fn grid_settings(
        strategy: StrategyType,
        spacing: SpacingType,
        num_grids: u32,
        bottom: Decimal,
        top: Decimal,
    ) -> GridSettings {
        GridSettings {
            strategy,
            spacing,
            num_grids,
            bottom_range: bottom,
            top_range: top,
        }
    }

    fn simple_manager() -> GridManager {
        GridManager::new(&grid_settings(
            StrategyType::SimpleGrid,
            SpacingType::Arithmetic,
            20,
            dec!(2850),
            dec!(3100),
        ))
        .unwrap()
    }

    #[test]
    fn test_arithmetic_ladder_spacing_and_central_price() {
        let manager = simple_manager();
        let grids = manager.price_grids();

        assert_eq!(grids.len(), 20);
        assert_eq!(grids[0], dec!(2850));
        assert_eq!(grids[19], dec!(3100));
        assert_eq!(manager.central_price(), dec!(2975));

        let step = grids[1] - grids[0];
        for w in grids.windows(2) {
            assert_eq!(w[1] - w[0], step);
        }
    }

    #[test]
    fn test_geometric_ladder_has_equal_ratio_steps() {
        let manager = GridManager::new(&grid_settings(
            StrategyType::SimpleGrid,
            SpacingType::Geometric,
            11,
            dec!(100),
            dec!(200),
        ))
        .unwrap();
        let grids = manager.price_grids();

        assert_eq!(grids.len(), 11);
        assert_eq!(grids[0], dec!(100));
        // Top of the ladder lands on the configured top within root precision
        assert!((grids[10] - dec!(200)).abs() < dec!(0.001));

        let ratio = grids[1] / grids[0];
        for w in grids.windows(2) {
            assert!((w[1] / w[0] - ratio).abs() < dec!(0.0001));
        }

        // Odd level count: central price is the exact middle level
        assert_eq!(manager.central_price(), grids[5]);
    }

    #[test]
    fn test_geometric_even_count_central_price_is_midpoint() {
        let manager = GridManager::new(&grid_settings(
            StrategyType::SimpleGrid,
            SpacingType::Geometric,
            10,
            dec!(100),
            dec!(200),
        ))
        .unwrap();
        let grids = manager.price_grids();

        let expected = (grids[4] + grids[5]) / dec!(2);
        assert_eq!(manager.central_price(), expected);
    }

    #[test]
    fn test_levels_below_center_start_ready_to_buy() {
        // Range [2850, 3100], 20 levels, central price 2975: every level at
        // or below the center (e.g. the one near 2900) starts ReadyToBuy.
        let manager = simple_manager();

        for &price in manager.price_grids() {
            let level = manager.level(price).unwrap();
            if price <= dec!(2975) {
                assert_eq!(level.cycle_state, GridCycleState::ReadyToBuy);
            } else {
                assert_eq!(level.cycle_state, GridCycleState::ReadyToSell);
            }
        }
    }

    #[test]
    fn test_buy_fill_pairs_with_nearest_available_sell_level_above() {
        let mut manager = simple_manager();
        let buy_price = manager.sorted_buy_grids()[4]; // ~2902, below center

        manager.complete_order(buy_price, OrderSide::Buy);
        assert_eq!(
            manager.level(buy_price).unwrap().cycle_state,
            GridCycleState::ReadyToSell
        );

        let paired = manager.paired_sell_level(buy_price).unwrap();
        assert_eq!(paired, manager.sorted_sell_grids()[0]);
        assert!(paired > buy_price);
        assert_eq!(
            manager.level(paired).unwrap().cycle_state,
            GridCycleState::ReadyToSell
        );
    }

    #[test]
    fn test_order_size_is_equal_fiat_allocation() {
        let manager = GridManager::new(&grid_settings(
            StrategyType::SimpleGrid,
            SpacingType::Arithmetic,
            10,
            dec!(90),
            dec!(110),
        ))
        .unwrap();

        // 10000 fiat across 10 levels at price 100 -> 10 units per level
        let size = manager.order_size_for_level(dec!(10000), dec!(100));
        assert_eq!(size, dec!(10));
    }

    #[test]
    fn test_initial_order_quantity_targets_half_portfolio() {
        let manager = simple_manager();

        // No crypto yet: allocate half of the fiat
        let qty = manager.initial_order_quantity(dec!(10000), dec!(0), dec!(2000));
        assert_eq!(qty, dec!(2.5));

        // Crypto already at half the portfolio value: nothing to buy
        let qty = manager.initial_order_quantity(dec!(10000), dec!(5), dec!(2000));
        assert_eq!(qty, Decimal::ZERO);

        // Over-allocated in crypto: clamp at zero, never negative
        let qty = manager.initial_order_quantity(dec!(1000), dec!(10), dec!(2000));
        assert_eq!(qty, Decimal::ZERO);
    }

    #[test]
    fn test_pair_grid_levels_sets_both_references() {
        let mut manager = simple_manager();
        let source = manager.price_grids()[2];
        let target = manager.price_grids()[5];

        manager
            .pair_grid_levels(source, target, OrderSide::Sell)
            .unwrap();

        assert_eq!(
            manager.level(source).unwrap().paired_sell_level,
            Some(target)
        );
        assert_eq!(manager.level(target).unwrap().paired_buy_level, Some(source));
    }

    #[test]
    fn test_pair_grid_levels_rejects_unknown_price() {
        let mut manager = simple_manager();
        let source = manager.price_grids()[0];

        let result = manager.pair_grid_levels(source, dec!(9999), OrderSide::Buy);
        assert!(matches!(result, Err(GridBotError::LevelNotFound(_))));
    }

    #[test]
    fn test_grid_level_below() {
        let manager = simple_manager();
        let grids = manager.price_grids().to_vec();

        assert_eq!(manager.grid_level_below(grids[5]), Some(grids[4]));
        assert_eq!(manager.grid_level_below(grids[0]), None);
        assert_eq!(manager.grid_level_below(dec!(9999)), None);
    }

    #[test]
    fn test_mark_order_pending_transitions_level() {
        let mut manager = simple_manager();
        let price = manager.sorted_buy_grids()[0];
        let order = Order::new(
            OrderSide::Buy,
            OrderType::Limit,
            "BTC/USDT",
            dec!(1),
            price,
            0,
        );

        manager.mark_order_pending(price, &order).unwrap();

        let level = manager.level(price).unwrap();
        assert_eq!(level.cycle_state, GridCycleState::WaitingForBuyFill);
        assert_eq!(level.buy_orders, vec![order.id.clone()]);
        assert!(!manager.can_place_order(price, OrderSide::Buy));
    }

    #[test]
    fn test_mark_order_pending_unknown_level_fails() {
        let mut manager = simple_manager();
        let order = Order::new(
            OrderSide::Buy,
            OrderType::Limit,
            "BTC/USDT",
            dec!(1),
            dec!(9999),
            0,
        );

        let result = manager.mark_order_pending(dec!(9999), &order);
        assert!(matches!(result, Err(GridBotError::LevelNotFound(_))));
    }

    #[test]
    fn test_hedged_manager_scenario_eight_levels() {
        // 8 levels across [155, 170]: filling a buy at ladder index 3 moves
        // the level to ReadyToBuyOrSell and flips its previously paired sell
        // level (index 4) to ReadyToSell.
        let mut manager = GridManager::new(&grid_settings(
            StrategyType::HedgedGrid,
            SpacingType::Arithmetic,
            8,
            dec!(155),
            dec!(170),
        ))
        .unwrap();
        let grids = manager.price_grids().to_vec();

        let paired = manager.paired_sell_level(grids[3]).unwrap();
        assert_eq!(paired, grids[4]);
        manager
            .pair_grid_levels(grids[4], grids[3], OrderSide::Buy)
            .unwrap();

        manager.complete_order(grids[3], OrderSide::Buy);

        assert_eq!(
            manager.level(grids[3]).unwrap().cycle_state,
            GridCycleState::ReadyToBuyOrSell
        );
        assert_eq!(
            manager.level(grids[4]).unwrap().cycle_state,
            GridCycleState::ReadyToSell
        );
    }
}
