//! Grid trading session runner
//!
//! Wires the engine components together and drives one of two loops:
//! a deterministic backtest replay over historical candles, or a live/paper
//! ticker poll. Both share the trigger-crossing gate, the take-profit /
//! stop-loss evaluation and the account-value history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::config::{Settings, TradingMode};
use crate::errors::Result;
use crate::events::EventBus;
use crate::exchange::Exchange;
use crate::grid::GridManager;
use crate::notify::Notifier;
use crate::order::{
    BacktestOrderExecutor, BalanceTracker, FeeCalculator, LiveOrderExecutor, OrderBook,
    OrderExecution, OrderManager, OrderSimulator, OrderValidator, SimulatedClock, TriggerKind,
};

/// One account-value observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSample {
    pub timestamp: i64,
    pub account_value: Decimal,
    pub price: Decimal,
}

/// Assembled grid trading session
pub struct GridTradingBot {
    settings: Settings,
    pair: String,
    exchange: Arc<dyn Exchange>,
    events: Arc<EventBus>,
    grid: Arc<Mutex<GridManager>>,
    balance: Arc<BalanceTracker>,
    book: Arc<OrderBook>,
    orders: Arc<OrderManager>,
    clock: Option<SimulatedClock>,
    shutdown: Arc<AtomicBool>,
    history: Mutex<Vec<AccountSample>>,
}

impl GridTradingBot {
    /// Build and wire all components for the configured trading mode
    pub async fn new(
        settings: Settings,
        exchange: Arc<dyn Exchange>,
        notifier: Arc<Notifier>,
    ) -> Result<Self> {
        settings.validate()?;
        let pair = settings.trading.pair();

        let events = Arc::new(EventBus::new());
        let fee_calculator = FeeCalculator::new(settings.fees.trading_fee);

        let balance = Arc::new(match settings.trading.mode {
            TradingMode::Live => {
                BalanceTracker::from_exchange(
                    fee_calculator,
                    exchange.as_ref(),
                    &settings.trading.base_currency,
                    &settings.trading.quote_currency,
                )
                .await?
            }
            TradingMode::Backtest | TradingMode::PaperTrading => BalanceTracker::new(
                fee_calculator,
                settings.balances.initial_fiat,
                settings.balances.initial_crypto,
            ),
        });
        // The tracker subscribes before the order manager so a fill credits
        // balances before any paired-order reservation reads them.
        balance.subscribe(&events).await;

        let grid = Arc::new(Mutex::new(GridManager::new(&settings.grid)?));
        let book = Arc::new(OrderBook::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let (execution, clock, simulator): (
            Arc<dyn OrderExecution>,
            Option<SimulatedClock>,
            Option<Arc<OrderSimulator>>,
        ) = match settings.trading.mode {
            TradingMode::Backtest => {
                let clock = SimulatedClock::new();
                let simulator = Arc::new(OrderSimulator::new(
                    Arc::clone(&book),
                    Arc::clone(&grid),
                    Arc::clone(&events),
                ));
                (
                    Arc::new(BacktestOrderExecutor::new(clock.clone())),
                    Some(clock),
                    Some(simulator),
                )
            }
            TradingMode::PaperTrading | TradingMode::Live => {
                let executor = LiveOrderExecutor::new(Arc::clone(&exchange), &settings.execution)
                    .with_shutdown_flag(Arc::clone(&shutdown));
                (Arc::new(executor), None, None)
            }
        };

        let orders = Arc::new(OrderManager::new(
            Arc::clone(&grid),
            OrderValidator::default(),
            Arc::clone(&balance),
            Arc::clone(&book),
            Arc::clone(&events),
            execution,
            notifier,
            simulator,
            settings.trading.mode,
            pair.clone(),
        ));
        orders.subscribe().await;

        Ok(Self {
            settings,
            pair,
            exchange,
            events,
            grid,
            balance,
            book,
            orders,
            clock,
            shutdown,
            history: Mutex::new(Vec::new()),
        })
    }

    /// Run the session until completion (backtest) or stop (live/paper)
    pub async fn run(&self) -> Result<()> {
        match self.settings.trading.mode {
            TradingMode::Backtest => self.run_backtest().await,
            TradingMode::PaperTrading | TradingMode::Live => self.run_live_or_paper().await,
        }
    }

    /// Request a cooperative stop; observed at loop and retry boundaries
    pub fn request_stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!("Stop requested");
    }

    async fn run_backtest(&self) -> Result<()> {
        let candles = self
            .exchange
            .fetch_ohlcv(
                &self.pair,
                &self.settings.period.timeframe,
                &self.settings.period.start_date,
                &self.settings.period.end_date,
            )
            .await?;

        if candles.is_empty() {
            error!("No data available for backtesting");
            return Ok(());
        }

        let trigger_price = self.grid.lock().await.trigger_price();
        info!("Starting backtest simulation");

        let mut grid_orders_initialized = false;
        let mut last_price: Option<Decimal> = None;

        for candle in &candles {
            if let Some(clock) = &self.clock {
                clock.set(candle.timestamp);
            }

            grid_orders_initialized = self
                .initialize_grid_orders_once(
                    candle.close,
                    trigger_price,
                    grid_orders_initialized,
                    last_price,
                )
                .await;

            if !grid_orders_initialized {
                self.record_sample(candle.timestamp, candle.close).await;
                last_price = Some(candle.close);
                continue;
            }

            self.orders
                .simulate_order_fills(candle.high, candle.low, candle.timestamp)
                .await?;

            if self.check_take_profit_stop_loss(candle.close).await {
                break;
            }

            self.record_sample(candle.timestamp, candle.close).await;
            last_price = Some(candle.close);
        }

        info!("Ending backtest simulation");
        Ok(())
    }

    async fn run_live_or_paper(&self) -> Result<()> {
        info!("Starting {} trading", self.settings.trading.mode);
        let trigger_price = self.grid.lock().await.trigger_price();
        let mut ticker = interval(Duration::from_secs(
            self.settings.trading.ticker_interval_secs,
        ));

        let mut grid_orders_initialized = false;
        let mut last_price: Option<Decimal> = None;

        loop {
            ticker.tick().await;

            if self.shutdown.load(Ordering::SeqCst) {
                info!("Trading stopped; halting price updates");
                break;
            }

            let current_price = match self.exchange.get_current_price(&self.pair).await {
                Ok(price) => price,
                Err(e) => {
                    error!("Error during ticker update: {}", e);
                    continue;
                }
            };

            self.record_sample(Utc::now().timestamp_millis(), current_price)
                .await;

            grid_orders_initialized = self
                .initialize_grid_orders_once(
                    current_price,
                    trigger_price,
                    grid_orders_initialized,
                    last_price,
                )
                .await;

            if !grid_orders_initialized {
                last_price = Some(current_price);
                continue;
            }

            if self.check_take_profit_stop_loss(current_price).await {
                break;
            }

            last_price = Some(current_price);
        }

        info!("Exiting live/paper trading loop");
        Ok(())
    }

    /// Place the initial purchase and the grid ladder once the price series
    /// crosses the trigger price upward (or touches it exactly).
    async fn initialize_grid_orders_once(
        &self,
        current_price: Decimal,
        trigger_price: Decimal,
        grid_orders_initialized: bool,
        last_price: Option<Decimal>,
    ) -> bool {
        if grid_orders_initialized {
            return true;
        }

        let Some(last_price) = last_price else {
            debug!("No previous price recorded yet. Waiting for the next price update");
            return false;
        };

        if (last_price <= trigger_price && trigger_price <= current_price)
            || last_price == trigger_price
        {
            info!(
                "Current price {} reached trigger price {}. Will perform initial purchase",
                current_price, trigger_price
            );
            self.orders.perform_initial_purchase(current_price).await;
            info!("Initial purchase done, will initialize grid orders");
            self.orders.initialize_grid_orders(current_price).await;
            return true;
        }

        debug!(
            "Current price {} did not cross trigger price {}. Last price: {}",
            current_price, trigger_price, last_price
        );
        false
    }

    /// Evaluate take-profit / stop-loss; on trigger, liquidate and stop
    async fn check_take_profit_stop_loss(&self, current_price: Decimal) -> bool {
        if self.balance.crypto_balance().await == Decimal::ZERO {
            debug!("No crypto balance available; skipping TP/SL checks");
            return false;
        }

        if let Some(threshold) = self.settings.risk.take_profit {
            if current_price >= threshold {
                info!("Take-profit triggered at {}. Executing TP order", current_price);
                self.orders
                    .execute_take_profit_or_stop_loss_order(current_price, TriggerKind::TakeProfit)
                    .await;
                self.request_stop();
                return true;
            }
        }

        if let Some(threshold) = self.settings.risk.stop_loss {
            if current_price <= threshold {
                info!("Stop-loss triggered at {}. Executing SL order", current_price);
                self.orders
                    .execute_take_profit_or_stop_loss_order(current_price, TriggerKind::StopLoss)
                    .await;
                self.request_stop();
                return true;
            }
        }

        false
    }

    async fn record_sample(&self, timestamp: i64, price: Decimal) {
        let account_value = self.balance.total_balance_value(price).await;
        self.history.lock().await.push(AccountSample {
            timestamp,
            account_value,
            price,
        });
    }

    /// Account-value series recorded per bar (backtest) or tick (live/paper)
    pub async fn account_history(&self) -> Vec<AccountSample> {
        self.history.lock().await.clone()
    }

    pub fn order_manager(&self) -> &Arc<OrderManager> {
        &self.orders
    }

    pub fn balance_tracker(&self) -> &Arc<BalanceTracker> {
        &self.balance
    }

    pub fn order_book(&self) -> &Arc<OrderBook> {
        &self.book
    }

    pub fn grid_manager(&self) -> &Arc<Mutex<GridManager>> {
        &self.grid
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BalanceSettings, ExecutionSettings, FeeSettings, GridSettings, LogSettings,
        PeriodSettings, RiskSettings, SpacingType, StrategyType, TradingSettings,
    };
    use crate::exchange::{mock::MockExchange, Candle};
    use rust_decimal_macros::dec;

    fn settings(mode: TradingMode) -> Settings {
        Settings {
            trading: TradingSettings {
                mode,
                base_currency: "BTC".into(),
                quote_currency: "USDT".into(),
                ticker_interval_secs: 3,
            },
            grid: GridSettings {
                strategy: StrategyType::SimpleGrid,
                spacing: SpacingType::Arithmetic,
                num_grids: 5,
                bottom_range: dec!(90),
                top_range: dec!(110),
            },
            fees: FeeSettings {
                trading_fee: dec!(0.001),
            },
            balances: BalanceSettings {
                initial_fiat: dec!(10000),
                initial_crypto: Decimal::ZERO,
            },
            risk: RiskSettings::default(),
            execution: ExecutionSettings {
                max_retries: 3,
                retry_delay_ms: 1,
                max_slippage: dec!(0.01),
            },
            period: PeriodSettings::default(),
            log: LogSettings::default(),
        }
    }

    fn candle(timestamp: i64, low: Decimal, high: Decimal, close: Decimal) -> Candle {
        Candle {
            timestamp,
            open: close,
            high,
            low,
            close,
            volume: dec!(1),
        }
    }

    fn trending_candles() -> Vec<Candle> {
        vec![
            // Below the 100 trigger: nothing happens yet.
            candle(0, dec!(94), dec!(96), dec!(95)),
            // Crosses the trigger: initial purchase + ladder placement.
            candle(1, dec!(100.5), dec!(102), dec!(101)),
            // Dips through the buy levels at 95 and 100.
            candle(2, dec!(94), dec!(99), dec!(95)),
            // Rallies through the sell level at 105.
            candle(3, dec!(103), dec!(106), dec!(105.5)),
        ]
    }

    async fn backtest_bot(candles: Vec<Candle>, risk: RiskSettings) -> GridTradingBot {
        let exchange = Arc::new(MockExchange::new(dec!(95)));
        exchange.set_candles(candles).await;
        let mut settings = settings(TradingMode::Backtest);
        settings.risk = risk;
        GridTradingBot::new(settings, exchange, Arc::new(Notifier::log_only()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_backtest_waits_for_trigger_crossing() {
        let bot = backtest_bot(
            vec![
                candle(0, dec!(93), dec!(95), dec!(94)),
                candle(1, dec!(92), dec!(94), dec!(93)),
            ],
            RiskSettings::default(),
        )
        .await;

        bot.run().await.unwrap();

        // Never crossed 100: no orders at all, flat account history.
        assert!(bot.order_book().is_empty().await);
        let history = bot.account_history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].account_value, dec!(10000));
    }

    #[tokio::test]
    async fn test_backtest_full_cycle_maintains_invariants() {
        let bot = backtest_bot(trending_candles(), RiskSettings::default()).await;

        bot.run().await.unwrap();

        // The ladder went out and fills happened on both sides.
        assert!(bot.order_book().len().await > 4);
        let history = bot.account_history().await;
        assert_eq!(history.len(), 4);

        // Balance invariants hold at the end of the run.
        let snapshot = bot.balance_tracker().snapshot().await;
        assert!(snapshot.balance >= Decimal::ZERO);
        assert!(snapshot.crypto_balance >= Decimal::ZERO);
        assert!(snapshot.reserved_fiat >= Decimal::ZERO);
        assert!(snapshot.reserved_crypto >= Decimal::ZERO);
        assert!(snapshot.total_fees > Decimal::ZERO);

        // Adjusted balances recombine into the reported total value.
        let price = dec!(105.5);
        let total = bot.balance_tracker().total_balance_value(price).await;
        let recombined = bot.balance_tracker().adjusted_fiat_balance().await
            + bot.balance_tracker().adjusted_crypto_balance().await * price;
        assert_eq!(total, recombined);
    }

    #[tokio::test]
    async fn test_backtest_take_profit_stops_the_session() {
        let mut candles = trending_candles();
        candles.push(candle(4, dec!(114), dec!(121), dec!(120)));
        candles.push(candle(5, dec!(121), dec!(123), dec!(122)));

        let bot = backtest_bot(
            candles,
            RiskSettings {
                take_profit: Some(dec!(115)),
                stop_loss: None,
            },
        )
        .await;

        bot.run().await.unwrap();

        // The TP bar breaks the loop before recording, and the last bar is
        // never processed.
        let history = bot.account_history().await;
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_backtest_with_no_candles_is_a_noop() {
        let bot = backtest_bot(Vec::new(), RiskSettings::default()).await;
        bot.run().await.unwrap();
        assert!(bot.order_book().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paper_loop_initializes_after_trigger_cross() {
        let exchange = Arc::new(MockExchange::new(dec!(95)));
        let bot = Arc::new(
            GridTradingBot::new(
                settings(TradingMode::PaperTrading),
                Arc::clone(&exchange) as Arc<dyn Exchange>,
                Arc::new(Notifier::log_only()),
            )
            .await
            .unwrap(),
        );

        let runner = Arc::clone(&bot);
        let handle = tokio::spawn(async move { runner.run().await });

        // First tick sees 95 (below trigger), recording the last price.
        tokio::time::sleep(Duration::from_secs(4)).await;
        exchange.set_current_price(dec!(101)).await;
        // Second tick crosses the trigger and places the ladder.
        tokio::time::sleep(Duration::from_secs(4)).await;

        bot.request_stop();
        tokio::time::sleep(Duration::from_secs(4)).await;
        handle.await.unwrap().unwrap();

        // One market buy (initial purchase) plus resting grid orders.
        assert!(exchange.placed_order_count().await > 1);
        assert!(bot.balance_tracker().crypto_balance().await > Decimal::ZERO);
        assert!(bot.account_history().await.len() >= 2);
    }
}
