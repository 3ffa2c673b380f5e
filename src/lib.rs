//! Grid Trading Bot Engine
//!
//! Automates a grid-trading strategy: the configured price range is split
//! into discrete levels, buy/sell limit orders are placed at those levels,
//! and paired orders are re-placed as fills occur, while balances and
//! account value are tracked across live, paper and backtest modes.
//!
//! # Architecture
//!
//! - [`config`] - Settings and validation
//! - [`errors`] - Error taxonomy
//! - [`events`] - Fill/cancel event bus with fan-out publish
//! - [`notify`] - Operator notification sinks
//! - [`exchange`] - Exchange collaborator boundary (mockable for testing)
//! - [`grid`] - Grid levels, pairing strategies and the grid manager
//! - [`order`] - Orders, balances, execution, orchestration and simulation
//! - [`runner`] - Session assembly and the backtest / live loops
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use grid_trading_bot::{GridTradingBot, Notifier, Settings};
//!
//! let settings = Settings::load("config/config.json")?;
//! let exchange = Arc::new(MyExchange::connect(&settings)?);
//! let bot = GridTradingBot::new(settings, exchange, Arc::new(Notifier::log_only())).await?;
//! bot.run().await?;
//! ```
//!
//! # Testing
//!
//! [`exchange::mock::MockExchange`] simulates the exchange collaborator
//! without a network connection; backtests run deterministically on a
//! current-thread runtime.

pub mod config;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod grid;
pub mod notify;
pub mod order;
pub mod runner;

// Re-export commonly used types
pub use config::{Settings, SpacingType, StrategyType, TradingMode};
pub use errors::{GridBotError, Result};
pub use events::{Event, EventBus, EventKind};
pub use exchange::{Balances, Candle, Exchange};
pub use grid::{GridCycleState, GridLevel, GridManager, GridStrategy};
pub use notify::{LogNotifier, NotificationKind, NotificationSink, Notifier};
pub use order::{
    BacktestOrderExecutor, BalanceSnapshot, BalanceTracker, FeeCalculator, LiveOrderExecutor,
    Order, OrderBook, OrderExecution, OrderManager, OrderSide, OrderSimulator, OrderStatus,
    OrderType, OrderValidator, SimulatedClock, TriggerKind,
};
pub use runner::{AccountSample, GridTradingBot};
