//! Engine configuration
//!
//! The engine consumes an already-parsed [`Settings`] structure. A loader
//! built on the `config` crate is provided for file + environment sources
//! (environment variables use the `GRIDBOT_` prefix with `__` separators,
//! e.g. `GRIDBOT_TRADING__MODE=paper_trading`).

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::{GridBotError, Result};

/// Trading session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    /// Replay historical candles, simulate fills locally
    Backtest,
    /// Live market data, simulated execution
    PaperTrading,
    /// Live market data and execution
    Live,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Backtest => write!(f, "backtest"),
            TradingMode::PaperTrading => write!(f, "paper_trading"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

/// Grid pairing strategy selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    SimpleGrid,
    HedgedGrid,
}

/// Grid spacing type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingType {
    /// Equal absolute step between levels
    Arithmetic,
    /// Equal ratio step between levels
    Geometric,
}

/// Trading pair and session settings
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSettings {
    pub mode: TradingMode,
    /// Base currency, e.g. "BTC"
    pub base_currency: String,
    /// Quote currency, e.g. "USDT"
    pub quote_currency: String,
    /// Ticker poll interval for live/paper mode, seconds
    #[serde(default = "default_ticker_interval")]
    pub ticker_interval_secs: u64,
}

impl TradingSettings {
    /// Exchange pair symbol, e.g. "BTC/USDT"
    pub fn pair(&self) -> String {
        format!("{}/{}", self.base_currency, self.quote_currency)
    }
}

fn default_ticker_interval() -> u64 {
    3
}

/// Grid geometry settings
#[derive(Debug, Clone, Deserialize)]
pub struct GridSettings {
    pub strategy: StrategyType,
    #[serde(default = "default_spacing")]
    pub spacing: SpacingType,
    /// Number of grid levels (price points)
    pub num_grids: u32,
    /// Lower bound of the price range
    #[serde(with = "rust_decimal::serde::float")]
    pub bottom_range: Decimal,
    /// Upper bound of the price range
    #[serde(with = "rust_decimal::serde::float")]
    pub top_range: Decimal,
}

fn default_spacing() -> SpacingType {
    SpacingType::Arithmetic
}

/// Fee settings
#[derive(Debug, Clone, Deserialize)]
pub struct FeeSettings {
    /// Proportional taker fee, e.g. 0.001 for 10 bps
    #[serde(with = "rust_decimal::serde::float")]
    pub trading_fee: Decimal,
}

/// Starting balances for backtest and paper trading; live mode fetches
/// balances from the exchange instead.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BalanceSettings {
    #[serde(default, with = "rust_decimal::serde::float")]
    pub initial_fiat: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub initial_crypto: Decimal,
}

/// Optional take-profit / stop-loss thresholds
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RiskSettings {
    /// Sell everything when price rises to this level
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub take_profit: Option<Decimal>,
    /// Sell everything when price drops to this level
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub stop_loss: Option<Decimal>,
}

/// Live order execution knobs
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSettings {
    /// Maximum placement attempts for market orders
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts, milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Total slippage allowance spread across retries, e.g. 0.01 for 1%
    #[serde(default = "default_max_slippage", with = "rust_decimal::serde::float")]
    pub max_slippage: Decimal,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_slippage() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_slippage: default_max_slippage(),
        }
    }
}

/// Backtest data window
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PeriodSettings {
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

fn default_timeframe() -> String {
    "1h".to_string()
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub trading: TradingSettings,
    pub grid: GridSettings,
    pub fees: FeeSettings,
    #[serde(default)]
    pub balances: BalanceSettings,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub period: PeriodSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Load settings from a configuration file with environment overrides
    pub fn load(config_path: &str) -> Result<Self> {
        let raw = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(Environment::with_prefix("GRIDBOT").separator("__"))
            .build()
            .map_err(|e| GridBotError::InvalidConfig(e.to_string()))?;

        let settings: Settings = raw
            .try_deserialize()
            .map_err(|e| GridBotError::InvalidConfig(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration shape. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.trading.base_currency.is_empty() || self.trading.quote_currency.is_empty() {
            return Err(GridBotError::InvalidConfig(
                "base and quote currencies must be set".into(),
            ));
        }

        if self.grid.bottom_range <= Decimal::ZERO {
            return Err(GridBotError::InvalidConfig(
                "bottom_range must be positive".into(),
            ));
        }

        if self.grid.bottom_range >= self.grid.top_range {
            return Err(GridBotError::InvalidConfig(
                "bottom_range must be less than top_range".into(),
            ));
        }

        if self.grid.num_grids < 2 {
            return Err(GridBotError::InvalidConfig(
                "num_grids must be at least 2".into(),
            ));
        }

        if self.fees.trading_fee < Decimal::ZERO || self.fees.trading_fee >= Decimal::ONE {
            return Err(GridBotError::InvalidConfig(
                "trading_fee must be in [0, 1)".into(),
            ));
        }

        if self.balances.initial_fiat < Decimal::ZERO
            || self.balances.initial_crypto < Decimal::ZERO
        {
            return Err(GridBotError::InvalidConfig(
                "initial balances cannot be negative".into(),
            ));
        }

        if let (Some(tp), Some(sl)) = (self.risk.take_profit, self.risk.stop_loss) {
            if sl >= tp {
                return Err(GridBotError::InvalidConfig(
                    "stop_loss threshold must be below take_profit threshold".into(),
                ));
            }
        }

        if self.execution.max_retries == 0 {
            return Err(GridBotError::InvalidConfig(
                "max_retries must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
