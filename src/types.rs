//! Core data types used across the trading engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// Recoverable engine errors. None of these abort the evaluation loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("candle source returned no data for {0}")]
    DataUnavailable(Symbol),

    #[error("insufficient history: {have} candles, {need} required")]
    InsufficientHistory { have: usize, need: usize },

    #[error("non-positive ATR ({0}) at entry or adjustment")]
    InvalidRisk(f64),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        Ok(())
    }
}

/// Trading pair symbol using Arc<str> for cheap cloning
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LONG" => Some(Side::Long),
            "SHORT" => Some(Side::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal policy output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    NoTrade,
}

impl Signal {
    /// Direction for an entry, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::Long => Some(Side::Long),
            Signal::Short => Some(Side::Short),
            Signal::NoTrade => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
            Signal::NoTrade => "NO_TRADE",
        };
        f.write_str(s)
    }
}

/// Why a position was closed. Set exactly once, at close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    SignalReversal,
    StopLoss,
    TakeProfit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::SignalReversal => "SIGNAL_REVERSAL",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TakeProfit => "TAKE_PROFIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SIGNAL_REVERSAL" => Some(ExitReason::SignalReversal),
            "STOP_LOSS" => Some(ExitReason::StopLoss),
            "TAKE_PROFIT" => Some(ExitReason::TakeProfit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted position record with its entry-time indicator snapshot.
///
/// `exit_price == None` is the sentinel for "still open". Once the exit
/// fields are set the record is never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Option<i64>,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    /// Realized percentage PnL, net of commission; 0 while open
    pub pnl: f64,
    // Indicator snapshot at entry
    pub rsi: f64,
    pub ema50: f64,
    pub ema200: f64,
    pub atr: f64,
    pub volume: f64,
    // Risk levels
    pub stop_loss: f64,
    pub take_profit: f64,
    pub break_even_activated: bool,
    pub trade_time: DateTime<Utc>,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.exit_price.is_none()
    }
}
