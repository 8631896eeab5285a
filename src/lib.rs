//! Signal and position simulation engine for crypto day trading
//!
//! Computes technical indicators over OHLCV candles, turns them into
//! directional signals, simulates ATR-based position management, and adapts
//! its own thresholds from realized performance. The same core drives the
//! offline backtest, the risk-parameter grid search, and the live runner.

pub mod backtest;
pub mod config;
pub mod data;
pub mod exchange;
pub mod grid;
pub mod indicators;
pub mod optimizer;
pub mod params;
pub mod runner;
pub mod signal;
pub mod simulate;
pub mod stats;
pub mod store;
pub mod types;

pub use config::Config;
pub use types::*;
