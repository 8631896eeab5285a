//! Configuration management
//!
//! JSON configuration file with sensible defaults for every section, plus
//! environment overrides for deployment-specific values (database path).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::Symbol;

/// Environment variable overriding the database location
pub const DB_PATH_ENV: &str = "DAYTRADER_DB";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a JSON file with env overrides applied.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("failed to parse config JSON")?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults with env overrides, for running without a config file.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            self.storage.db_path = db_path;
        }
    }
}

/// Live runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    pub symbol: String,
    pub interval: String,
    /// Candles fetched per evaluation cycle
    pub candle_limit: u32,
    /// Seconds between evaluation cycles
    pub poll_seconds: u64,
    /// Cycles between optimizer evaluations
    pub optimize_every_cycles: u64,
    pub sl_atr_mult: f64,
    pub tp_atr_mult: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            symbol: "BTC-USDT".to_string(),
            interval: "1h".to_string(),
            candle_limit: 500,
            poll_seconds: 60,
            optimize_every_cycles: 60,
            sl_atr_mult: 1.5,
            tp_atr_mult: 3.0,
        }
    }
}

impl LiveConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub data_path: String,
    pub results_dir: String,
    pub sl_atr_mult: f64,
    pub risk_reward: f64,
    pub trailing: bool,
    pub break_even: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_path: "data/BTC-USDT_1h.csv".to_string(),
            results_dir: "results".to_string(),
            sl_atr_mult: 2.5,
            risk_reward: 1.5,
            trailing: true,
            break_even: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            db_path: "daytrader.db".to_string(),
        }
    }
}
