//! Strategy parameter sets and their mode progression
//!
//! A [`ParameterSet`] is the fixed-field bundle of thresholds the signal
//! policy reads. Modes form a one-way ladder by demonstrated performance:
//! learning collects data around the clock with loose filters, moderate and
//! conservative progressively tighten them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strategy mode. Transitions only move down the list, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Learning,
    Moderate,
    Conservative,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Learning => "learning",
            Mode::Moderate => "moderate",
            Mode::Conservative => "conservative",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("ATR percentile bounds must satisfy 0 <= {min} < {max} <= 1")]
    InvalidPercentiles { min: f64, max: f64 },

    #[error("volume multiplier ({0}) must be positive")]
    NonPositiveVolumeMultiplier(f64),
}

/// The thresholds consulted by the signal policy.
///
/// Exactly one set is current at any time; only the adaptive optimizer
/// mutates it. Unknown keys in persisted form are rejected at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSet {
    pub rsi_long_threshold: f64,
    pub rsi_short_threshold: f64,
    pub volume_multiplier: f64,
    pub atr_min_percentile: f64,
    pub atr_max_percentile: f64,
    pub trade_all_hours: bool,
    pub min_trades_for_analysis: u32,
    pub mode: Mode,
}

impl ParameterSet {
    /// Default thresholds bound to each mode.
    pub fn defaults_for(mode: Mode) -> Self {
        match mode {
            // Relaxed so the learning phase generates enough signals
            Mode::Learning => ParameterSet {
                rsi_long_threshold: 50.0,
                rsi_short_threshold: 50.0,
                volume_multiplier: 1.01,
                atr_min_percentile: 0.05,
                atr_max_percentile: 0.95,
                trade_all_hours: true,
                min_trades_for_analysis: 20,
                mode,
            },
            Mode::Moderate => ParameterSet {
                rsi_long_threshold: 51.0,
                rsi_short_threshold: 49.0,
                volume_multiplier: 1.05,
                atr_min_percentile: 0.10,
                atr_max_percentile: 0.90,
                trade_all_hours: false,
                min_trades_for_analysis: 50,
                mode,
            },
            Mode::Conservative => ParameterSet {
                rsi_long_threshold: 52.0,
                rsi_short_threshold: 48.0,
                volume_multiplier: 1.10,
                atr_min_percentile: 0.15,
                atr_max_percentile: 0.85,
                trade_all_hours: false,
                min_trades_for_analysis: 100,
                mode,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(0.0..=1.0).contains(&self.atr_min_percentile)
            || !(0.0..=1.0).contains(&self.atr_max_percentile)
            || self.atr_min_percentile >= self.atr_max_percentile
        {
            return Err(ParamsError::InvalidPercentiles {
                min: self.atr_min_percentile,
                max: self.atr_max_percentile,
            });
        }

        if self.volume_multiplier <= 0.0 {
            return Err(ParamsError::NonPositiveVolumeMultiplier(
                self.volume_multiplier,
            ));
        }

        Ok(())
    }
}

impl Default for ParameterSet {
    fn default() -> Self {
        ParameterSet::defaults_for(Mode::Learning)
    }
}
