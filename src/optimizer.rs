//! Adaptive parameter optimizer
//!
//! Maintains the mode state machine (learning -> moderate -> conservative,
//! one-directional) and the bounded threshold-nudging heuristic driven by
//! realized performance. Persistence is the caller's job: evaluate the
//! transition, then save the resulting parameter set if anything changed.

use tracing::info;

use crate::params::{Mode, ParameterSet};

/// Realized performance statistics over closed trades
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerfStats {
    pub closed_trades: u32,
    /// Percentage of closed trades with positive PnL
    pub win_rate: f64,
    /// Mean percentage PnL per closed trade
    pub avg_pnl: f64,
}

/// Mode state machine plus the current parameter set.
#[derive(Debug, Clone)]
pub struct AdaptiveOptimizer {
    params: ParameterSet,
}

impl Default for AdaptiveOptimizer {
    fn default() -> Self {
        AdaptiveOptimizer::from_mode(Mode::Learning)
    }
}

impl AdaptiveOptimizer {
    pub fn new(params: ParameterSet) -> Self {
        AdaptiveOptimizer { params }
    }

    pub fn from_mode(mode: Mode) -> Self {
        Self::new(ParameterSet::defaults_for(mode))
    }

    pub fn mode(&self) -> Mode {
        self.params.mode
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Re-evaluate the mode against realized performance.
    ///
    /// Returns true when the parameter set changed (mode transition or
    /// learning-phase adjustment) and should be persisted. At conservative
    /// there is nothing left to do, so repeated invocations are no-ops.
    pub fn evaluate(&mut self, stats: &PerfStats) -> bool {
        if stats.closed_trades < self.params.min_trades_for_analysis {
            return false;
        }

        match self.params.mode {
            Mode::Learning => {
                // Transitions and threshold nudges both wait for a 30-trade
                // sample; below that the learning defaults stand
                if stats.closed_trades < 30 {
                    return false;
                }
                if stats.win_rate > 55.0 && stats.avg_pnl > 0.0 {
                    self.transition(Mode::Moderate, stats);
                    true
                } else {
                    let adjusted =
                        adjust_learning_params(&self.params, stats.win_rate, stats.avg_pnl);
                    if adjusted != self.params {
                        info!(
                            win_rate = stats.win_rate,
                            avg_pnl = stats.avg_pnl,
                            "learning thresholds adjusted"
                        );
                        self.params = adjusted;
                        true
                    } else {
                        false
                    }
                }
            }
            Mode::Moderate => {
                if stats.closed_trades >= 100 && stats.win_rate > 60.0 && stats.avg_pnl > 0.5 {
                    self.transition(Mode::Conservative, stats);
                    true
                } else {
                    false
                }
            }
            Mode::Conservative => false,
        }
    }

    fn transition(&mut self, to: Mode, stats: &PerfStats) {
        info!(
            from = %self.params.mode,
            to = %to,
            trades = stats.closed_trades,
            win_rate = stats.win_rate,
            "strategy mode transition"
        );
        self.params = ParameterSet::defaults_for(to);
    }
}

/// Bounded learning-phase threshold nudges, pure and side-effect free.
///
/// Low win rate pulls both RSI thresholds toward the conservative side of
/// neutral; high win rate loosens them; strongly negative average PnL bumps
/// the volume multiplier, capped at 1.15.
pub fn adjust_learning_params(params: &ParameterSet, win_rate: f64, avg_pnl: f64) -> ParameterSet {
    let mut adjusted = params.clone();

    if win_rate < 40.0 {
        adjusted.rsi_long_threshold = adjusted.rsi_long_threshold.max(51.0);
        adjusted.rsi_short_threshold = adjusted.rsi_short_threshold.min(49.0);
    } else if win_rate > 70.0 {
        adjusted.rsi_long_threshold = adjusted.rsi_long_threshold.min(49.0);
        adjusted.rsi_short_threshold = adjusted.rsi_short_threshold.max(51.0);
    }

    if avg_pnl < -0.1 {
        adjusted.volume_multiplier = (adjusted.volume_multiplier + 0.05).min(1.15);
    }

    adjusted
}
