//! Position simulator
//!
//! Owns the lifecycle of one directional position: entry, break-even and
//! trailing-stop adjustment, exit evaluation, and PnL accounting. The same
//! state machine drives both the offline backtest and the live runner.
//!
//! Per-step order is fixed and load-bearing: break-even first, trailing only
//! while break-even is inactive (so the stop can never fall back below the
//! entry once protected), exits last with stop-loss winning ties against
//! take-profit.

use crate::{Candle, ExitReason, Side};

/// Round-trip commission in percentage points, charged on every close
pub const ROUND_TRIP_COMMISSION_PCT: f64 = 0.04;

/// Risk configuration for a simulated position
#[derive(Debug, Clone, Copy)]
pub struct RiskParams {
    /// Stop distance as a multiple of entry ATR
    pub sl_atr_mult: f64,
    /// Take-profit distance as a multiple of the stop distance
    pub risk_reward: f64,
    pub trailing: bool,
    pub break_even: bool,
}

impl Default for RiskParams {
    fn default() -> Self {
        RiskParams {
            sl_atr_mult: 2.5,
            risk_reward: 1.5,
            trailing: true,
            break_even: true,
        }
    }
}

/// Terminal outcome of a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionExit {
    pub price: f64,
    pub reason: ExitReason,
    /// Percentage PnL net of commission
    pub pnl_pct: f64,
}

/// One open position stepped candle by candle until exit.
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub break_even_activated: bool,
    risk: RiskParams,
    /// Favorable excursion needed before the stop moves to entry
    be_trigger: f64,
}

impl OpenPosition {
    /// Open a position at `entry` with ATR-derived risk levels.
    /// Returns `None` when ATR is non-positive: no valid stop distance exists.
    pub fn open(side: Side, entry: f64, atr: f64, risk: RiskParams) -> Option<Self> {
        if atr <= 0.0 {
            return None;
        }

        let sl_dist = atr * risk.sl_atr_mult;
        let tp_dist = sl_dist * risk.risk_reward;

        let (stop_loss, take_profit) = match side {
            Side::Long => (entry - sl_dist, entry + tp_dist),
            Side::Short => (entry + sl_dist, entry - tp_dist),
        };

        Some(OpenPosition {
            side,
            entry_price: entry,
            stop_loss,
            take_profit,
            break_even_activated: false,
            risk,
            be_trigger: tp_dist * 0.5,
        })
    }

    /// Rebuild a position from persisted levels, e.g. a trade reloaded from
    /// the store after a restart. The break-even trigger is re-derived from
    /// the stored take-profit distance.
    pub fn resume(
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        break_even_activated: bool,
        risk: RiskParams,
    ) -> Self {
        OpenPosition {
            side,
            entry_price,
            stop_loss,
            take_profit,
            break_even_activated,
            risk,
            be_trigger: (take_profit - entry_price).abs() * 0.5,
        }
    }

    /// Advance one candle: adjust the stop, then evaluate exits.
    ///
    /// A non-positive `atr` skips the break-even/trailing adjustments for
    /// this step but exits are still evaluated against the current levels.
    pub fn step(&mut self, candle: &Candle, atr: f64) -> Option<PositionExit> {
        if atr > 0.0 {
            self.check_break_even(candle);
            self.check_trailing(candle, atr);
        }
        self.check_exit(candle)
    }

    fn check_break_even(&mut self, candle: &Candle) {
        if !self.risk.break_even || self.break_even_activated {
            return;
        }

        let excursion = match self.side {
            Side::Long => candle.high - self.entry_price,
            Side::Short => self.entry_price - candle.low,
        };

        if excursion >= self.be_trigger {
            self.stop_loss = self.entry_price;
            self.break_even_activated = true;
        }
    }

    fn check_trailing(&mut self, candle: &Candle, atr: f64) {
        // Break-even owns the stop once active; trailing must never move it
        if !self.risk.trailing || self.break_even_activated {
            return;
        }

        let sl_dist = atr * self.risk.sl_atr_mult;
        match self.side {
            Side::Long => {
                let candidate = candle.close - sl_dist;
                if candidate > self.stop_loss {
                    self.stop_loss = candidate;
                }
            }
            Side::Short => {
                let candidate = candle.close + sl_dist;
                if candidate < self.stop_loss {
                    self.stop_loss = candidate;
                }
            }
        }
    }

    /// Stop-loss checked before take-profit: when a candle spans both levels
    /// the conservative assumption is the stop filled first.
    fn check_exit(&self, candle: &Candle) -> Option<PositionExit> {
        match self.side {
            Side::Long => {
                if candle.low <= self.stop_loss {
                    Some(self.close_at(self.stop_loss, ExitReason::StopLoss))
                } else if candle.high >= self.take_profit {
                    Some(self.close_at(self.take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
            Side::Short => {
                if candle.high >= self.stop_loss {
                    Some(self.close_at(self.stop_loss, ExitReason::StopLoss))
                } else if candle.low <= self.take_profit {
                    Some(self.close_at(self.take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
        }
    }

    /// Close at an arbitrary price, e.g. on signal reversal.
    pub fn close_at(&self, price: f64, reason: ExitReason) -> PositionExit {
        PositionExit {
            price,
            reason,
            pnl_pct: net_pnl_pct(self.side, self.entry_price, price),
        }
    }
}

/// Realized percentage PnL, sign by direction, net of commission.
pub fn net_pnl_pct(side: Side, entry: f64, exit: f64) -> f64 {
    let gross = match side {
        Side::Long => (exit - entry) / entry * 100.0,
        Side::Short => (entry - exit) / entry * 100.0,
    };
    gross - ROUND_TRIP_COMMISSION_PCT
}

/// Running PnL, peak, and drawdown accounting across closed trades.
#[derive(Debug, Clone, Default)]
pub struct PnlTracker {
    pub pnl: f64,
    pub peak: f64,
    pub max_drawdown: f64,
    pub wins: usize,
    pub losses: usize,
}

impl PnlTracker {
    pub fn record(&mut self, trade_pnl: f64) {
        self.pnl += trade_pnl;
        if trade_pnl > 0.0 {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.update_drawdown();
    }

    /// Refresh peak and drawdown; also called per step so flat stretches
    /// after a peak register.
    pub fn update_drawdown(&mut self) {
        if self.pnl > self.peak {
            self.peak = self.pnl;
        }
        let drawdown = self.peak - self.pnl;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
    }

    pub fn trades(&self) -> usize {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades() == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades() as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            datetime: Utc::now(),
            open: close,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    fn long_at_100() -> OpenPosition {
        // ATR 2.0, slMult 1.5, rr 2.0: stop 97, target 106, BE trigger 103
        OpenPosition::open(
            Side::Long,
            100.0,
            2.0,
            RiskParams {
                sl_atr_mult: 1.5,
                risk_reward: 2.0,
                trailing: true,
                break_even: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_entry_levels_by_direction() {
        let long = long_at_100();
        assert_relative_eq!(long.stop_loss, 97.0);
        assert_relative_eq!(long.take_profit, 106.0);

        let short = OpenPosition::open(
            Side::Short,
            100.0,
            2.0,
            RiskParams {
                sl_atr_mult: 1.5,
                risk_reward: 2.0,
                trailing: true,
                break_even: true,
            },
        )
        .unwrap();
        assert_relative_eq!(short.stop_loss, 103.0);
        assert_relative_eq!(short.take_profit, 94.0);
    }

    #[test]
    fn test_entry_rejected_on_non_positive_atr() {
        assert!(OpenPosition::open(Side::Long, 100.0, 0.0, RiskParams::default()).is_none());
        assert!(OpenPosition::open(Side::Long, 100.0, -1.0, RiskParams::default()).is_none());
    }

    #[test]
    fn test_break_even_moves_stop_to_entry() {
        let mut pos = long_at_100();
        // High reaches half the target distance: 100 + 3 = 103
        let exit = pos.step(&candle(103.0, 101.0, 102.0), 2.0);
        assert!(exit.is_none());
        assert!(pos.break_even_activated);
        assert_relative_eq!(pos.stop_loss, 100.0);
    }

    #[test]
    fn test_stop_never_loosens_after_break_even() {
        let mut pos = long_at_100();
        pos.step(&candle(103.0, 101.0, 102.0), 2.0);
        assert_relative_eq!(pos.stop_loss, 100.0);

        // Close drops: a trailing candidate of 100.5 - 3 = 97.5 would loosen
        // the stop below entry, and must be suppressed
        let exit = pos.step(&candle(101.0, 100.5, 100.5), 2.0);
        assert!(exit.is_none());
        assert_relative_eq!(pos.stop_loss, 100.0);
    }

    #[test]
    fn test_trailing_tightens_long_stop_only() {
        let mut pos = long_at_100();
        // Rise without hitting the BE trigger: 102.9 high, close 102
        let exit = pos.step(&candle(102.9, 101.0, 102.0), 2.0);
        assert!(exit.is_none());
        assert!(!pos.break_even_activated);
        assert_relative_eq!(pos.stop_loss, 99.0); // 102 - 3

        // Pullback must not lower the stop
        pos.step(&candle(102.0, 101.5, 101.5), 2.0);
        assert_relative_eq!(pos.stop_loss, 99.0);
    }

    #[test]
    fn test_trailing_tightens_short_stop_only() {
        let mut pos = OpenPosition::open(
            Side::Short,
            100.0,
            2.0,
            RiskParams {
                sl_atr_mult: 1.5,
                risk_reward: 2.0,
                trailing: true,
                break_even: false,
            },
        )
        .unwrap();
        assert_relative_eq!(pos.stop_loss, 103.0);

        pos.step(&candle(99.0, 98.0, 98.5), 2.0);
        assert_relative_eq!(pos.stop_loss, 101.5); // 98.5 + 3

        pos.step(&candle(99.5, 99.0, 99.5), 2.0);
        assert_relative_eq!(pos.stop_loss, 101.5);
    }

    #[test]
    fn test_zero_atr_step_skips_adjustments_but_checks_exits() {
        let mut pos = long_at_100();
        // Would trigger break-even were ATR valid; must not adjust
        let exit = pos.step(&candle(103.0, 101.0, 102.0), 0.0);
        assert!(exit.is_none());
        assert!(!pos.break_even_activated);
        assert_relative_eq!(pos.stop_loss, 97.0);

        // Exit at the untouched stop still fires
        let exit = pos.step(&candle(98.0, 96.0, 96.5), 0.0).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_stop_checked_before_target_on_spanning_candle() {
        // Break-even off, or the spanning high would move the stop to entry
        // before the exit check and mask the tie-break under test
        let mut pos = OpenPosition::open(
            Side::Long,
            100.0,
            2.0,
            RiskParams {
                sl_atr_mult: 1.5,
                risk_reward: 2.0,
                trailing: false,
                break_even: false,
            },
        )
        .unwrap();
        // One candle spans both 97 and 106
        let exit = pos.step(&candle(107.0, 96.0, 100.0), 2.0).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_relative_eq!(exit.price, 97.0);
    }

    #[test]
    fn test_take_profit_exit_pnl() {
        let mut pos = long_at_100();
        let exit = pos.step(&candle(106.5, 104.0, 106.0), 2.0).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_relative_eq!(exit.price, 106.0);
        assert_relative_eq!(exit.pnl_pct, 6.0 - ROUND_TRIP_COMMISSION_PCT);
    }

    #[test]
    fn test_pnl_sign_matches_direction() {
        // Long profits when exit > entry
        assert!(net_pnl_pct(Side::Long, 100.0, 101.0) > 0.0);
        assert!(net_pnl_pct(Side::Long, 100.0, 99.0) < 0.0);
        // Short profits when exit < entry
        assert!(net_pnl_pct(Side::Short, 100.0, 99.0) > 0.0);
        assert!(net_pnl_pct(Side::Short, 100.0, 101.0) < 0.0);
        // A flat round trip still pays commission
        assert_relative_eq!(
            net_pnl_pct(Side::Long, 100.0, 100.0),
            -ROUND_TRIP_COMMISSION_PCT
        );
    }

    #[test]
    fn test_signal_reversal_close() {
        let pos = long_at_100();
        let exit = pos.close_at(101.0, ExitReason::SignalReversal);
        assert_eq!(exit.reason, ExitReason::SignalReversal);
        assert_relative_eq!(exit.pnl_pct, 1.0 - ROUND_TRIP_COMMISSION_PCT);
    }

    #[test]
    fn test_drawdown_tracks_peak_to_trough() {
        let mut tracker = PnlTracker::default();
        tracker.record(2.0);
        tracker.record(1.0); // peak 3.0
        tracker.record(-2.5); // pnl 0.5, drawdown 2.5
        assert_relative_eq!(tracker.pnl, 0.5);
        assert_relative_eq!(tracker.max_drawdown, 2.5);
        assert_eq!(tracker.wins, 2);
        assert_eq!(tracker.losses, 1);
    }
}
