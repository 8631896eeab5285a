//! Signal policy
//!
//! Pure mapping from the latest indicator row plus the current parameter set
//! to a trade direction. Filters run in a fixed order: volume, volatility
//! percentile, then the EMA-cross / RSI directional rule.

use crate::indicators::{quantile, IndicatorRow};
use crate::params::ParameterSet;
use crate::Signal;

/// Minimum rows of ATR history before the volatility percentile filter applies
pub const VOLATILITY_HISTORY_MIN: usize = 30;

/// Liquid-hours gate: open UTC hour band, inclusive
const LIQUID_HOUR_START: u32 = 12;
const LIQUID_HOUR_END: u32 = 20;

/// Whether the engine should be consulted at this UTC hour.
///
/// Always true in around-the-clock mode; otherwise only during the fixed
/// high-liquidity band. Gates new entries, not the policy itself.
pub fn is_liquid_hour(hour: u32, params: &ParameterSet) -> bool {
    if params.trade_all_hours {
        return true;
    }
    (LIQUID_HOUR_START..=LIQUID_HOUR_END).contains(&hour)
}

/// Evaluate the signal policy over an indicator row prefix.
///
/// The last row is the decision row; the full prefix supplies the observed
/// ATR distribution for the volatility filter.
pub fn generate_signal(rows: &[IndicatorRow], params: &ParameterSet) -> Signal {
    if rows.len() < 2 {
        return Signal::NoTrade;
    }

    let last = match rows.last() {
        Some(row) => row,
        None => return Signal::NoTrade,
    };

    if !row_is_defined(last) {
        return Signal::NoTrade;
    }

    // 1. Volume filter
    if last.vol_mean <= 0.0 || last.volume <= last.vol_mean * params.volume_multiplier {
        return Signal::NoTrade;
    }

    // 2. Volatility filter, once enough ATR history is observed
    if rows.len() >= VOLATILITY_HISTORY_MIN {
        let atr_history: Vec<f64> = rows.iter().map(|r| r.atr).collect();
        let atr_min = quantile(&atr_history, params.atr_min_percentile);
        let atr_max = quantile(&atr_history, params.atr_max_percentile);

        if let (Some(atr_min), Some(atr_max)) = (atr_min, atr_max) {
            if last.atr < atr_min || last.atr > atr_max {
                return Signal::NoTrade;
            }
        }
    }

    // 3. Directional rule
    if last.ema50 > last.ema200 && last.rsi > params.rsi_long_threshold {
        return Signal::Long;
    }

    if last.ema50 < last.ema200 && last.rsi < params.rsi_short_threshold {
        return Signal::Short;
    }

    Signal::NoTrade
}

fn row_is_defined(row: &IndicatorRow) -> bool {
    row.ema50.is_finite()
        && row.ema200.is_finite()
        && row.rsi.is_finite()
        && row.atr.is_finite()
        && row.volume.is_finite()
        && row.vol_mean.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Mode;

    fn row(ema50: f64, ema200: f64, rsi: f64, atr: f64, volume: f64, vol_mean: f64) -> IndicatorRow {
        IndicatorRow {
            ema50,
            ema200,
            rsi,
            atr,
            volume,
            vol_mean,
            adx: None,
        }
    }

    fn bullish_row() -> IndicatorRow {
        row(105.0, 100.0, 65.0, 2.0, 1200.0, 1000.0)
    }

    #[test]
    fn test_no_trade_with_fewer_than_two_rows() {
        let params = ParameterSet::default();
        assert_eq!(generate_signal(&[], &params), Signal::NoTrade);
        assert_eq!(generate_signal(&[bullish_row()], &params), Signal::NoTrade);
    }

    #[test]
    fn test_no_trade_on_undefined_field() {
        let params = ParameterSet::default();
        let mut bad = bullish_row();
        bad.rsi = f64::NAN;
        let rows = vec![bullish_row(), bad];
        assert_eq!(generate_signal(&rows, &params), Signal::NoTrade);
    }

    #[test]
    fn test_volume_filter_rejects_thin_volume() {
        let params = ParameterSet::default();
        let mut thin = bullish_row();
        thin.volume = 1000.0; // not above vol_mean * multiplier
        let rows = vec![bullish_row(), thin];
        assert_eq!(generate_signal(&rows, &params), Signal::NoTrade);
    }

    #[test]
    fn test_volume_filter_rejects_non_positive_baseline() {
        let params = ParameterSet::default();
        let mut bad = bullish_row();
        bad.vol_mean = 0.0;
        let rows = vec![bullish_row(), bad];
        assert_eq!(generate_signal(&rows, &params), Signal::NoTrade);
    }

    #[test]
    fn test_long_signal_when_trend_and_momentum_align() {
        let params = ParameterSet::default();
        let rows = vec![bullish_row(), bullish_row()];
        assert_eq!(generate_signal(&rows, &params), Signal::Long);
    }

    #[test]
    fn test_short_signal_when_trend_and_momentum_align() {
        let params = ParameterSet::default();
        let bearish = row(95.0, 100.0, 35.0, 2.0, 1200.0, 1000.0);
        let rows = vec![bearish.clone(), bearish];
        assert_eq!(generate_signal(&rows, &params), Signal::Short);
    }

    #[test]
    fn test_volatility_filter_skipped_below_history_minimum() {
        // ATR far outside any percentile band, but only 2 rows of history
        let params = ParameterSet::default();
        let mut spiky = bullish_row();
        spiky.atr = 500.0;
        let rows = vec![bullish_row(), spiky];
        assert_eq!(generate_signal(&rows, &params), Signal::Long);
    }

    #[test]
    fn test_volatility_filter_rejects_outlier_atr() {
        let params = ParameterSet::defaults_for(Mode::Conservative);
        let mut rows: Vec<IndicatorRow> = (0..VOLATILITY_HISTORY_MIN)
            .map(|_| bullish_row())
            .collect();
        // Current ATR well above the observed distribution's upper percentile
        rows.last_mut().unwrap().atr = 50.0;
        assert_eq!(generate_signal(&rows, &params), Signal::NoTrade);
    }

    #[test]
    fn test_liquid_hours_band() {
        let mut params = ParameterSet::default();
        params.trade_all_hours = false;
        assert!(!is_liquid_hour(11, &params));
        assert!(is_liquid_hour(12, &params));
        assert!(is_liquid_hour(20, &params));
        assert!(!is_liquid_hour(21, &params));

        params.trade_all_hours = true;
        assert!(is_liquid_hour(3, &params));
    }
}
