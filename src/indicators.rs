//! Technical indicators
//!
//! Column primitives return `Vec<Option<f64>>` so a window with insufficient
//! history stays explicitly undefined while computing. [`IndicatorSeries`]
//! resolves those gaps at its output boundary (back-fill from the first
//! computed value, forward-fill after), so downstream logic never reads an
//! undefined field.

use crate::Candle;

/// Exponential moving average with pandas `ewm(span, adjust=False)` semantics:
/// seeded with the first value, `alpha = 2 / (span + 1)`, defined from row 0.
pub fn ema_span(values: &[f64], span: usize) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());
    if values.is_empty() || span == 0 {
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut ema = values[0];
    result.push(ema);

    for &value in &values[1..] {
        ema += alpha * (value - ema);
        result.push(ema);
    }

    result
}

/// Simple rolling mean; `None` until `min_periods` samples are in the window.
pub fn rolling_mean(values: &[f64], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        let start = (i + 1).saturating_sub(window);
        let slice = &values[start..=i];
        if slice.len() < min_periods {
            result.push(None);
        } else {
            result.push(Some(slice.iter().sum::<f64>() / slice.len() as f64));
        }
    }

    result
}

/// True range series; `tr[0]` degrades to `high - low`.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(candles.len());

    for (i, c) in candles.iter().enumerate() {
        let value = if i == 0 {
            c.high - c.low
        } else {
            let prev_close = candles[i - 1].close;
            let hl = c.high - c.low;
            let hc = (c.high - prev_close).abs();
            let lc = (c.low - prev_close).abs();
            hl.max(hc).max(lc)
        };
        tr.push(value);
    }

    tr
}

/// Average true range: simple rolling mean of true range.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    rolling_mean(&true_range(candles), period, period)
}

/// RSI from simple rolling means of close-to-close gains and losses.
///
/// The first delta exists at index 1, so a full window of `period` deltas
/// ends no earlier than index `period`. A zero average loss with positive
/// average gain saturates at 100; a completely flat window stays undefined.
pub fn rsi(close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = close.len();
    let mut out = vec![None; n];
    if n < 2 || period == 0 {
        return out;
    }

    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = close[i] - close[i - 1];
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }

    for i in period..n {
        let start = i + 1 - period;
        let avg_gain = gains[start..=i].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[start..=i].iter().sum::<f64>() / period as f64;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        if avg_gain > 0.0 {
            Some(100.0)
        } else {
            None
        }
    } else {
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

/// ADX-like trend strength, 0-100.
///
/// Directional movement from raw high/low deltas clipped at zero, smoothed by
/// the same simple rolling mean as ATR, DI normalized by ATR, DX rolled again.
/// Undefined until roughly two windows of history exist; never back-filled
/// because only the backtest trend filter consumes it.
pub fn adx(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if n < 2 || period == 0 {
        return out;
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        plus_dm[i] = (candles[i].high - candles[i - 1].high).max(0.0);
        minus_dm[i] = (candles[i - 1].low - candles[i].low).max(0.0);
    }

    let atr_values = atr(candles, period);
    let mut dx: Vec<Option<f64>> = vec![None; n];

    // DM deltas start at index 1, so the first full window ends at `period`
    for i in period..n {
        let start = i + 1 - period;
        let plus_avg = plus_dm[start..=i].iter().sum::<f64>() / period as f64;
        let minus_avg = minus_dm[start..=i].iter().sum::<f64>() / period as f64;

        let atr_val = match atr_values[i] {
            Some(v) if v > 0.0 => v,
            _ => continue,
        };

        let plus_di = 100.0 * plus_avg / atr_val;
        let minus_di = 100.0 * minus_avg / atr_val;
        let sum = plus_di + minus_di;
        if sum > 0.0 {
            dx[i] = Some(100.0 * (plus_di - minus_di).abs() / sum);
        }
    }

    // Roll DX with a strict window over defined values only
    for i in 0..n {
        if i + 1 < 2 * period {
            continue;
        }
        let window = &dx[i + 1 - period..=i];
        if window.iter().all(|v| v.is_some()) {
            let sum: f64 = window.iter().map(|v| v.unwrap_or(0.0)).sum();
            out[i] = Some(sum / period as f64);
        }
    }

    out
}

/// Quantile with linear interpolation between order statistics
/// (pandas' default method). Returns `None` on an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }

    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// One aligned indicator row per candle, fully defined at the boundary
/// except `adx`, which stays optional (backtest-only trend filter).
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub ema50: f64,
    pub ema200: f64,
    pub rsi: f64,
    pub atr: f64,
    pub volume: f64,
    pub vol_mean: f64,
    pub adx: Option<f64>,
}

/// Candles plus their aligned indicator rows.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub candles: Vec<Candle>,
    pub rows: Vec<IndicatorRow>,
}

pub const EMA_FAST_SPAN: usize = 50;
pub const EMA_SLOW_SPAN: usize = 200;
pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const ADX_PERIOD: usize = 14;
pub const VOLUME_WINDOW: usize = 20;

impl IndicatorSeries {
    /// Compute the live indicator set (no ADX).
    pub fn compute(candles: &[Candle]) -> Self {
        Self::build(candles, false)
    }

    /// Compute with the ADX trend-strength extension for the backtest path.
    pub fn compute_with_adx(candles: &[Candle]) -> Self {
        Self::build(candles, true)
    }

    fn build(candles: &[Candle], with_adx: bool) -> Self {
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let ema50 = ema_span(&close, EMA_FAST_SPAN);
        let ema200 = ema_span(&close, EMA_SLOW_SPAN);
        let rsi_col = rsi(&close, RSI_PERIOD);
        let atr_col = atr(candles, ATR_PERIOD);
        let vol_mean = rolling_mean(&volume, VOLUME_WINDOW, 1);
        let adx_col = if with_adx {
            adx(candles, ADX_PERIOD)
        } else {
            vec![None; candles.len()]
        };

        // Boundary fill. Series shorter than a full window have no computed
        // value to back-fill from, so each column carries a partial-window
        // seed derived from the same data.
        let tr = true_range(candles);
        let atr_seed = if tr.is_empty() {
            0.0
        } else {
            tr.iter().sum::<f64>() / tr.len() as f64
        };
        let rsi_seed = rsi_seed(&close);

        let rsi_filled = fill_column(rsi_col, rsi_seed);
        let atr_filled = fill_column(atr_col, atr_seed);
        let vol_mean_filled = fill_column(vol_mean, 0.0);

        let rows = (0..candles.len())
            .map(|i| IndicatorRow {
                ema50: ema50[i],
                ema200: ema200[i],
                rsi: rsi_filled[i],
                atr: atr_filled[i],
                volume: volume[i],
                vol_mean: vol_mean_filled[i],
                adx: adx_col[i],
            })
            .collect();

        IndicatorSeries {
            candles: candles.to_vec(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// RSI over all available deltas, used only when the series is shorter than
/// a full window. A flat or single-candle series reads as neutral 50.
fn rsi_seed(close: &[f64]) -> f64 {
    if close.len() < 2 {
        return 50.0;
    }

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for w in close.windows(2) {
        let delta = w[1] - w[0];
        gain_sum += delta.max(0.0);
        loss_sum += (-delta).max(0.0);
    }
    let n = (close.len() - 1) as f64;
    rsi_from_averages(gain_sum / n, loss_sum / n).unwrap_or(50.0)
}

/// Back-fill from the first computed value, forward-fill after; `seed` covers
/// a column with no computed value at all.
fn fill_column(col: Vec<Option<f64>>, seed: f64) -> Vec<f64> {
    let first = col.iter().flatten().copied().next().unwrap_or(seed);

    let mut out = Vec::with_capacity(col.len());
    let mut last = first;
    for value in col {
        if let Some(v) = value {
            last = v;
        }
        out.push(last);
    }
    out
}
