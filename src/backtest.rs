//! Backtesting engine
//!
//! Replays a candle series through the signal policy and position simulator
//! with a trend-strength overlay the live path does not use: entries require
//! ADX above threshold and the close on the right side of the slow EMA.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info};

use crate::indicators::IndicatorSeries;
use crate::params::ParameterSet;
use crate::signal::generate_signal;
use crate::simulate::{OpenPosition, PnlTracker, RiskParams};
use crate::{Candle, EngineError, ExitReason, Side};

/// Candles consumed as warmup before the first entry is considered
pub const WARMUP_CANDLES: usize = 200;

/// Minimum ADX for the backtest trend filter
pub const ADX_TREND_MIN: f64 = 20.0;

/// One backtest run configuration
#[derive(Debug, Clone)]
pub struct BacktestParams {
    pub risk: RiskParams,
    pub strategy: ParameterSet,
}

impl Default for BacktestParams {
    fn default() -> Self {
        BacktestParams {
            risk: RiskParams::default(),
            strategy: ParameterSet::default(),
        }
    }
}

/// One closed trade in the replay, with the running totals at close time
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub closed_at: DateTime<Utc>,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub pnl_pct: f64,
    pub cumulative_pnl: f64,
    pub break_even_activated: bool,
}

/// Aggregate result of one backtest run
#[derive(Debug, Clone, Default)]
pub struct BacktestReport {
    pub pnl: f64,
    pub win_rate: f64,
    pub trades: usize,
    pub max_drawdown: f64,
    pub history: Vec<HistoryRow>,
}

/// Replay `candles` under the given parameters.
///
/// At most one position is open at a time. The position steps on every
/// candle after entry; a new entry is only considered on a flat book.
pub fn run_backtest(candles: &[Candle], params: &BacktestParams) -> Result<BacktestReport> {
    if candles.len() <= WARMUP_CANDLES {
        return Err(EngineError::InsufficientHistory {
            have: candles.len(),
            need: WARMUP_CANDLES + 1,
        }
        .into());
    }

    let series = IndicatorSeries::compute_with_adx(candles);
    let mut tracker = PnlTracker::default();
    let mut history = Vec::new();
    let mut position: Option<OpenPosition> = None;

    for i in WARMUP_CANDLES..series.len() {
        let candle = &series.candles[i];
        let row = &series.rows[i];

        if let Some(pos) = position.as_mut() {
            if let Some(exit) = pos.step(candle, row.atr) {
                tracker.record(exit.pnl_pct);
                history.push(HistoryRow {
                    closed_at: candle.datetime,
                    side: pos.side,
                    entry_price: pos.entry_price,
                    exit_price: exit.price,
                    exit_reason: exit.reason,
                    pnl_pct: exit.pnl_pct,
                    cumulative_pnl: tracker.pnl,
                    break_even_activated: pos.break_even_activated,
                });
                position = None;
            }
            tracker.update_drawdown();
            continue;
        }

        let signal = generate_signal(&series.rows[..=i], &params.strategy);
        let side = match signal.side() {
            Some(side) => side,
            None => continue,
        };

        if !trend_confirms(side, candle.close, row.ema200, row.adx) {
            continue;
        }

        position = OpenPosition::open(side, candle.close, row.atr, params.risk);
        if position.is_none() {
            debug!(atr = row.atr, "entry skipped: no valid stop distance");
        }
    }

    let report = BacktestReport {
        pnl: tracker.pnl,
        win_rate: tracker.win_rate(),
        trades: tracker.trades(),
        max_drawdown: tracker.max_drawdown,
        history,
    };

    info!(
        trades = report.trades,
        pnl = format!("{:+.2}%", report.pnl),
        win_rate = format!("{:.1}%", report.win_rate),
        max_drawdown = format!("{:.2}%", report.max_drawdown),
        "backtest complete"
    );

    Ok(report)
}

/// Trend overlay: entries only with the trend both strong and aligned.
/// An undefined ADX reads as no trend.
fn trend_confirms(side: Side, close: f64, ema200: f64, adx: Option<f64>) -> bool {
    let strong = matches!(adx, Some(v) if v > ADX_TREND_MIN);
    if !strong {
        return false;
    }
    match side {
        Side::Long => close > ema200,
        Side::Short => close < ema200,
    }
}

/// Export the trade history as CSV.
pub fn export_history<P: AsRef<Path>>(report: &BacktestReport, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record([
        "closed_at",
        "side",
        "entry_price",
        "exit_price",
        "exit_reason",
        "pnl_pct",
        "cumulative_pnl",
        "break_even",
    ])?;

    for row in &report.history {
        writer.write_record([
            row.closed_at.to_rfc3339(),
            row.side.as_str().to_string(),
            format!("{:.8}", row.entry_price),
            format!("{:.8}", row.exit_price),
            row.exit_reason.as_str().to_string(),
            format!("{:.4}", row.pnl_pct),
            format!("{:.4}", row.cumulative_pnl),
            (row.break_even_activated as u8).to_string(),
        ])?;
    }

    writer.flush()?;
    info!("trade history exported to {}", path.display());
    Ok(())
}

/// Print a human-readable summary to stdout.
pub fn print_report(report: &BacktestReport) {
    println!("Backtest results");
    println!("  trades:       {}", report.trades);
    println!("  total PnL:    {:+.2}%", report.pnl);
    println!("  win rate:     {:.1}%", report.win_rate);
    println!("  max drawdown: {:.2}%", report.max_drawdown);

    let by_reason = report.history.iter().fold(
        std::collections::HashMap::<ExitReason, usize>::new(),
        |mut acc, row| {
            *acc.entry(row.exit_reason).or_default() += 1;
            acc
        },
    );
    for (reason, count) in by_reason {
        println!("  {:>16}: {}", reason.as_str(), count);
    }
}
