//! Performance summary over the trade store

use anyhow::Result;
use tracing::info;

use crate::params::ParameterSet;
use crate::store::TradeStore;

/// Snapshot of everything the status report prints
#[derive(Debug, Clone)]
pub struct Summary {
    pub total_trades: i64,
    pub open_trades: usize,
    pub closed_trades: u32,
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub total_pnl: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: Option<f64>,
    pub worst_trade: Option<f64>,
    pub exit_reasons: Vec<(String, i64)>,
    pub params: Option<ParameterSet>,
}

pub fn build_summary(store: &TradeStore) -> Result<Summary> {
    let perf = store.performance()?;
    let closed = store.closed_trades()?;

    let total_pnl: f64 = closed.iter().map(|t| t.pnl).sum();
    let winners: Vec<f64> = closed.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
    let losers: Vec<f64> = closed.iter().map(|t| t.pnl).filter(|p| *p <= 0.0).collect();

    let gross_profit: f64 = winners.iter().sum();
    let gross_loss: f64 = losers.iter().map(|p| p.abs()).sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_win = if winners.is_empty() {
        0.0
    } else {
        gross_profit / winners.len() as f64
    };
    let avg_loss = if losers.is_empty() {
        0.0
    } else {
        gross_loss / losers.len() as f64
    };

    let best_trade = closed.iter().map(|t| t.pnl).fold(None, |acc: Option<f64>, p| {
        Some(acc.map_or(p, |a| a.max(p)))
    });
    let worst_trade = closed.iter().map(|t| t.pnl).fold(None, |acc: Option<f64>, p| {
        Some(acc.map_or(p, |a| a.min(p)))
    });

    Ok(Summary {
        total_trades: store.total_trades()?,
        open_trades: store.open_trades(None)?.len(),
        closed_trades: perf.closed_trades,
        win_rate: perf.win_rate,
        avg_pnl: perf.avg_pnl,
        total_pnl,
        profit_factor,
        avg_win,
        avg_loss,
        best_trade,
        worst_trade,
        exit_reasons: store.exit_reason_counts()?,
        params: store.load_params()?,
    })
}

/// Periodic one-line summary for the live runner's log.
pub fn log_summary(store: &TradeStore) -> Result<()> {
    let summary = build_summary(store)?;
    info!(
        open = summary.open_trades,
        closed = summary.closed_trades,
        win_rate = format!("{:.1}%", summary.win_rate),
        total_pnl = format!("{:+.4}%", summary.total_pnl),
        profit_factor = format!("{:.2}", summary.profit_factor),
        "performance summary"
    );
    Ok(())
}

pub fn print_summary(summary: &Summary) {
    println!("Trading summary");
    println!("  total trades:  {}", summary.total_trades);
    println!("  open:          {}", summary.open_trades);
    println!("  closed:        {}", summary.closed_trades);

    if summary.closed_trades > 0 {
        println!("  win rate:      {:.1}%", summary.win_rate);
        println!("  avg PnL:       {:+.4}%", summary.avg_pnl);
        println!("  total PnL:     {:+.4}%", summary.total_pnl);
        println!("  profit factor: {:.2}", summary.profit_factor);
        println!(
            "  avg win/loss:  {:+.4}% / -{:.4}%",
            summary.avg_win, summary.avg_loss
        );
        if let (Some(best), Some(worst)) = (summary.best_trade, summary.worst_trade) {
            println!("  best / worst:  {:+.4}% / {:+.4}%", best, worst);
        }
        for (reason, count) in &summary.exit_reasons {
            println!("  {:>16}: {}", reason, count);
        }
    }

    match &summary.params {
        Some(params) => println!("  mode:          {}", params.mode),
        None => println!("  mode:          (no persisted parameters)"),
    }
}
