//! Grid search over risk parameters
//!
//! Runs the backtest across the cartesian product of stop-multiple and
//! risk-reward candidates in parallel, then ranks combinations by total PnL.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rayon::prelude::*;
use tracing::info;

use crate::backtest::{run_backtest, BacktestParams, BacktestReport};
use crate::params::ParameterSet;
use crate::simulate::RiskParams;
use crate::Candle;

/// Default stop-distance multiples to sweep
pub const DEFAULT_ATR_MULTS: [f64; 3] = [2.0, 2.5, 3.0];

/// Default risk-reward ratios to sweep
pub const DEFAULT_RISK_REWARDS: [f64; 3] = [1.2, 1.5, 2.0];

/// Candidate axes of the sweep
#[derive(Debug, Clone)]
pub struct GridSpec {
    pub atr_mults: Vec<f64>,
    pub risk_rewards: Vec<f64>,
    pub strategy: ParameterSet,
}

impl Default for GridSpec {
    fn default() -> Self {
        GridSpec {
            atr_mults: DEFAULT_ATR_MULTS.to_vec(),
            risk_rewards: DEFAULT_RISK_REWARDS.to_vec(),
            strategy: ParameterSet::default(),
        }
    }
}

impl GridSpec {
    pub fn combinations(&self) -> usize {
        self.atr_mults.len() * self.risk_rewards.len()
    }

    /// All run configurations, in deterministic order.
    fn expand(&self) -> Vec<BacktestParams> {
        self.atr_mults
            .iter()
            .cartesian_product(self.risk_rewards.iter())
            .map(|(&sl_atr_mult, &risk_reward)| BacktestParams {
                risk: RiskParams {
                    sl_atr_mult,
                    risk_reward,
                    ..RiskParams::default()
                },
                strategy: self.strategy.clone(),
            })
            .collect()
    }
}

/// One evaluated combination
#[derive(Debug, Clone)]
pub struct GridResult {
    pub sl_atr_mult: f64,
    pub risk_reward: f64,
    pub report: BacktestReport,
}

/// Sweep the grid over `candles`, best PnL first.
///
/// Combinations that fail (e.g. not enough history) are dropped rather than
/// aborting the sweep; an empty result means every run failed.
pub fn run_grid_search(candles: &[Candle], spec: &GridSpec) -> Result<Vec<GridResult>> {
    let configs = spec.expand();
    info!(
        combinations = configs.len(),
        candles = candles.len(),
        "starting grid search"
    );

    let progress = ProgressBar::new(configs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("#>-"),
    );

    let mut results: Vec<GridResult> = configs
        .par_iter()
        .filter_map(|params| {
            let outcome = run_backtest(candles, params)
                .ok()
                .map(|report| GridResult {
                    sl_atr_mult: params.risk.sl_atr_mult,
                    risk_reward: params.risk.risk_reward,
                    report,
                });
            progress.inc(1);
            outcome
        })
        .collect();

    progress.finish_and_clear();

    results.sort_by(|a, b| {
        b.report
            .pnl
            .partial_cmp(&a.report.pnl)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if let Some(best) = results.first() {
        info!(
            sl_atr_mult = best.sl_atr_mult,
            risk_reward = best.risk_reward,
            pnl = format!("{:+.2}%", best.report.pnl),
            "best combination"
        );
    }

    Ok(results)
}

/// Ranked table to stdout, best first.
pub fn print_results(results: &[GridResult]) {
    println!(
        "{:<6} {:>8} {:>6} {:>10} {:>10} {:>8} {:>10}",
        "rank", "slMult", "rr", "pnl%", "winRate%", "trades", "maxDD%"
    );
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:<6} {:>8.1} {:>6.1} {:>10.2} {:>10.1} {:>8} {:>10.2}",
            rank + 1,
            result.sl_atr_mult,
            result.risk_reward,
            result.report.pnl,
            result.report.win_rate,
            result.report.trades,
            result.report.max_drawdown,
        );
    }
}
