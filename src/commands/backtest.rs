//! Backtest command

use anyhow::Result;
use tracing::info;

use daytrader::backtest::{export_history, print_report, run_backtest, BacktestParams};
use daytrader::data::load_csv;
use daytrader::simulate::RiskParams;
use daytrader::Config;

pub fn run(
    config: Option<String>,
    data: Option<String>,
    sl_atr_mult: Option<f64>,
    risk_reward: Option<f64>,
    export: Option<String>,
) -> Result<()> {
    let config = match config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    let data_path = data.unwrap_or_else(|| config.backtest.data_path.clone());
    let candles = load_csv(&data_path)?;

    let params = BacktestParams {
        risk: RiskParams {
            sl_atr_mult: sl_atr_mult.unwrap_or(config.backtest.sl_atr_mult),
            risk_reward: risk_reward.unwrap_or(config.backtest.risk_reward),
            trailing: config.backtest.trailing,
            break_even: config.backtest.break_even,
        },
        ..BacktestParams::default()
    };

    info!(
        sl_atr_mult = params.risk.sl_atr_mult,
        risk_reward = params.risk.risk_reward,
        "running backtest over {}",
        data_path
    );

    let report = run_backtest(&candles, &params)?;
    print_report(&report);

    if let Some(export_path) = export {
        export_history(&report, export_path)?;
    }

    Ok(())
}
