//! Grid search command

use anyhow::{Context, Result};

use daytrader::data::load_csv;
use daytrader::grid::{print_results, run_grid_search, GridSpec};
use daytrader::Config;

pub fn run(
    config: Option<String>,
    data: Option<String>,
    atr_mults: Option<String>,
    risk_rewards: Option<String>,
    top: usize,
) -> Result<()> {
    let config = match config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    let data_path = data.unwrap_or_else(|| config.backtest.data_path.clone());
    let candles = load_csv(&data_path)?;

    let mut spec = GridSpec::default();
    if let Some(list) = atr_mults {
        spec.atr_mults = parse_axis(&list).context("bad --atr-mults")?;
    }
    if let Some(list) = risk_rewards {
        spec.risk_rewards = parse_axis(&list).context("bad --risk-rewards")?;
    }

    let results = run_grid_search(&candles, &spec)?;
    if results.is_empty() {
        anyhow::bail!("every grid combination failed; is the candle file long enough?");
    }

    let shown = results.len().min(top);
    print_results(&results[..shown]);
    Ok(())
}

fn parse_axis(list: &str) -> Result<Vec<f64>> {
    let values = list
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        anyhow::bail!("empty value list");
    }
    Ok(values)
}
