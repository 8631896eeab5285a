//! Candle history download command

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use daytrader::data::save_csv;
use daytrader::exchange::{BingXClient, CandleSource};
use daytrader::Symbol;

pub fn run(symbol: String, interval: String, limit: u32, output: String) -> Result<()> {
    let client = BingXClient::new()?;
    let symbol = Symbol::new(&symbol);

    let candles = client.fetch_candles(&symbol, &interval, limit)?;
    info!("fetched {} candles for {}", candles.len(), symbol);

    let filename = format!("{}_{}.csv", symbol, interval);
    let path = PathBuf::from(output).join(filename);
    save_csv(&candles, &path)?;

    println!("saved {} candles to {}", candles.len(), path.display());
    Ok(())
}
