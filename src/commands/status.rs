//! Trade store summary command

use anyhow::Result;

use daytrader::stats::{build_summary, print_summary};
use daytrader::store::TradeStore;
use daytrader::Config;

pub fn run(config: Option<String>) -> Result<()> {
    let config = match config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    let store = TradeStore::open(&config.storage.db_path)?;
    let summary = build_summary(&store)?;
    print_summary(&summary);
    Ok(())
}
