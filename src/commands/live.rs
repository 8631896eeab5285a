//! Live runner command

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use daytrader::exchange::BingXClient;
use daytrader::runner::Runner;
use daytrader::store::TradeStore;
use daytrader::Config;

pub fn run(config: Option<String>, symbol: Option<String>, poll_seconds: Option<u64>) -> Result<()> {
    let mut config = match config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    if let Some(symbol) = symbol {
        config.live.symbol = symbol;
    }
    if let Some(secs) = poll_seconds {
        config.live.poll_seconds = secs;
    }

    let store = TradeStore::open(&config.storage.db_path)?;
    let source = BingXClient::new()?;
    let mut runner = Runner::new(config.live, source, store)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone())?;

    runner.run(shutdown)
}

/// Translate Ctrl+C into the shutdown flag the synchronous loop polls.
fn spawn_signal_handler(shutdown: Arc<AtomicBool>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::spawn(move || {
        rt.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
        });
        shutdown.store(true, Ordering::Relaxed);
    });

    Ok(())
}
