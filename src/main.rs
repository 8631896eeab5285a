//! Day trading engine - main entry point
//!
//! Subcommands:
//! - backtest: replay a CSV candle file through the strategy
//! - optimize: grid search over risk parameters
//! - live: run the live evaluation loop against the exchange
//! - status: print the trade store summary
//! - download: fetch candle history to CSV

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "daytrader")]
#[command(about = "Signal and position simulation engine for crypto day trading", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a candle file through the strategy
    Backtest {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// CSV candle file (overrides config)
        #[arg(short, long)]
        data: Option<String>,

        /// Stop distance as a multiple of ATR (overrides config)
        #[arg(long)]
        sl_atr_mult: Option<f64>,

        /// Take-profit distance as a multiple of the stop distance
        #[arg(long)]
        risk_reward: Option<f64>,

        /// Export the trade history as CSV
        #[arg(long)]
        export: Option<String>,
    },

    /// Grid search over stop-multiple and risk-reward candidates
    Optimize {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// CSV candle file (overrides config)
        #[arg(short, long)]
        data: Option<String>,

        /// Stop ATR multiples to sweep (comma-separated)
        #[arg(long)]
        atr_mults: Option<String>,

        /// Risk-reward ratios to sweep (comma-separated)
        #[arg(long)]
        risk_rewards: Option<String>,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Run the live evaluation loop
    Live {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Trading pair (overrides config)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Seconds between evaluation cycles (overrides config)
        #[arg(long)]
        poll_seconds: Option<u64>,
    },

    /// Print the trade store summary
    Status {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Fetch candle history from the exchange to CSV
    Download {
        /// Trading pair, e.g. BTC-USDT
        #[arg(short, long, default_value = "BTC-USDT")]
        symbol: String,

        /// Candle interval, e.g. 1h, 15m
        #[arg(short, long, default_value = "1h")]
        interval: String,

        /// Number of candles to fetch
        #[arg(short, long, default_value = "1000")]
        limit: u32,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Grid search: log to file only, keep the console clean for the
        // progress bar and the ranked table
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
        Commands::Live { .. } => ("live", false),
        Commands::Status { .. } => ("status", false),
        Commands::Download { .. } => ("download", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            data,
            sl_atr_mult,
            risk_reward,
            export,
        } => commands::backtest::run(config, data, sl_atr_mult, risk_reward, export),

        Commands::Optimize {
            config,
            data,
            atr_mults,
            risk_rewards,
            top,
        } => commands::optimize::run(config, data, atr_mults, risk_rewards, top),

        Commands::Live {
            config,
            symbol,
            poll_seconds,
        } => commands::live::run(config, symbol, poll_seconds),

        Commands::Status { config } => commands::status::run(config),

        Commands::Download {
            symbol,
            interval,
            limit,
            output,
        } => commands::download::run(symbol, interval, limit, output),
    }
}
