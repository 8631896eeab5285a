//! Live evaluation loop
//!
//! Polls the candle source, manages persisted open positions through the
//! position simulator, opens new positions from the signal policy, and
//! periodically hands realized performance to the adaptive optimizer.
//!
//! Per-cycle order: reversal closes first, then stop management and exits on
//! the surviving positions, then new entries. At most one open position per
//! direction. Fetch or persistence failures skip the cycle instead of
//! aborting the loop.

use anyhow::Result;
use chrono::{Timelike, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::LiveConfig;
use crate::exchange::CandleSource;
use crate::indicators::{IndicatorRow, IndicatorSeries};
use crate::optimizer::AdaptiveOptimizer;
use crate::signal::{generate_signal, is_liquid_hour};
use crate::simulate::{OpenPosition, RiskParams};
use crate::store::TradeStore;
use crate::{ExitReason, Signal, Symbol, TradeRecord};

pub struct Runner<S: CandleSource> {
    config: LiveConfig,
    source: S,
    store: TradeStore,
    optimizer: AdaptiveOptimizer,
    cycle: u64,
}

impl<S: CandleSource> Runner<S> {
    /// Assemble a runner, resuming the persisted parameter set if present.
    pub fn new(config: LiveConfig, source: S, store: TradeStore) -> Result<Self> {
        let optimizer = match store.load_params()? {
            Some(params) => {
                info!(mode = %params.mode, "resuming persisted parameters");
                AdaptiveOptimizer::new(params)
            }
            None => {
                let optimizer = AdaptiveOptimizer::default();
                store.save_params(optimizer.params())?;
                optimizer
            }
        };

        Ok(Runner {
            config,
            source,
            store,
            optimizer,
            cycle: 0,
        })
    }

    pub fn optimizer(&self) -> &AdaptiveOptimizer {
        &self.optimizer
    }

    pub fn store(&self) -> &TradeStore {
        &self.store
    }

    /// Poll until `shutdown` is set.
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let symbol = self.config.symbol();
        info!(
            symbol = %symbol,
            interval = %self.config.interval,
            poll_seconds = self.config.poll_seconds,
            "live runner started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.run_cycle(&symbol) {
                error!("cycle failed: {err:#}");
            }

            // Sleep in short slices so shutdown stays responsive
            let mut remaining = self.config.poll_seconds;
            while remaining > 0 && !shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_secs(1));
                remaining -= 1;
            }
        }

        info!("live runner stopped after {} cycles", self.cycle);
        Ok(())
    }

    /// One fetch-evaluate-manage pass.
    pub fn run_cycle(&mut self, symbol: &Symbol) -> Result<()> {
        self.cycle += 1;

        let candles = match self.source.fetch_candles(
            symbol,
            &self.config.interval,
            self.config.candle_limit,
        ) {
            Ok(candles) => candles,
            Err(err) => {
                warn!("cycle {}: fetch failed, skipping: {err:#}", self.cycle);
                return Ok(());
            }
        };

        let series = IndicatorSeries::compute(&candles);
        if series.len() < 2 {
            warn!("cycle {}: not enough candles ({})", self.cycle, series.len());
            return Ok(());
        }

        let signal = generate_signal(&series.rows, self.optimizer.params());
        let last_row = series.rows[series.len() - 1].clone();
        let last_candle = &series.candles[series.len() - 1];

        self.manage_open_positions(signal, last_candle, last_row.atr)?;

        if is_liquid_hour(Utc::now().hour(), self.optimizer.params()) {
            self.maybe_open(symbol, signal, last_candle.close, &last_row)?;
        }

        if self.cycle % self.config.optimize_every_cycles == 0 {
            self.run_optimizer()?;
        }

        Ok(())
    }

    /// Reversal closes first, then step the survivors.
    fn manage_open_positions(
        &mut self,
        signal: Signal,
        candle: &crate::Candle,
        atr: f64,
    ) -> Result<()> {
        for trade in self.store.open_trades(None)? {
            let id = match trade.id {
                Some(id) => id,
                None => continue,
            };

            let mut position = OpenPosition::resume(
                trade.side,
                trade.entry_price,
                trade.stop_loss,
                trade.take_profit,
                trade.break_even_activated,
                self.risk_params(),
            );

            // Any signal other than the position's own direction closes it,
            // NO_TRADE included; the step machine only runs while aligned
            if signal.side() != Some(trade.side) {
                let exit = position.close_at(candle.close, ExitReason::SignalReversal);
                self.store
                    .close_trade(id, exit.price, exit.reason, exit.pnl_pct, position.break_even_activated)?;
                continue;
            }

            match position.step(candle, atr) {
                Some(exit) => {
                    self.store.close_trade(
                        id,
                        exit.price,
                        exit.reason,
                        exit.pnl_pct,
                        position.break_even_activated,
                    )?;
                }
                None => {
                    // Persist any stop tightening so a restart resumes correctly
                    if position.stop_loss != trade.stop_loss
                        || position.break_even_activated != trade.break_even_activated
                    {
                        self.store.update_levels(
                            id,
                            position.stop_loss,
                            position.take_profit,
                            position.break_even_activated,
                        )?;
                    }
                }
            }
        }

        Ok(())
    }

    fn maybe_open(
        &mut self,
        symbol: &Symbol,
        signal: Signal,
        price: f64,
        row: &IndicatorRow,
    ) -> Result<()> {
        let side = match signal.side() {
            Some(side) => side,
            None => return Ok(()),
        };

        // One open position per direction
        if !self.store.open_trades(Some(side))?.is_empty() {
            return Ok(());
        }

        let position = match OpenPosition::open(side, price, row.atr, self.risk_params()) {
            Some(position) => position,
            None => {
                warn!(atr = row.atr, "entry skipped: no valid stop distance");
                return Ok(());
            }
        };

        let trade = TradeRecord {
            id: None,
            symbol: symbol.clone(),
            side,
            entry_price: price,
            exit_price: None,
            exit_reason: None,
            pnl: 0.0,
            rsi: row.rsi,
            ema50: row.ema50,
            ema200: row.ema200,
            atr: row.atr,
            volume: row.volume,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            break_even_activated: false,
            trade_time: Utc::now(),
        };
        self.store.insert_trade(&trade)?;

        Ok(())
    }

    fn run_optimizer(&mut self) -> Result<()> {
        crate::stats::log_summary(&self.store)?;
        let stats = self.store.performance()?;
        if self.optimizer.evaluate(&stats) {
            self.store.save_params(self.optimizer.params())?;
        }
        Ok(())
    }

    fn risk_params(&self) -> RiskParams {
        RiskParams {
            sl_atr_mult: self.config.sl_atr_mult,
            risk_reward: self.config.tp_atr_mult / self.config.sl_atr_mult,
            trailing: true,
            break_even: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Candle, Side};
    use chrono::Duration;
    use std::cell::RefCell;

    /// Scripted candle source: each call pops the next series.
    struct ScriptedSource {
        batches: RefCell<Vec<Vec<Candle>>>,
    }

    impl ScriptedSource {
        fn new(mut batches: Vec<Vec<Candle>>) -> Self {
            batches.reverse();
            ScriptedSource {
                batches: RefCell::new(batches),
            }
        }
    }

    impl CandleSource for ScriptedSource {
        fn fetch_candles(&self, _: &Symbol, _: &str, _: u32) -> Result<Vec<Candle>> {
            self.batches
                .borrow_mut()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    /// Rising closes with varied wicks, so EMA50 stays above EMA200, RSI is
    /// high, and the ATR distribution has enough spread that the final candle
    /// sits inside the volatility percentile band. The last candle carries a
    /// volume burst to pass the volume filter.
    fn bullish_series(len: usize) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(len as i64);
        (0..len)
            .map(|i| {
                let price = 50.0 + i as f64 * 0.2;
                let wick = 1.0 + (i % 5) as f64 * 0.2;
                Candle {
                    datetime: start + Duration::hours(i as i64),
                    open: price,
                    high: price + wick,
                    low: price - wick,
                    close: price,
                    volume: if i + 1 == len { 5000.0 } else { 1000.0 },
                }
            })
            .collect()
    }

    fn test_config() -> LiveConfig {
        LiveConfig {
            optimize_every_cycles: 1000, // keep the optimizer out of these tests
            ..LiveConfig::default()
        }
    }

    #[test]
    fn test_cycle_opens_long_on_bullish_series() {
        let source = ScriptedSource::new(vec![bullish_series(300)]);
        let store = TradeStore::open_in_memory().unwrap();
        let mut runner = Runner::new(test_config(), source, store).unwrap();

        let symbol = Symbol::new("BTC-USDT");
        runner.run_cycle(&symbol).unwrap();

        let open = runner.store().open_trades(None).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].side, Side::Long);
        // SL below entry, TP above, per direction
        assert!(open[0].stop_loss < open[0].entry_price);
        assert!(open[0].take_profit > open[0].entry_price);
    }

    #[test]
    fn test_no_duplicate_position_per_direction() {
        let source = ScriptedSource::new(vec![bullish_series(300), bullish_series(301)]);
        let store = TradeStore::open_in_memory().unwrap();
        let mut runner = Runner::new(test_config(), source, store).unwrap();

        let symbol = Symbol::new("BTC-USDT");
        runner.run_cycle(&symbol).unwrap();
        runner.run_cycle(&symbol).unwrap();

        assert_eq!(runner.store().open_trades(None).unwrap().len(), 1);
    }

    #[test]
    fn test_fetch_failure_skips_cycle() {
        let source = ScriptedSource::new(vec![]);
        let store = TradeStore::open_in_memory().unwrap();
        let mut runner = Runner::new(test_config(), source, store).unwrap();

        // Source errors; the cycle must swallow it
        runner.run_cycle(&Symbol::new("BTC-USDT")).unwrap();
        assert_eq!(runner.store().total_trades().unwrap(), 0);
    }

    /// Steady climb kept under the volatility-history minimum, so only the
    /// volume and directional filters apply. The last candle carries the
    /// volume burst.
    fn short_climb(len: usize) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(len as i64);
        (0..len)
            .map(|i| {
                let price = 100.0 + i as f64 * 0.5;
                Candle {
                    datetime: start + Duration::hours(i as i64),
                    open: price,
                    high: price + 1.0,
                    low: price - 1.0,
                    close: price,
                    volume: if i + 1 == len { 5000.0 } else { 1000.0 },
                }
            })
            .collect()
    }

    #[test]
    fn test_stop_loss_closes_open_position() {
        // Cycle 1 enters long at 114 with ATR 2: stop 111, target 120.
        // Cycle 2 keeps the signal long while the candle wicks through the
        // stop, so the exit comes from the stop check, not a reversal.
        let mut dip = short_climb(29);
        {
            let last = dip.last_mut().unwrap();
            last.open = 114.5;
            last.high = 115.0;
            last.low = 110.5;
            last.close = 114.5;
        }
        let source = ScriptedSource::new(vec![short_climb(29), dip]);
        let store = TradeStore::open_in_memory().unwrap();
        let mut runner = Runner::new(test_config(), source, store).unwrap();

        let symbol = Symbol::new("BTC-USDT");
        runner.run_cycle(&symbol).unwrap();
        let open = runner.store().open_trades(None).unwrap();
        assert_eq!(open.len(), 1);
        assert!((open[0].entry_price - 114.0).abs() < 1e-9);

        runner.run_cycle(&symbol).unwrap();
        let closed = runner.store().closed_trades().unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLoss));
        assert!(closed[0].pnl < 0.0);
        // The signal is still long, so a fresh entry follows the stop-out
        assert_eq!(runner.store().open_trades(None).unwrap().len(), 1);
    }

    #[test]
    fn test_no_trade_signal_closes_position() {
        // Second window has no volume burst, so the policy goes quiet. A
        // quiet signal differs from the position's direction and must close
        // it as a reversal rather than leave it running.
        let mut quiet = bullish_series(301);
        quiet.last_mut().unwrap().volume = 1000.0;
        let source = ScriptedSource::new(vec![bullish_series(300), quiet]);
        let store = TradeStore::open_in_memory().unwrap();
        let mut runner = Runner::new(test_config(), source, store).unwrap();

        let symbol = Symbol::new("BTC-USDT");
        runner.run_cycle(&symbol).unwrap();
        assert_eq!(runner.store().open_trades(None).unwrap().len(), 1);

        runner.run_cycle(&symbol).unwrap();
        assert!(runner.store().open_trades(None).unwrap().is_empty());
        let closed = runner.store().closed_trades().unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::SignalReversal));
    }

    #[test]
    fn test_persisted_params_resumed() {
        let store = TradeStore::open_in_memory().unwrap();
        let params = crate::params::ParameterSet::defaults_for(crate::params::Mode::Moderate);
        store.save_params(&params).unwrap();

        let source = ScriptedSource::new(vec![]);
        let runner = Runner::new(test_config(), source, store).unwrap();
        assert_eq!(runner.optimizer().mode(), crate::params::Mode::Moderate);
    }
}
