//! End-to-end tests driving the engine through its public API

use approx::assert_relative_eq;
use chrono::{Duration, Utc};

use daytrader::backtest::{run_backtest, BacktestParams};
use daytrader::grid::{run_grid_search, GridSpec};
use daytrader::indicators::IndicatorSeries;
use daytrader::optimizer::AdaptiveOptimizer;
use daytrader::params::{Mode, ParameterSet};
use daytrader::signal::generate_signal;
use daytrader::simulate::{OpenPosition, RiskParams, ROUND_TRIP_COMMISSION_PCT};
use daytrader::store::TradeStore;
use daytrader::{Candle, ExitReason, Side, Signal, Symbol, TradeRecord};

fn candle(i: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    Candle {
        datetime: Utc::now() + Duration::hours(i as i64),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Sideways chop, then a sustained uptrend with varied wicks and a volume
/// burst toward the end.
fn uptrend_after_chop(len: usize) -> Vec<Candle> {
    (0..len)
        .map(|i| {
            let price = if i < 250 {
                100.0 + (i as f64 * 0.9).sin() * 0.4
            } else {
                100.0 + (i - 250) as f64 * 0.3
            };
            let wick = 0.5 + (i % 4) as f64 * 0.15;
            // The final candle carries its own burst; a sustained plateau
            // would raise the rolling baseline and mute the volume filter
            let volume = if i + 1 == len {
                5000.0
            } else if i > 270 {
                1200.0
            } else {
                1000.0
            };
            candle(i, price, price + wick, price - wick, price, volume)
        })
        .collect()
}

#[test]
fn short_series_still_yields_defined_indicators() {
    // Fewer candles than any indicator window
    let candles: Vec<Candle> = (0..6)
        .map(|i| candle(i, 100.0, 100.6, 99.4, 100.0 + i as f64 * 0.1, 500.0))
        .collect();

    let series = IndicatorSeries::compute(&candles);
    assert_eq!(series.len(), 6);
    for row in &series.rows {
        assert!(row.ema50.is_finite());
        assert!(row.ema200.is_finite());
        assert!(row.rsi.is_finite());
        assert!(row.atr > 0.0);
        assert!(row.vol_mean > 0.0);
    }

    // Filled rows evaluate cleanly: flat volume fails the volume filter
    let params = ParameterSet::defaults_for(Mode::Learning);
    assert_eq!(generate_signal(&series.rows, &params), Signal::NoTrade);
}

#[test]
fn signal_fires_long_in_confirmed_uptrend() {
    let candles = uptrend_after_chop(400);
    let series = IndicatorSeries::compute(&candles);
    let params = ParameterSet::defaults_for(Mode::Learning);

    assert_eq!(generate_signal(&series.rows, &params), Signal::Long);
}

#[test]
fn break_even_then_target_full_walkthrough() {
    // Entry 100, ATR 2, slMult 1.5, rr 2.0: stop 97, target 106
    let risk = RiskParams {
        sl_atr_mult: 1.5,
        risk_reward: 2.0,
        trailing: true,
        break_even: true,
    };
    let mut pos = OpenPosition::open(Side::Long, 100.0, 2.0, risk).unwrap();
    assert_relative_eq!(pos.stop_loss, 97.0);
    assert_relative_eq!(pos.take_profit, 106.0);

    // Favorable excursion reaches half the target distance: stop to entry
    assert!(pos
        .step(&candle(0, 101.0, 103.2, 100.5, 102.5, 900.0), 2.0)
        .is_none());
    assert!(pos.break_even_activated);
    assert_relative_eq!(pos.stop_loss, 100.0);

    // Pullback below entry closes at the protected stop, flat gross
    let exit = pos
        .step(&candle(1, 102.0, 102.5, 99.5, 99.8, 900.0), 2.0)
        .unwrap();
    assert_eq!(exit.reason, ExitReason::StopLoss);
    assert_relative_eq!(exit.price, 100.0);
    assert_relative_eq!(exit.pnl_pct, -ROUND_TRIP_COMMISSION_PCT);
}

#[test]
fn backtest_on_uptrend_closes_only_longs() {
    let report = run_backtest(&uptrend_after_chop(550), &BacktestParams::default()).unwrap();
    assert!(report.trades > 0);
    assert_eq!(report.trades, report.history.len());
    for row in &report.history {
        assert_eq!(row.side, Side::Long);
    }
    // Drawdown can never exceed the distance from peak to trough
    assert!(report.max_drawdown >= 0.0);
}

#[test]
fn grid_search_covers_and_ranks_all_combinations() {
    let candles = uptrend_after_chop(550);
    let results = run_grid_search(&candles, &GridSpec::default()).unwrap();
    assert_eq!(results.len(), 9);

    for pair in results.windows(2) {
        assert!(pair[0].report.pnl >= pair[1].report.pnl);
    }

    // Every combination appears exactly once
    let mut combos: Vec<(u64, u64)> = results
        .iter()
        .map(|r| (r.sl_atr_mult.to_bits(), r.risk_reward.to_bits()))
        .collect();
    combos.sort();
    combos.dedup();
    assert_eq!(combos.len(), 9);
}

#[test]
fn optimizer_graduates_from_persisted_performance() {
    let store = TradeStore::open_in_memory().unwrap();

    // 35 closed trades, 60% winners, positive average
    for i in 0..35 {
        let win = i % 5 != 0 && i % 5 != 1;
        let pnl = if win { 0.8 } else { -0.5 };
        let trade = TradeRecord {
            id: None,
            symbol: Symbol::new("BTC-USDT"),
            side: Side::Long,
            entry_price: 100.0,
            exit_price: None,
            exit_reason: None,
            pnl: 0.0,
            rsi: 55.0,
            ema50: 100.0,
            ema200: 99.0,
            atr: 1.0,
            volume: 1000.0,
            stop_loss: 98.5,
            take_profit: 103.0,
            break_even_activated: false,
            trade_time: Utc::now(),
        };
        let id = store.insert_trade(&trade).unwrap();
        let reason = if win {
            ExitReason::TakeProfit
        } else {
            ExitReason::StopLoss
        };
        store.close_trade(id, 100.0, reason, pnl, false).unwrap();
    }

    let stats = store.performance().unwrap();
    assert_eq!(stats.closed_trades, 35);
    assert!(stats.win_rate > 55.0);
    assert!(stats.avg_pnl > 0.0);

    let mut optimizer = AdaptiveOptimizer::from_mode(Mode::Learning);
    assert!(optimizer.evaluate(&stats));
    assert_eq!(optimizer.mode(), Mode::Moderate);

    // The new parameter set survives a persistence round trip
    store.save_params(optimizer.params()).unwrap();
    let reloaded = store.load_params().unwrap().unwrap();
    assert_eq!(&reloaded, optimizer.params());
    assert_eq!(reloaded.mode, Mode::Moderate);
}

#[test]
fn closed_trades_are_immutable() {
    let store = TradeStore::open_in_memory().unwrap();
    let trade = TradeRecord {
        id: None,
        symbol: Symbol::new("ETH-USDT"),
        side: Side::Short,
        entry_price: 2000.0,
        exit_price: None,
        exit_reason: None,
        pnl: 0.0,
        rsi: 40.0,
        ema50: 1990.0,
        ema200: 2010.0,
        atr: 15.0,
        volume: 800.0,
        stop_loss: 2022.5,
        take_profit: 1966.25,
        break_even_activated: false,
        trade_time: Utc::now(),
    };
    let id = store.insert_trade(&trade).unwrap();
    store
        .close_trade(id, 1966.25, ExitReason::TakeProfit, 1.65, false)
        .unwrap();

    // Second close attempt must fail and leave the record untouched
    assert!(store
        .close_trade(id, 2100.0, ExitReason::StopLoss, -5.0, true)
        .is_err());
    let closed = store.closed_trades().unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].exit_reason, Some(ExitReason::TakeProfit));
    assert!((closed[0].pnl - 1.65).abs() < 1e-9);
}
