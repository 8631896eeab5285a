//! Market data source
//!
//! [`CandleSource`] is the seam between the live runner and the outside
//! world; the production implementation pulls perpetual-swap klines from the
//! BingX public API. No authentication: market data only.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Candle, EngineError, Symbol};

const BINGX_BASE_URL: &str = "https://open-api.bingx.com";
const KLINES_PATH: &str = "/openApi/swap/v3/quote/klines";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Abstract candle provider so the runner can be driven by a mock in tests.
pub trait CandleSource {
    /// Most recent `limit` candles for `symbol`, oldest first.
    fn fetch_candles(&self, symbol: &Symbol, interval: &str, limit: u32) -> Result<Vec<Candle>>;
}

pub struct BingXClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct KlinesResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<RawKline>,
}

/// BingX serializes numeric fields as strings.
#[derive(Debug, Deserialize)]
struct RawKline {
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
    time: i64,
}

impl BingXClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINGX_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(BingXClient {
            client,
            base_url: base_url.into(),
        })
    }
}

impl CandleSource for BingXClient {
    fn fetch_candles(&self, symbol: &Symbol, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!(
            "{}{}?symbol={}&interval={}&limit={}",
            self.base_url,
            KLINES_PATH,
            symbol,
            interval,
            limit.min(1440)
        );

        debug!("fetching klines: {} {} x{}", symbol, interval, limit);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("kline request failed for {symbol}"))?;

        if !response.status().is_success() {
            anyhow::bail!("kline request returned HTTP {}", response.status());
        }

        let parsed: KlinesResponse = response
            .json()
            .context("failed to parse kline response")?;

        if parsed.code != 0 {
            anyhow::bail!("exchange error {}: {}", parsed.code, parsed.msg);
        }

        if parsed.data.is_empty() {
            return Err(EngineError::DataUnavailable(symbol.clone()).into());
        }

        let mut candles = Vec::with_capacity(parsed.data.len());
        for raw in parsed.data {
            match parse_kline(&raw) {
                Ok(candle) => candles.push(candle),
                Err(err) => warn!("kline at {} skipped: {}", raw.time, err),
            }
        }

        if candles.is_empty() {
            return Err(EngineError::DataUnavailable(symbol.clone()).into());
        }

        // API returns newest first; indicators want chronological order
        candles.sort_by_key(|c| c.datetime);
        candles.dedup_by_key(|c| c.datetime);

        Ok(candles)
    }
}

fn parse_kline(raw: &RawKline) -> Result<Candle> {
    let datetime = DateTime::<Utc>::from_timestamp_millis(raw.time)
        .with_context(|| format!("bad kline timestamp {}", raw.time))?;

    let candle = Candle {
        datetime,
        open: raw.open.parse().context("bad open")?,
        high: raw.high.parse().context("bad high")?,
        low: raw.low.parse().context("bad low")?,
        close: raw.close.parse().context("bad close")?,
        volume: raw.volume.parse().context("bad volume")?,
    };
    candle.validate()?;
    Ok(candle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kline_string_fields() {
        let raw = RawKline {
            open: "50000.5".into(),
            high: "50100.0".into(),
            low: "49900.25".into(),
            close: "50050.0".into(),
            volume: "123.45".into(),
            time: 1_700_000_000_000,
        };
        let candle = parse_kline(&raw).unwrap();
        assert_eq!(candle.open, 50000.5);
        assert_eq!(candle.volume, 123.45);
    }

    #[test]
    fn test_parse_kline_rejects_garbage() {
        let raw = RawKline {
            open: "not-a-number".into(),
            high: "1".into(),
            low: "1".into(),
            close: "1".into(),
            volume: "1".into(),
            time: 1_700_000_000_000,
        };
        assert!(parse_kline(&raw).is_err());
    }

    #[test]
    fn test_klines_response_shape() {
        let json = r#"{
            "code": 0,
            "msg": "",
            "data": [
                {"open": "100", "high": "101", "low": "99", "close": "100.5",
                 "volume": "1000", "time": 1700000000000}
            ]
        }"#;
        let parsed: KlinesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.code, 0);
        assert_eq!(parsed.data.len(), 1);
    }
}
