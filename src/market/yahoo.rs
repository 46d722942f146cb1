// =============================================================================
// Yahoo chart adapter — HTTP implementation of `MarketDataSource`
// =============================================================================
//
// GET {base}/v8/finance/chart/{symbol}?period1=..&period2=..&interval=..
//
// Rows with a null close are skipped; a missing volume array leaves every
// row's volume unset (indices often report none).  An unknown symbol comes
// back as a 404 with an error body, which maps to an empty series.
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde_json::Value;
use tracing::{debug, instrument};

use super::series::{PriceBar, PriceSeries};
use super::source::MarketDataSource;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Clone)]
pub struct YahooChartClient {
    base_url: String,
    client: reqwest::Client,
}

impl YahooChartClient {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; risk-sentinel)")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate, interval: &str) -> String {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // Inclusive end date.
        let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_400;
        format!(
            "{}/v8/finance/chart/{}?period1={period1}&period2={period2}&interval={interval}",
            self.base_url,
            encode_symbol(symbol)
        )
    }
}

#[async_trait]
impl MarketDataSource for YahooChartClient {
    #[instrument(skip(self), name = "yahoo::fetch")]
    async fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: &str,
    ) -> Result<PriceSeries> {
        let url = self.chart_url(symbol, start, end, interval);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /v8/finance/chart request failed")?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(symbol, "symbol not found upstream");
            return Ok(PriceSeries::empty(symbol));
        }
        let body: Value = resp
            .json()
            .await
            .context("failed to parse chart response")?;
        if !status.is_success() {
            bail!("chart endpoint returned {status}: {body}");
        }

        let series = parse_chart(symbol, &body)?;
        debug!(symbol, rows = series.len(), "chart rows parsed");
        Ok(series)
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

impl std::fmt::Debug for YahooChartClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooChartClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn encode_symbol(symbol: &str) -> String {
    symbol.replace('^', "%5E").replace('&', "%26").replace(' ', "%20")
}

/// Turn a chart response into a series.  An explicit error body or an empty
/// result list is "no data".
pub fn parse_chart(symbol: &str, body: &Value) -> Result<PriceSeries> {
    let chart = body.get("chart").context("chart response missing 'chart'")?;
    if !chart["error"].is_null() {
        debug!(symbol, error = %chart["error"], "chart error body");
        return Ok(PriceSeries::empty(symbol));
    }
    let Some(result) = chart["result"].as_array().and_then(|r| r.first()) else {
        return Ok(PriceSeries::empty(symbol));
    };

    let Some(timestamps) = result["timestamp"].as_array() else {
        return Ok(PriceSeries::empty(symbol));
    };
    let quote = &result["indicators"]["quote"][0];
    let column = |name: &str| quote[name].as_array().cloned().unwrap_or_default();
    let (opens, highs, lows, closes, volumes) = (
        column("open"),
        column("high"),
        column("low"),
        column("close"),
        column("volume"),
    );

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(date) = ts
            .as_i64()
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .map(|dt| dt.date_naive())
        else {
            continue;
        };
        let Some(close) = closes.get(i).and_then(Value::as_f64) else {
            continue;
        };
        let field = |col: &[Value]| col.get(i).and_then(Value::as_f64).unwrap_or(close);
        bars.push(PriceBar {
            date,
            open: field(&opens),
            high: field(&highs),
            low: field(&lows),
            close,
            volume: volumes.get(i).and_then(Value::as_f64),
        });
    }

    Ok(PriceSeries::from_unsorted(symbol, bars))
}
