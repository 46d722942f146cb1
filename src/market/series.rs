// =============================================================================
// Price Series — ordered OHLCV rows plus the synthetic fallback baseline
// =============================================================================
//
// Invariant: dates strictly ascending, no duplicates.  An empty series is a
// valid value meaning "no data" and every consumer treats it that way.
// =============================================================================

use std::collections::HashMap;

use anyhow::{bail, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One OHLCV row.  `volume` is absent for some indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    bars: Vec<PriceBar>,
    /// True when the rows came from the synthetic baseline, not the collaborator.
    #[serde(default)]
    pub synthetic: bool,
}

impl PriceSeries {
    /// Build a series, rejecting out-of-order or duplicate dates.
    pub fn new(symbol: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self> {
        let symbol = symbol.into();
        if let Some(w) = bars.windows(2).find(|w| w[0].date >= w[1].date) {
            bail!(
                "price series for {symbol} not strictly ascending at {} -> {}",
                w[0].date,
                w[1].date
            );
        }
        Ok(Self {
            symbol,
            bars,
            synthetic: false,
        })
    }

    /// Sort by date and keep the last row seen for any duplicated date.
    pub fn from_unsorted(symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self {
            symbol: symbol.into(),
            bars: deduped,
            synthetic: false,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bars: Vec::new(),
            synthetic: false,
        }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Volumes, only when every row carries one.
    pub fn volumes(&self) -> Option<Vec<f64>> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn has_volume(&self) -> bool {
        !self.bars.is_empty() && self.bars.iter().all(|b| b.volume.is_some())
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Last `n` rows as a new series.
    pub fn tail(&self, n: usize) -> PriceSeries {
        let start = self.bars.len().saturating_sub(n);
        PriceSeries {
            symbol: self.symbol.clone(),
            bars: self.bars[start..].to_vec(),
            synthetic: self.synthetic,
        }
    }

    /// Rows with `from <= date <= to`.
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> PriceSeries {
        PriceSeries {
            symbol: self.symbol.clone(),
            bars: self
                .bars
                .iter()
                .filter(|b| b.date >= from && b.date <= to)
                .cloned()
                .collect(),
            synthetic: self.synthetic,
        }
    }

    /// Index of the row whose date is closest to `date` (earlier row on ties).
    pub fn nearest_index(&self, date: NaiveDate) -> Option<usize> {
        self.bars
            .iter()
            .enumerate()
            .min_by_key(|(_, b)| (b.date - date).num_days().abs())
            .map(|(i, _)| i)
    }
}

/// Simple returns `x[i+1] / x[i] - 1`.  A zero base yields 0.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Population standard deviation.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

/// Sample standard deviation (n - 1), matching rolling-window statistics.
pub fn sample_std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64).sqrt()
}

// ---------------------------------------------------------------------------
// Synthetic baseline
// ---------------------------------------------------------------------------

/// Symbols that get a pre-seeded fallback series at start-up.
pub const COMMON_SYMBOLS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "NVDA", "JPM", "V", "WMT", "JNJ", "PG",
    "MA", "UNH", "HD", "BAC", "XOM", "DIS", "RELIANCE.NS", "TCS.NS", "HDFCBANK.NS", "INFY.NS",
    "ICICIBANK.NS", "HINDUNILVR.NS", "SBIN.NS", "BHARTIARTL.NS", "ITC.NS", "KOTAKBANK.NS",
];

/// Trading days in each synthetic series.
pub const SYNTHETIC_DAYS: usize = 10;

/// Randomly perturbed baseline series used when every fetch attempt fails.
#[derive(Debug, Clone, Default)]
pub struct SyntheticBaseline {
    seeded: HashMap<String, PriceSeries>,
}

impl SyntheticBaseline {
    /// Pre-seed a series for every symbol in [`COMMON_SYMBOLS`], ending at `end`.
    pub fn seeded(end: NaiveDate) -> Self {
        let mut rng = rand::thread_rng();
        let seeded: HashMap<String, PriceSeries> = COMMON_SYMBOLS
            .iter()
            .map(|s| (s.to_string(), generate_series(s, end, &mut rng)))
            .collect();
        info!(count = seeded.len(), "synthetic baseline series seeded");
        Self { seeded }
    }

    pub fn get(&self, symbol: &str) -> Option<&PriceSeries> {
        self.seeded.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.seeded.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.seeded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeded.is_empty()
    }
}

/// Deterministic base price in [100, 500) derived from the symbol text.
pub fn base_price(symbol: &str) -> f64 {
    // FNV-1a, stable across runs unlike the std hasher.
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in symbol.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    100.0 + (h % 400) as f64
}

/// Ten weekday rows ending on or before `end`, each close drifting by up to
/// +/-5 % from the previous one.
pub fn generate_series<R: Rng>(symbol: &str, end: NaiveDate, rng: &mut R) -> PriceSeries {
    let mut dates = Vec::with_capacity(SYNTHETIC_DAYS);
    let mut day = end;
    while dates.len() < SYNTHETIC_DAYS {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day -= Duration::days(1);
    }
    dates.reverse();

    let mut prev_close = base_price(symbol);
    let bars = dates
        .into_iter()
        .map(|date| {
            let close = prev_close * (1.0 + rng.gen_range(-5.0..5.0) / 100.0);
            let open = prev_close * (1.0 + rng.gen_range(-2.0..2.0) / 100.0);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..2.0) / 100.0);
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..2.0) / 100.0);
            let volume = rng.gen_range(500_000.0..2_000_000.0_f64).floor();
            prev_close = close;
            PriceBar {
                date,
                open: round2(open),
                high: round2(high),
                low: round2(low),
                close: round2(close),
                volume: Some(volume),
            }
        })
        .collect();

    PriceSeries {
        symbol: symbol.to_string(),
        bars,
        synthetic: true,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
