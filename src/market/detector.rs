// =============================================================================
// Market Anomaly Detector — statistical checks over an OHLCV series
// =============================================================================
//
// Every check is computed independently.  A check that fails (non-finite
// input, too little data, a bug) degrades to a neutral "not detected" outcome
// and the others still run:
//
//   volume ratio      last volume / mean volume before the lookback window
//   return z-score    (recent return - mean return) / volatility, trailing 20
//   sustained pump    +20 % over 10 rows, then -10 % within the next 5
//   short pump        +5 % day (+50 % volume) then a red day within 2 rows
//   volatility        rolling 20-row annualised vol beyond mean + 3 sigma
//   manipulation      > 2 days with 5x volume and a 2-sigma candle body
//
// Confidences are fixed per check.  Well-known dampening is not applied here;
// the aggregator does it after all other scoring.
// =============================================================================

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::series::{mean, sample_std_dev, simple_returns, std_dev, PriceSeries};
use super::symbols::is_well_known;
use crate::types::{AnomalyKind, AnomalySignal};

pub const VOLUME_SPIKE_THRESHOLD: f64 = 2.0;
pub const Z_SCORE_THRESHOLD: f64 = 2.5;
pub const LOOKBACK_DAYS: usize = 5;
pub const VOLATILITY_WINDOW: usize = 20;

const PUMP_WINDOW: usize = 10;
const PUMP_RETURN: f64 = 0.20;
const DUMP_WINDOW: usize = 5;
const DUMP_RETURN: f64 = -0.10;

const SHORT_PUMP_RETURN: f64 = 0.05;
const SHORT_PUMP_RETURN_NO_VOLUME: f64 = 0.08;
const SHORT_PUMP_VOLUME_CHANGE: f64 = 0.5;

const MIN_ROWS_LONG_CHECKS: usize = 30;
const MANIPULATION_VOLUME_MULT: f64 = 5.0;
const MANIPULATION_MIN_DAYS: usize = 2;

const VOLUME_CONFIDENCE: f64 = 0.6;
const PRICE_SPIKE_CONFIDENCE: f64 = 0.7;
const SUSTAINED_CONFIDENCE: f64 = 0.8;
const SHORT_WINDOW_CONFIDENCE: f64 = 0.7;
const VOLATILITY_CONFIDENCE: f64 = 0.7;
const MANIPULATION_CONFIDENCE: f64 = 0.6;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub lookback_days: usize,
    pub volume_spike_threshold: f64,
    pub z_score_threshold: f64,
    pub volatility_window: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lookback_days: LOOKBACK_DAYS,
            volume_spike_threshold: VOLUME_SPIKE_THRESHOLD,
            z_score_threshold: Z_SCORE_THRESHOLD,
            volatility_window: VOLATILITY_WINDOW,
        }
    }
}

/// Result of one sub-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub detected: bool,
    pub confidence: f64,
    /// Measured quantity: ratio, z-score, return or day count.
    pub value: f64,
    pub detail: String,
    pub timeframe: String,
}

impl CheckOutcome {
    fn neutral(detail: impl Into<String>) -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            value: 0.0,
            detail: detail.into(),
            timeframe: String::new(),
        }
    }

    fn measured(detected: bool, confidence: f64, value: f64, detail: impl Into<String>) -> Self {
        Self {
            detected,
            confidence: if detected { confidence } else { 0.0 },
            value,
            detail: detail.into(),
            timeframe: String::new(),
        }
    }

    fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = timeframe.into();
        self
    }
}

/// All checks over one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketScan {
    pub symbol: String,
    pub rows: usize,
    pub synthetic: bool,
    pub well_known: bool,
    pub volume_spike: CheckOutcome,
    pub price_spike: CheckOutcome,
    pub sustained_pump_dump: CheckOutcome,
    pub short_pump_dump: CheckOutcome,
    pub unusual_volatility: CheckOutcome,
    pub price_manipulation: CheckOutcome,
}

impl MarketScan {
    pub fn has_data(&self) -> bool {
        self.rows > 0
    }

    /// Detected checks as aggregator input, in a fixed order.
    pub fn signals(&self) -> Vec<AnomalySignal> {
        [
            (AnomalyKind::VolumeSpike, &self.volume_spike),
            (AnomalyKind::PriceSpike, &self.price_spike),
            (AnomalyKind::PatternMatch, &self.sustained_pump_dump),
            (AnomalyKind::PatternMatch, &self.short_pump_dump),
            (AnomalyKind::PatternMatch, &self.unusual_volatility),
            (AnomalyKind::PatternMatch, &self.price_manipulation),
        ]
        .into_iter()
        .filter(|(_, c)| c.detected)
        .map(|(kind, c)| {
            AnomalySignal::new(kind, c.confidence, c.value, c.detail.clone())
                .with_timeframe(c.timeframe.clone())
        })
        .collect()
    }
}

/// Market reaction around an announcement date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceReaction {
    pub date: NaiveDate,
    pub pre_close: f64,
    pub day_close: f64,
    pub next_close: f64,
    pub day_of_change_pct: f64,
    pub next_day_change_pct: f64,
    pub total_change_pct: f64,
    pub volume_ratio: f64,
    pub volume_abnormal: bool,
    /// Annualised volatility (%) of the 10 returns before / after the date.
    pub volatility_before_pct: f64,
    pub volatility_after_pct: f64,
    pub significant: bool,
}

// =============================================================================
// MarketAnomalyDetector
// =============================================================================

/// Stateless detector; safe to share between tasks.
#[derive(Debug, Clone, Default)]
pub struct MarketAnomalyDetector {
    config: DetectorConfig,
}

impl MarketAnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run every check.  An empty series yields an all-neutral scan.
    pub fn scan(&self, series: &PriceSeries) -> MarketScan {
        let symbol = series.symbol.as_str();
        let recent = series.tail(self.config.lookback_days);

        let scan = MarketScan {
            symbol: series.symbol.clone(),
            rows: series.len(),
            synthetic: series.synthetic,
            well_known: is_well_known(symbol),
            volume_spike: guarded("volume_ratio", symbol, || self.volume_ratio(series)),
            price_spike: guarded("return_z_score", symbol, || self.return_z_score(series)),
            sustained_pump_dump: guarded("sustained_pump_dump", symbol, || {
                sustained_pump_dump(series)
            }),
            short_pump_dump: guarded("short_pump_dump", symbol, || short_pump_dump(&recent)),
            unusual_volatility: guarded("unusual_volatility", symbol, || {
                self.unusual_volatility(series)
            }),
            price_manipulation: guarded("price_manipulation", symbol, || {
                price_manipulation(series)
            }),
        };

        info!(
            symbol,
            rows = scan.rows,
            synthetic = scan.synthetic,
            detected = scan.signals().len(),
            "market scan complete"
        );
        scan
    }

    // -------------------------------------------------------------------------
    // Volume ratio
    // -------------------------------------------------------------------------

    pub fn volume_ratio(&self, series: &PriceSeries) -> Result<CheckOutcome> {
        let Some(volumes) = series.volumes() else {
            return Ok(CheckOutcome::neutral("no volume data"));
        };
        let Some(&last) = volumes.last() else {
            return Ok(CheckOutcome::neutral("no data"));
        };
        ensure_finite(&volumes)?;

        let n = volumes.len();
        let baseline = if n > self.config.lookback_days {
            &volumes[..n - self.config.lookback_days]
        } else {
            &volumes[..]
        };
        let ratio = last / mean(baseline).max(1.0);
        let detected = ratio > self.config.volume_spike_threshold;

        Ok(CheckOutcome::measured(
            detected,
            VOLUME_CONFIDENCE,
            ratio,
            format!("volume {ratio:.2}x the pre-lookback average"),
        ))
    }

    // -------------------------------------------------------------------------
    // Return z-score
    // -------------------------------------------------------------------------

    pub fn return_z_score(&self, series: &PriceSeries) -> Result<CheckOutcome> {
        let closes = series.closes();
        if closes.len() < 2 {
            return Ok(CheckOutcome::neutral("not enough rows for returns"));
        }
        ensure_finite(&closes)?;

        let stats = return_stats(&closes, self.config.volatility_window);
        let z = stats.z_score;
        let detected = z.abs() > self.config.z_score_threshold;

        debug!(
            symbol = %series.symbol,
            recent_return = stats.recent_return,
            volatility = stats.volatility,
            z,
            "return z-score"
        );
        Ok(CheckOutcome::measured(
            detected,
            PRICE_SPIKE_CONFIDENCE,
            z,
            format!(
                "recent return {:+.2}% is {z:.2} sigma from the trailing mean",
                stats.recent_return * 100.0
            ),
        ))
    }

    // -------------------------------------------------------------------------
    // Unusual volatility
    // -------------------------------------------------------------------------

    pub fn unusual_volatility(&self, series: &PriceSeries) -> Result<CheckOutcome> {
        if series.len() < MIN_ROWS_LONG_CHECKS {
            return Ok(CheckOutcome::neutral("not enough rows for volatility"));
        }
        let closes = series.closes();
        ensure_finite(&closes)?;
        let returns = simple_returns(&closes);
        let w = self.config.volatility_window.max(2);
        if returns.len() < w {
            return Ok(CheckOutcome::neutral("not enough returns for volatility"));
        }

        let rolling: Vec<f64> = returns
            .windows(w)
            .map(|win| sample_std_dev(win) * 252f64.sqrt())
            .collect();
        let limit = mean(&rolling) + 3.0 * sample_std_dev(&rolling);
        let peak = rolling.iter().copied().fold(f64::MIN, f64::max);
        let detected = rolling.iter().any(|v| *v > limit);

        Ok(CheckOutcome::measured(
            detected,
            VOLATILITY_CONFIDENCE,
            peak,
            format!(
                "peak annualised volatility {:.1}% vs limit {:.1}%",
                peak * 100.0,
                limit * 100.0
            ),
        ))
    }

    // -------------------------------------------------------------------------
    // Price reaction
    // -------------------------------------------------------------------------

    /// Reaction around `date`.  `None` when the nearest row has no neighbour
    /// on both sides.
    pub fn price_reaction(&self, series: &PriceSeries, date: NaiveDate) -> Option<PriceReaction> {
        let idx = series.nearest_index(date)?;
        let bars = series.bars();
        if idx == 0 || idx + 1 >= bars.len() {
            return None;
        }

        let pre = bars[idx - 1].close;
        let day = bars[idx].close;
        let next = bars[idx + 1].close;
        if pre == 0.0 || day == 0.0 {
            return None;
        }
        let day_of = (day / pre - 1.0) * 100.0;
        let next_day = (next / day - 1.0) * 100.0;
        let total = (next / pre - 1.0) * 100.0;

        let prior: Vec<f64> = bars[idx.saturating_sub(10)..idx]
            .iter()
            .filter_map(|b| b.volume)
            .collect();
        let avg_volume = mean(&prior);
        let volume_ratio = match bars[idx].volume {
            Some(v) if avg_volume > 0.0 => v / avg_volume,
            _ => 0.0,
        };

        let returns = simple_returns(&series.closes());
        // returns[i] is the move into row i + 1.
        let before = &returns[idx.saturating_sub(11)..idx - 1];
        let after = &returns[idx - 1..(idx + 9).min(returns.len())];
        let annualise = |xs: &[f64]| sample_std_dev(xs) * 252f64.sqrt() * 100.0;

        let volume_abnormal = volume_ratio > 2.0;
        let significant = total.abs() > 5.0 || volume_ratio > 3.0;
        debug!(
            symbol = %series.symbol,
            %date,
            total_change_pct = total,
            volume_ratio,
            significant,
            "price reaction"
        );

        Some(PriceReaction {
            date: bars[idx].date,
            pre_close: pre,
            day_close: day,
            next_close: next,
            day_of_change_pct: day_of,
            next_day_change_pct: next_day,
            total_change_pct: total,
            volume_ratio,
            volume_abnormal,
            volatility_before_pct: annualise(before),
            volatility_after_pct: annualise(after),
            significant,
        })
    }
}

/// Inputs of the return z-score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnStats {
    /// Last close over the close `min(5, n - 1)` rows from the end, minus one.
    pub recent_return: f64,
    pub mean_return: f64,
    /// Population standard deviation of the trailing returns.
    pub volatility: f64,
    pub z_score: f64,
}

/// Return statistics over `closes`, with the trailing window capped at the
/// number of returns available.
pub fn return_stats(closes: &[f64], volatility_window: usize) -> ReturnStats {
    let n = closes.len();
    let k = n.saturating_sub(1).min(5);
    let recent_return = match k {
        0 => 0.0,
        _ if closes[n - k] == 0.0 => 0.0,
        _ => closes[n - 1] / closes[n - k] - 1.0,
    };

    let returns = simple_returns(closes);
    let window = volatility_window.min(returns.len());
    let trailing = &returns[returns.len() - window..];
    let volatility = std_dev(trailing);
    let mean_return = mean(trailing);
    let z_score = if volatility == 0.0 {
        0.0
    } else {
        (recent_return - mean_return) / volatility
    };

    ReturnStats {
        recent_return,
        mean_return,
        volatility,
        z_score,
    }
}

// =============================================================================
// Pattern checks
// =============================================================================

/// Any 10-row window up more than 20 %, followed within 5 rows by a drop of
/// more than 10 % from the window's end.
pub fn sustained_pump_dump(series: &PriceSeries) -> Result<CheckOutcome> {
    let closes = series.closes();
    let n = closes.len();
    if n <= PUMP_WINDOW + 1 {
        return Ok(CheckOutcome::neutral("not enough rows for pump/dump scan"));
    }
    ensure_finite(&closes)?;
    let bars = series.bars();

    for peak in PUMP_WINDOW..n {
        let start = peak - PUMP_WINDOW;
        if closes[start] == 0.0 || closes[peak] == 0.0 {
            continue;
        }
        let pump = closes[peak] / closes[start] - 1.0;
        if pump <= PUMP_RETURN {
            continue;
        }
        let last = (peak + DUMP_WINDOW).min(n - 1);
        for end in peak + 1..=last {
            let dump = closes[end] / closes[peak] - 1.0;
            if dump < DUMP_RETURN {
                let (d0, d1, d2) = (bars[start].date, bars[peak].date, bars[end].date);
                return Ok(CheckOutcome::measured(
                    true,
                    SUSTAINED_CONFIDENCE,
                    pump,
                    format!(
                        "pump {:+.1}% from {d0} to {d1}, dump {:+.1}% from {d1} to {d2}",
                        pump * 100.0,
                        dump * 100.0
                    ),
                )
                .with_timeframe(format!("{d0} to {d2}")));
            }
        }
    }
    Ok(CheckOutcome::neutral("no pump/dump window"))
}

/// Short-window variant, meant for the recent slice of a series.
pub fn short_pump_dump(recent: &PriceSeries) -> Result<CheckOutcome> {
    let len = recent.len();
    if len < 5 {
        return Ok(CheckOutcome::neutral("not enough recent rows"));
    }
    let closes = recent.closes();
    ensure_finite(&closes)?;
    let volumes = recent.volumes();
    let returns = simple_returns(&closes);
    let volume_changes = volumes.as_deref().map(simple_returns);
    let bars = recent.bars();

    // Row `pos` has return returns[pos - 1]; it needs two rows after it.
    for pos in 1..len - 2 {
        let ret = returns[pos - 1];
        let pumped = match &volume_changes {
            Some(vc) => ret > SHORT_PUMP_RETURN && vc[pos - 1] > SHORT_PUMP_VOLUME_CHANGE,
            None => ret > SHORT_PUMP_RETURN_NO_VOLUME,
        };
        if !pumped {
            continue;
        }
        if let Some(offset) = (1..=2).find(|k| returns[pos - 1 + k] < 0.0) {
            let (d0, d1) = (bars[pos].date, bars[pos + offset].date);
            return Ok(CheckOutcome::measured(
                true,
                SHORT_WINDOW_CONFIDENCE,
                ret,
                format!(
                    "{:+.1}% day on {d0} reversed by {d1}",
                    ret * 100.0
                ),
            )
            .with_timeframe(format!("{d0} to {d1}")));
        }
    }
    Ok(CheckOutcome::neutral("no short-window pump/dump"))
}

/// Days with extreme volume and an outsized candle body.
pub fn price_manipulation(series: &PriceSeries) -> Result<CheckOutcome> {
    if series.len() < MIN_ROWS_LONG_CHECKS {
        return Ok(CheckOutcome::neutral("not enough rows for manipulation scan"));
    }
    let Some(volumes) = series.volumes() else {
        return Ok(CheckOutcome::neutral("no volume data"));
    };
    ensure_finite(&volumes)?;
    let closes = series.closes();
    ensure_finite(&closes)?;
    let bars = series.bars();

    let mut days = Vec::new();
    for i in MIN_ROWS_LONG_CHECKS - 1..bars.len() {
        let vol_mean = mean(&volumes[i + 1 - 30..=i]);
        let close_std = sample_std_dev(&closes[i + 1 - 20..=i]);
        let body = (bars[i].close - bars[i].open).abs();
        if volumes[i] > MANIPULATION_VOLUME_MULT * vol_mean && body > 2.0 * close_std {
            days.push(bars[i].date);
        }
    }

    let detected = days.len() > MANIPULATION_MIN_DAYS;
    let timeframe = match (days.first(), days.last()) {
        (Some(a), Some(b)) if detected => format!("{a} to {b}"),
        _ => String::new(),
    };
    Ok(CheckOutcome::measured(
        detected,
        MANIPULATION_CONFIDENCE,
        days.len() as f64,
        format!("{} day(s) with extreme volume and price moves", days.len()),
    )
    .with_timeframe(timeframe))
}

// =============================================================================
// Helpers
// =============================================================================

fn ensure_finite(xs: &[f64]) -> Result<()> {
    if let Some(bad) = xs.iter().find(|x| !x.is_finite()) {
        bail!("non-finite value {bad} in series");
    }
    Ok(())
}

/// Run one check, turning an error or panic into a neutral outcome.
fn guarded<F>(check: &'static str, symbol: &str, f: F) -> CheckOutcome
where
    F: FnOnce() -> Result<CheckOutcome>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(outcome)) => {
            if outcome.detected {
                debug!(symbol, check, value = outcome.value, "anomaly detected");
            }
            outcome
        }
        Ok(Err(e)) => {
            warn!(symbol, check, error = %e, "market check failed, using neutral result");
            CheckOutcome::neutral(format!("{check} unavailable: {e}"))
        }
        Err(_) => {
            warn!(symbol, check, "market check panicked, using neutral result");
            CheckOutcome::neutral(format!("{check} unavailable"))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::series::PriceBar;
    use chrono::Duration;

    fn series_from(symbol: &str, closes: &[f64], volumes: Option<&[f64]>) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: volumes.map(|v| v[i]),
            })
            .collect();
        PriceSeries::new(symbol, bars).unwrap()
    }

    fn flat(n: usize, price: f64) -> Vec<f64> {
        vec![price; n]
    }

    #[test]
    fn sustained_pump_then_dump_detected() {
        // 25 % up over 10 rows, then 12 % down over the next 5.
        let mut closes: Vec<f64> = (0..=10).map(|i| 100.0 * 1.25f64.powf(i as f64 / 10.0)).collect();
        closes.extend((1..=5).map(|j| 125.0 * (1.0 - 0.024 * j as f64)));
        let s = series_from("PUMPCO", &closes, None);

        let out = sustained_pump_dump(&s).unwrap();
        assert!(out.detected);
        assert!((out.confidence - 0.8).abs() < 1e-12);
        assert!(out.detail.contains("pump"));
        assert_eq!(out.timeframe, "2024-01-01 to 2024-01-16");
    }

    #[test]
    fn pump_without_dump_is_not_flagged() {
        let closes: Vec<f64> = (0..=15).map(|i| 100.0 * 1.03f64.powi(i)).collect();
        let s = series_from("UP", &closes, None);
        assert!(!sustained_pump_dump(&s).unwrap().detected);
    }

    #[test]
    fn volume_ratio_excludes_lookback_rows() {
        let mut vols = flat(10, 1000.0);
        vols[9] = 3000.0;
        let s = series_from("X", &flat(10, 10.0), Some(&vols));
        let det = MarketAnomalyDetector::default();
        let out = det.volume_ratio(&s).unwrap();
        assert!((out.value - 3.0).abs() < 1e-9);
        assert!(out.detected);
        assert!((out.confidence - 0.6).abs() < 1e-12);
    }

    #[test]
    fn volume_ratio_short_series_uses_all_rows() {
        let vols = [100.0, 100.0, 400.0];
        let s = series_from("X", &flat(3, 10.0), Some(&vols));
        let out = MarketAnomalyDetector::default().volume_ratio(&s).unwrap();
        assert!((out.value - 2.0).abs() < 1e-9);
        assert!(!out.detected);
    }

    #[test]
    fn z_score_zero_on_flat_prices() {
        let s = series_from("X", &flat(30, 50.0), None);
        let out = MarketAnomalyDetector::default().return_z_score(&s).unwrap();
        assert_eq!(out.value, 0.0);
        assert!(!out.detected);
    }

    #[test]
    fn z_score_flags_sharp_recent_move() {
        let mut closes: Vec<f64> = (0..25).map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        closes.extend([110.0, 120.0, 130.0]);
        let s = series_from("X", &closes, None);
        let out = MarketAnomalyDetector::default().return_z_score(&s).unwrap();
        assert!(out.detected, "z = {}", out.value);
        assert!((out.confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn recent_return_spans_min_five_or_n_minus_one_rows() {
        // Six rows: the base is the fifth row from the end.
        let stats = return_stats(&[100.0, 105.0, 110.0, 115.0, 120.0, 200.0], VOLATILITY_WINDOW);
        assert!((stats.recent_return - (200.0 / 105.0 - 1.0)).abs() < 1e-12);

        let s = series_from("X", &[100.0, 105.0, 110.0, 115.0, 120.0, 200.0], None);
        let out = MarketAnomalyDetector::default().return_z_score(&s).unwrap();
        assert!(out.detail.contains("+90.48%"), "{}", out.detail);

        // Longer series still look back five rows from the last.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let stats = return_stats(&closes, VOLATILITY_WINDOW);
        assert!((stats.recent_return - (129.0 / 125.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn two_rows_have_zero_recent_return() {
        let stats = return_stats(&[100.0, 110.0], VOLATILITY_WINDOW);
        assert_eq!(stats.recent_return, 0.0);
        assert!((stats.mean_return - 0.1).abs() < 1e-12);
        assert_eq!(stats.volatility, 0.0);
        assert_eq!(stats.z_score, 0.0);

        let s = series_from("X", &[100.0, 110.0], None);
        let out = MarketAnomalyDetector::default().return_z_score(&s).unwrap();
        assert_eq!(out.value, 0.0);
        assert!(!out.detected);
    }

    #[test]
    fn trailing_window_is_capped_at_twenty_returns() {
        // A large early move sits outside the last 20 returns.
        let mut closes = vec![50.0, 100.0];
        closes.extend((0..24).map(|i| if i % 2 == 0 { 102.0 } else { 100.0 }));
        let returns = simple_returns(&closes);
        assert_eq!(returns.len(), 25);

        let stats = return_stats(&closes, VOLATILITY_WINDOW);
        let trailing = &returns[5..];
        assert!((stats.mean_return - mean(trailing)).abs() < 1e-12);
        assert!((stats.volatility - std_dev(trailing)).abs() < 1e-12);
        assert!((stats.mean_return - mean(&returns)).abs() > 1e-3);
        let z = (stats.recent_return - stats.mean_return) / stats.volatility;
        assert!((stats.z_score - z).abs() < 1e-12);

        // Fewer returns than the window: all of them are used.
        let short = [100.0, 102.0, 101.0, 104.0, 103.0, 107.0, 106.0, 110.0];
        let stats = return_stats(&short, VOLATILITY_WINDOW);
        let returns = simple_returns(&short);
        assert!((stats.mean_return - mean(&returns)).abs() < 1e-12);
        assert!((stats.volatility - std_dev(&returns)).abs() < 1e-12);
        assert!((stats.recent_return - (110.0 / 104.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn short_window_needs_volume_confirmation() {
        let closes = [100.0, 106.0, 104.0, 105.0, 106.0];
        let quiet = [1000.0, 1100.0, 1000.0, 1000.0, 1000.0];
        let loud = [1000.0, 1800.0, 1000.0, 1000.0, 1000.0];

        let s = series_from("X", &closes, Some(&quiet));
        assert!(!short_pump_dump(&s).unwrap().detected);

        let s = series_from("X", &closes, Some(&loud));
        let out = short_pump_dump(&s).unwrap();
        assert!(out.detected);
        assert!((out.confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn short_window_without_volume_needs_bigger_move() {
        let s = series_from("^NSEI", &[100.0, 106.0, 104.0, 105.0, 106.0], None);
        assert!(!short_pump_dump(&s).unwrap().detected);
        let s = series_from("^NSEI", &[100.0, 109.0, 104.0, 105.0, 106.0], None);
        assert!(short_pump_dump(&s).unwrap().detected);
    }

    #[test]
    fn manipulation_needs_more_than_two_days() {
        let n = 40;
        let mut closes: Vec<f64> = (0..n).map(|i| 100.0 + (i % 3) as f64 * 0.1).collect();
        let mut vols = flat(n, 1000.0);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for &i in &[32usize, 35, 38] {
            vols[i] = 50_000.0;
            closes[i] = 100.0;
        }
        let bars = (0..n)
            .map(|i| PriceBar {
                date: start + Duration::days(i as i64),
                open: if [32, 35, 38].contains(&i) { 90.0 } else { closes[i] },
                high: closes[i],
                low: 90.0,
                close: closes[i],
                volume: Some(vols[i]),
            })
            .collect();
        let s = PriceSeries::new("X", bars).unwrap();
        let out = price_manipulation(&s).unwrap();
        assert_eq!(out.value, 3.0);
        assert!(out.detected);
    }

    #[test]
    fn non_finite_input_degrades_one_check_only() {
        let mut closes = flat(12, 10.0);
        closes[5] = f64::NAN;
        let vols = flat(12, 1000.0);
        let s = series_from("X", &closes, Some(&vols));
        let scan = MarketAnomalyDetector::default().scan(&s);
        assert!(!scan.price_spike.detected);
        assert!(scan.price_spike.detail.contains("unavailable"));
        assert!(!scan.volume_spike.detail.contains("unavailable"));
    }

    #[test]
    fn empty_series_is_neutral() {
        let scan = MarketAnomalyDetector::default().scan(&PriceSeries::empty("AAPL"));
        assert!(!scan.has_data());
        assert!(scan.signals().is_empty());
        assert!(scan.well_known);
    }

    #[test]
    fn price_reaction_measures_move_and_volume() {
        let closes = [100.0, 100.0, 100.0, 100.0, 108.0, 110.0, 110.0];
        let vols = [1000.0, 1000.0, 1000.0, 1000.0, 4000.0, 1500.0, 1000.0];
        let s = series_from("X", &closes, Some(&vols));
        let det = MarketAnomalyDetector::default();
        let r = det
            .price_reaction(&s, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
            .unwrap();
        assert!((r.total_change_pct - 10.0).abs() < 1e-9);
        assert!((r.volume_ratio - 4.0).abs() < 1e-9);
        assert!(r.volume_abnormal);
        assert!(r.significant);

        // First row has no predecessor.
        assert!(det
            .price_reaction(&s, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap())
            .is_none());
    }
}
