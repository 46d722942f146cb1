// =============================================================================
// Market Data Service — cache, retry and synthetic fallback around a source
// =============================================================================
//
// The collaborator behind `MarketDataSource` may be slow, flaky or absent.
// This layer guarantees a `PriceSeries` is always returned:
//
//   1. cache hit on "{symbol}:{fast|full}:{start}:{end}"
//   2. up to `attempts` calls, each bounded by `attempt_timeout`, with a fixed
//      backoff between them
//   3. the pre-seeded synthetic series for common symbols
//   4. an empty series ("no data")
//
// An empty series from the collaborator is an answer, not a failure, and is
// not retried.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::series::{PriceSeries, SyntheticBaseline};
use super::symbols::fetch_variants;
use crate::cache::{stock_data_key, ExpiringCache, API_TTL_SECS};
use crate::types::FetchMode;

/// The market-data collaborator boundary.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Rows for `symbol` between `start` and `end` at `interval` ("1d", "1wk").
    /// An unknown symbol or empty range returns an empty series.
    async fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: &str,
    ) -> Result<PriceSeries>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Policy / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub attempt_timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(API_TTL_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    Cache,
    Collaborator,
    Synthetic,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// The exchange variant that produced the rows.
    pub symbol: String,
    pub series: PriceSeries,
    pub origin: DataOrigin,
    /// Last collaborator error, when every attempt failed.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// MarketDataService
// ---------------------------------------------------------------------------

pub struct MarketDataService {
    source: Option<Arc<dyn MarketDataSource>>,
    cache: Arc<ExpiringCache<PriceSeries>>,
    baseline: SyntheticBaseline,
    policy: FetchPolicy,
}

impl MarketDataService {
    /// Build the service and seed the synthetic baseline ending today.
    pub fn new(
        source: Option<Arc<dyn MarketDataSource>>,
        cache: Arc<ExpiringCache<PriceSeries>>,
        policy: FetchPolicy,
    ) -> Self {
        Self::with_baseline(
            source,
            cache,
            policy,
            SyntheticBaseline::seeded(Utc::now().date_naive()),
        )
    }

    pub fn with_baseline(
        source: Option<Arc<dyn MarketDataSource>>,
        cache: Arc<ExpiringCache<PriceSeries>>,
        policy: FetchPolicy,
        baseline: SyntheticBaseline,
    ) -> Self {
        Self {
            source,
            cache,
            baseline,
            policy,
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Try the bare symbol, then its `.NS` and `.BO` variants; first non-empty
    /// result wins.  Falls back to the synthetic baseline, then to no data.
    pub async fn fetch_any_variant(
        &self,
        symbol: &str,
        mode: FetchMode,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FetchOutcome {
        let mut last_error = None;
        for variant in fetch_variants(symbol) {
            match self.fetch_cached(&variant, mode, start, end).await {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => debug!(symbol = %variant, "no rows for variant"),
                Err(e) => last_error = Some(format!("{e:#}")),
            }
        }

        for variant in fetch_variants(symbol) {
            if let Some(series) = self.baseline.get(&variant) {
                warn!(symbol = %variant, "using synthetic baseline series");
                return FetchOutcome {
                    symbol: variant,
                    series: series.clone(),
                    origin: DataOrigin::Synthetic,
                    error: last_error,
                };
            }
        }

        info!(symbol, "no market data available");
        FetchOutcome {
            symbol: symbol.to_string(),
            series: PriceSeries::empty(symbol),
            origin: DataOrigin::NoData,
            error: last_error,
        }
    }

    /// One symbol variant through cache and retry.  `Ok(None)` means the
    /// collaborator answered with no rows (or there is no collaborator).
    async fn fetch_cached(
        &self,
        symbol: &str,
        mode: FetchMode,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<FetchOutcome>> {
        let key = stock_data_key(symbol, mode, start, end);
        if let Some(series) = self.cache.get(&key) {
            debug!(key = %key, "stock data cache hit");
            return Ok(Some(FetchOutcome {
                symbol: symbol.to_string(),
                series,
                origin: DataOrigin::Cache,
                error: None,
            }));
        }

        let Some(source) = &self.source else {
            return Ok(None);
        };

        let series = self.fetch_with_retry(source.as_ref(), symbol, mode, start, end).await?;
        if series.is_empty() {
            return Ok(None);
        }
        self.cache.put(key, series.clone(), self.policy.cache_ttl);
        Ok(Some(FetchOutcome {
            symbol: symbol.to_string(),
            series,
            origin: DataOrigin::Collaborator,
            error: None,
        }))
    }

    async fn fetch_with_retry(
        &self,
        source: &dyn MarketDataSource,
        symbol: &str,
        mode: FetchMode,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let attempts = self.policy.attempts.max(1);
        let mut last_err = anyhow::anyhow!("no fetch attempted");

        for attempt in 1..=attempts {
            let call = source.fetch(symbol, start, end, mode.interval());
            match tokio::time::timeout(self.policy.attempt_timeout, call).await {
                Ok(Ok(series)) => {
                    debug!(symbol, attempt, rows = series.len(), source = source.name(), "fetched");
                    return Ok(series);
                }
                Ok(Err(e)) => {
                    warn!(symbol, attempt, error = %e, "market data fetch failed");
                    last_err = e;
                }
                Err(_) => {
                    warn!(
                        symbol,
                        attempt,
                        timeout_ms = self.policy.attempt_timeout.as_millis() as u64,
                        "market data fetch timed out"
                    );
                    last_err = anyhow::anyhow!(
                        "fetch timed out after {:?}",
                        self.policy.attempt_timeout
                    );
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }
        Err(last_err.context(format!("{symbol}: all {attempts} fetch attempts failed")))
    }
}

impl std::fmt::Debug for MarketDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataService")
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .field("cached", &self.cache.len())
            .field("baseline", &self.baseline.len())
            .field("policy", &self.policy)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::series::PriceBar;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn rows(symbol: &str) -> PriceSeries {
        let bars = (1..=5)
            .map(|d| PriceBar {
                date: day(d),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.0 + d as f64,
                volume: Some(1000.0),
            })
            .collect();
        PriceSeries::new(symbol, bars).unwrap()
    }

    /// Fails `failures` times, then answers for `known` symbols only.
    struct ScriptedSource {
        calls: AtomicUsize,
        failures: usize,
        known: &'static [&'static str],
        hang: bool,
    }

    impl ScriptedSource {
        fn new(failures: usize, known: &'static [&'static str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                known,
                hang: false,
            }
        }
    }

    #[async_trait]
    impl MarketDataSource for ScriptedSource {
        async fn fetch(
            &self,
            symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
            _interval: &str,
        ) -> Result<PriceSeries> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if n < self.failures {
                anyhow::bail!("upstream 503");
            }
            if self.known.contains(&symbol) {
                Ok(rows(symbol))
            } else {
                Ok(PriceSeries::empty(symbol))
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn service(source: Arc<ScriptedSource>) -> MarketDataService {
        MarketDataService::with_baseline(
            Some(source),
            Arc::new(ExpiringCache::new(Duration::from_secs(300))),
            FetchPolicy::default(),
            SyntheticBaseline::seeded(day(8)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_caches() {
        let source = Arc::new(ScriptedSource::new(2, &["ACME"]));
        let svc = service(source.clone());

        let first = svc.fetch_any_variant("ACME", FetchMode::Full, day(1), day(8)).await;
        assert_eq!(first.origin, DataOrigin::Collaborator);
        assert_eq!(first.series.len(), 5);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        let second = svc.fetch_any_variant("ACME", FetchMode::Full, day(1), day(8)).await;
        assert_eq!(second.origin, DataOrigin::Cache);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_through_exchange_variants() {
        let source = Arc::new(ScriptedSource::new(0, &["SBIN.NS"]));
        let svc = service(source.clone());
        let out = svc.fetch_any_variant("SBIN", FetchMode::Fast, day(1), day(8)).await;
        assert_eq!(out.symbol, "SBIN.NS");
        assert_eq!(out.origin, DataOrigin::Collaborator);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_uses_synthetic_for_common_symbols() {
        let source = Arc::new(ScriptedSource::new(usize::MAX, &[]));
        let svc = service(source.clone());

        let out = svc.fetch_any_variant("AAPL", FetchMode::Full, day(1), day(8)).await;
        assert_eq!(out.origin, DataOrigin::Synthetic);
        assert!(out.series.synthetic);
        assert!(out.error.is_some());

        let out = svc.fetch_any_variant("FAKECO", FetchMode::Full, day(1), day(8)).await;
        assert_eq!(out.origin, DataOrigin::NoData);
        assert!(out.series.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_source_is_bounded_by_attempt_timeout() {
        let mut scripted = ScriptedSource::new(0, &["MSFT"]);
        scripted.hang = true;
        let source = Arc::new(scripted);
        let svc = service(source.clone());

        let started = tokio::time::Instant::now();
        let out = svc.fetch_any_variant("MSFT", FetchMode::Full, day(1), day(8)).await;
        // Three variants, each 3 x 10 s attempts + 2 x 1 s backoff.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(96) && elapsed < Duration::from_secs(97));
        assert_eq!(out.origin, DataOrigin::Synthetic);
        assert_eq!(source.calls.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn absent_source_degrades_without_error() {
        let svc = MarketDataService::with_baseline(
            None,
            Arc::new(ExpiringCache::new(Duration::from_secs(300))),
            FetchPolicy::default(),
            SyntheticBaseline::seeded(day(8)),
        );
        let out = svc.fetch_any_variant("TCS", FetchMode::Fast, day(1), day(8)).await;
        assert_eq!(out.origin, DataOrigin::Synthetic);
        assert_eq!(out.symbol, "TCS.NS");
        assert!(out.error.is_none());
    }
}
