// =============================================================================
// Risk Engine — wires the components into the public operations
// =============================================================================
//
// One `RiskEngine` owns every piece of process-lifetime state:
//
//   text cache      shared by the scorer, keyed "{function}:{hash}"
//   stock cache     shared by the market-data service, keyed
//                   "{symbol}:{fast|full}:{start}:{end}"
//   scan cache      market scans per symbol (market route TTL)
//   report cache    announcement verifications (announcement route TTL)
//   tracker         mention buckets and sentiment samples
//
// Operations:
//
//   ingest_message        score a message and record it against an entity
//   analyze_symbol        tracker + market signals -> market weight table
//   verify_announcement   text and stock tasks under the orchestrator ->
//                         announcement weight table
//   scan_symbols          analyze many symbols, keep the flagged ones
//   scan_active_entities  analyze everything the tracker has seen, keep the
//                         high-risk ones
//
// Only input validation can fail.  Past that point every path returns a
// well-formed report, with degraded placeholders where a task did not finish.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{AnnouncementEvidence, RiskAggregator};
use crate::cache::{text_key, ExpiringCache};
use crate::classifier::{Classification, TextClassifier};
use crate::clock::{system_clock, Clock};
use crate::error::{validate_symbol, validate_text, ValidationError};
use crate::market::detector::{MarketAnomalyDetector, MarketScan, PriceReaction};
use crate::market::series::{PriceSeries, SyntheticBaseline};
use crate::market::source::{DataOrigin, MarketDataService, MarketDataSource};
use crate::market::symbols::{quick_check, resolve_alias, SymbolCheck, SymbolVerdict};
use crate::orchestrator::{TaskOrchestrator, TaskResult, TaskSpec, TaskStatus};
use crate::runtime_config::EngineConfig;
use crate::text::scorer::{
    likely_pump_and_dump, AnnouncementLanguage, CachedText, ReportedFigures, TextAnalysis,
    TextSignalScorer,
};
use crate::tracker::{MentionTracker, SentimentPattern};
use crate::types::{AnomalySignal, FetchMode, RiskAssessment};

/// Scores above this raise a HIGH RISK ALERT.
pub const HIGH_RISK_ALERT_SCORE: u8 = 70;
/// Days of daily bars behind a symbol analysis.
pub const ANALYSIS_WINDOW_DAYS: i64 = 60;
/// Days either side of an announcement date.
pub const FAST_REACTION_WINDOW_DAYS: i64 = 14;
pub const FULL_REACTION_WINDOW_DAYS: i64 = 30;

pub const TEXT_TASK: &str = "text";
pub const STOCK_TASK: &str = "stock";

const DATE_FORMATS: &[&str] = &["%d-%b-%Y", "%Y-%m-%d", "%d-%m-%Y"];

// =============================================================================
// Reports
// =============================================================================

/// Output of `analyze_symbol`.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub assessment: RiskAssessment,
    pub signals: Vec<AnomalySignal>,
    pub scan: MarketScan,
    pub data_origin: DataOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_pattern: Option<SentimentPattern>,
    pub analyzed_at: DateTime<Utc>,
}

/// Terminal state of one orchestrated task, without its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub status: TaskStatus,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl<T> From<&TaskResult<T>> for TaskReport {
    fn from(r: &TaskResult<T>) -> Self {
        Self {
            status: r.status,
            timed_out: r.timed_out,
            error: r.error.clone(),
            elapsed_ms: r.elapsed_ms,
        }
    }
}

/// Output of `verify_announcement`.
#[derive(Debug, Clone, Serialize)]
pub struct AnnouncementReport {
    pub request_id: String,
    /// Resolved ticker.
    pub symbol: String,
    pub announcement_date: NaiveDate,
    pub assessment: RiskAssessment,
    pub symbol_check: SymbolCheck,
    pub text: TextAnalysis,
    pub language: AnnouncementLanguage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<PriceReaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_origin: Option<DataOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_error: Option<String>,
    /// Last collaborator error behind the market data, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_error: Option<String>,
    pub tasks: BTreeMap<String, TaskReport>,
    /// The cheap pump pre-check fired and the stock task was skipped.
    pub early_scam_detection: bool,
    pub cached: bool,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Task payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TextOutput {
    analysis: TextAnalysis,
    language: AnnouncementLanguage,
    classification: Option<Classification>,
    classifier_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct StockOutput {
    origin: Option<DataOrigin>,
    reaction: Option<PriceReaction>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
enum TaskValue {
    Text(TextOutput),
    Stock(StockOutput),
}

#[derive(Debug, Clone)]
struct MarketSnapshot {
    scan: MarketScan,
    origin: DataOrigin,
    error: Option<String>,
}

// =============================================================================
// RiskEngine
// =============================================================================

pub struct RiskEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    scorer: Arc<TextSignalScorer>,
    tracker: MentionTracker,
    detector: MarketAnomalyDetector,
    market: Arc<MarketDataService>,
    classifier: Option<Arc<dyn TextClassifier>>,
    orchestrator: TaskOrchestrator,
    aggregator: RiskAggregator,
    scans: ExpiringCache<MarketSnapshot>,
    reports: ExpiringCache<AnnouncementReport>,
}

impl RiskEngine {
    pub fn new(
        config: EngineConfig,
        source: Option<Arc<dyn MarketDataSource>>,
        classifier: Option<Arc<dyn TextClassifier>>,
    ) -> Self {
        Self::with_clock(config, source, classifier, system_clock())
    }

    pub fn with_clock(
        config: EngineConfig,
        source: Option<Arc<dyn MarketDataSource>>,
        classifier: Option<Arc<dyn TextClassifier>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = |secs: u64| Duration::from_secs(secs);

        let text_cache: Arc<ExpiringCache<CachedText>> = Arc::new(ExpiringCache::with_clock(
            config.cache_ttl(),
            clock.clone(),
        ));
        let stock_cache: Arc<ExpiringCache<PriceSeries>> = Arc::new(ExpiringCache::with_clock(
            ttl(config.api_ttl_secs),
            clock.clone(),
        ));
        let market = MarketDataService::with_baseline(
            source,
            stock_cache,
            config.fetch_policy(),
            SyntheticBaseline::seeded(clock.now().date_naive()),
        );
        let classifier = classifier.filter(|_| config.classifier_enabled);

        info!(
            market_source = market.has_source(),
            classifier = ?classifier.as_ref().map(|c| c.name()),
            fast_mode = config.fast_mode,
            "RiskEngine initialised"
        );

        Self {
            scorer: Arc::new(TextSignalScorer::new(text_cache, config.cache_ttl())),
            tracker: MentionTracker::with_clock(clock.clone())
                .with_shift_threshold(config.sentiment_shift_threshold),
            detector: MarketAnomalyDetector::new(config.detector()),
            market: Arc::new(market),
            classifier,
            orchestrator: TaskOrchestrator::new(config.global_timeout()),
            aggregator: RiskAggregator::new(),
            scans: ExpiringCache::with_clock(ttl(config.market_route_ttl_secs), clock.clone()),
            reports: ExpiringCache::with_clock(
                ttl(config.announcement_route_ttl_secs),
                clock.clone(),
            ),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &MentionTracker {
        &self.tracker
    }

    pub fn scorer(&self) -> &TextSignalScorer {
        &self.scorer
    }

    // -------------------------------------------------------------------------
    // Message ingestion
    // -------------------------------------------------------------------------

    /// Score `text` and record one mention plus its sentiment against
    /// `entity`.
    pub fn ingest_message(&self, entity: &str, text: &str) -> Result<TextAnalysis, ValidationError> {
        let entity = resolve_alias(&validate_symbol(entity)?);
        let text = validate_text(text)?;

        let analysis = self.scorer.analyze(text);
        self.tracker
            .record_mention_with_sentiment(&entity, analysis.sentiment.score, text);
        debug!(
            entity = %entity,
            sentiment = analysis.sentiment.score,
            credibility = analysis.credibility.score,
            "message ingested"
        );
        Ok(analysis)
    }

    // -------------------------------------------------------------------------
    // Symbol analysis
    // -------------------------------------------------------------------------

    pub async fn analyze_symbol(&self, symbol: &str) -> Result<SymbolReport, ValidationError> {
        let symbol = resolve_alias(&validate_symbol(symbol)?);
        let snapshot = self.market_snapshot(&symbol).await;

        let mut signals = self
            .tracker
            .signals(&symbol, self.config.mention_spike_threshold);
        signals.extend(snapshot.scan.signals());

        let assessment = self.aggregator.assess_market(&symbol, &signals, None, None);
        if assessment.score > HIGH_RISK_ALERT_SCORE {
            warn!(
                symbol = %symbol,
                score = assessment.score,
                factors = ?assessment.factors.iter().map(|f| &f.description).collect::<Vec<_>>(),
                "HIGH RISK ALERT"
            );
        } else {
            info!(symbol = %symbol, score = assessment.score, level = %assessment.level, "symbol analysed");
        }

        Ok(SymbolReport {
            sentiment_pattern: self.tracker.detect_sentiment_pattern(&symbol),
            symbol,
            assessment,
            signals,
            scan: snapshot.scan,
            data_origin: snapshot.origin,
            data_error: snapshot.error,
            analyzed_at: self.clock.now(),
        })
    }

    /// Market scan for `symbol`, cached for the market route TTL.  The fetch
    /// is bounded by the global timeout.
    async fn market_snapshot(&self, symbol: &str) -> MarketSnapshot {
        let key = format!("scan:{symbol}");
        if let Some(hit) = self.scans.get(&key) {
            debug!(symbol, "market scan cache hit");
            return hit;
        }

        let end = self.clock.now().date_naive();
        let start = end - chrono::Duration::days(ANALYSIS_WINDOW_DAYS);
        let fetch = self
            .market
            .fetch_any_variant(symbol, FetchMode::Full, start, end);

        let snapshot = match tokio::time::timeout(self.config.global_timeout(), fetch).await {
            Ok(outcome) => MarketSnapshot {
                scan: self.detector.scan(&outcome.series),
                origin: outcome.origin,
                error: outcome.error,
            },
            Err(_) => {
                warn!(symbol, "market data fetch exceeded the global timeout");
                MarketSnapshot {
                    scan: self.detector.scan(&PriceSeries::empty(symbol)),
                    origin: DataOrigin::NoData,
                    error: Some("market data fetch timed out".to_string()),
                }
            }
        };
        self.scans.put_default(key, snapshot.clone());
        snapshot
    }

    // -------------------------------------------------------------------------
    // Announcement verification
    // -------------------------------------------------------------------------

    pub async fn verify_announcement(
        &self,
        symbol: &str,
        text: &str,
        date: &str,
        reported: ReportedFigures,
        fast: bool,
    ) -> Result<AnnouncementReport, ValidationError> {
        let started = Instant::now();
        let text = validate_text(text)?.to_string();
        let symbol = resolve_alias(&validate_symbol(symbol)?);
        let date = parse_announcement_date(date)?;
        let mode = FetchMode::from_fast_flag(fast);

        let cache_key = text_key(
            "announcement",
            &format!(
                "{symbol}|{date}|{mode}|{:?}|{:?}|{text}",
                reported.revenue_growth_pct, reported.profit_growth_pct
            ),
        );
        if let Some(mut hit) = self.reports.get(&cache_key) {
            debug!(symbol = %symbol, "announcement report cache hit");
            hit.request_id = Uuid::new_v4().to_string();
            hit.cached = true;
            hit.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(hit);
        }

        let request_id = Uuid::new_v4().to_string();
        let symbol_check = quick_check(&symbol);
        let likely_pump = likely_pump_and_dump(&text);
        if likely_pump {
            info!(request_id = %request_id, symbol = %symbol, "early scam detection: skipping stock task");
        }

        let tasks = vec![
            self.text_task(text.clone(), reported, likely_pump),
            self.stock_task(&symbol, &symbol_check, date, mode, likely_pump),
        ];
        let results = self.orchestrator.run(tasks).await;

        let text_out = match results.get(TEXT_TASK).map(|r| &r.value) {
            Some(TaskValue::Text(t)) => t.clone(),
            _ => text_placeholder(likely_pump),
        };
        let stock_out = match results.get(STOCK_TASK).map(|r| &r.value) {
            Some(TaskValue::Stock(s)) => s.clone(),
            _ => StockOutput::default(),
        };

        let evidence = AnnouncementEvidence {
            credibility: text_out.analysis.credibility.score,
            language: &text_out.language,
            reaction: stock_out.reaction.as_ref(),
            fake_symbol: symbol_check.verdict == SymbolVerdict::LikelyFake,
        };
        let assessment = self.aggregator.assess_announcement(&symbol, &evidence, &text);

        let tasks: BTreeMap<String, TaskReport> = results
            .iter()
            .map(|(name, r)| (name.clone(), TaskReport::from(r)))
            .collect();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if assessment.score > HIGH_RISK_ALERT_SCORE {
            warn!(
                request_id = %request_id,
                symbol = %symbol,
                score = assessment.score,
                level = %assessment.level,
                "HIGH RISK ALERT"
            );
        }
        info!(
            request_id = %request_id,
            symbol = %symbol,
            score = assessment.score,
            flagged = assessment.flagged,
            elapsed_ms,
            "announcement verified"
        );

        let report = AnnouncementReport {
            request_id,
            symbol,
            announcement_date: date,
            assessment,
            symbol_check,
            text: text_out.analysis,
            language: text_out.language,
            reaction: stock_out.reaction,
            data_origin: stock_out.origin,
            classification: text_out.classification,
            classifier_error: text_out.classifier_error,
            data_error: stock_out.error,
            tasks,
            early_scam_detection: likely_pump,
            cached: false,
            elapsed_ms,
        };

        // Reports built from placeholders are not worth keeping.
        if results.values().all(|r| !r.timed_out && r.status != TaskStatus::Failed) {
            self.reports.put_default(cache_key, report.clone());
        }
        Ok(report)
    }

    fn text_task(&self, text: String, reported: ReportedFigures, likely_pump: bool) -> TaskSpec<TaskValue> {
        let scorer = self.scorer.clone();
        let classifier = self.classifier.clone();
        let classifier_timeout = Duration::from_secs(self.config.fetch_timeout_secs);

        let work = async move {
            let analysis = scorer.analyze(&text);
            let language = scorer.announcement_language(&text, &reported);

            let (classification, classifier_error) = match classifier {
                None => (None, None),
                Some(c) => match tokio::time::timeout(classifier_timeout, c.classify(&text)).await {
                    Ok(Ok(answer)) => (Some(answer), None),
                    Ok(Err(e)) => {
                        warn!(classifier = c.name(), error = %e, "classifier failed");
                        (None, Some(format!("{e:#}")))
                    }
                    Err(_) => {
                        warn!(classifier = c.name(), "classifier timed out");
                        (None, Some("classifier timed out".to_string()))
                    }
                },
            };

            Ok::<_, anyhow::Error>(TaskValue::Text(TextOutput {
                analysis,
                language,
                classification,
                classifier_error,
            }))
        };

        TaskSpec::new(
            TEXT_TASK,
            work,
            TaskValue::Text(text_placeholder(likely_pump)),
        )
    }

    fn stock_task(
        &self,
        symbol: &str,
        check: &SymbolCheck,
        date: NaiveDate,
        mode: FetchMode,
        likely_pump: bool,
    ) -> TaskSpec<TaskValue> {
        let placeholder = TaskValue::Stock(StockOutput::default());
        if likely_pump {
            return TaskSpec::skipped(STOCK_TASK, "skipped_for_performance", placeholder);
        }
        if check.verdict == SymbolVerdict::LikelyFake {
            return TaskSpec::skipped(STOCK_TASK, "likely_fake_symbol", placeholder);
        }

        let window = chrono::Duration::days(match mode {
            FetchMode::Fast => FAST_REACTION_WINDOW_DAYS,
            FetchMode::Full => FULL_REACTION_WINDOW_DAYS,
        });
        let market = self.market.clone();
        let detector = self.detector.clone();
        let symbol = symbol.to_string();

        let work = async move {
            let fetched = market
                .fetch_any_variant(&symbol, mode, date - window, date + window)
                .await;
            let reaction = detector.price_reaction(&fetched.series, date);
            debug!(
                symbol = %fetched.symbol,
                origin = ?fetched.origin,
                rows = fetched.series.len(),
                reaction = reaction.is_some(),
                "stock task finished"
            );
            Ok::<_, anyhow::Error>(TaskValue::Stock(StockOutput {
                origin: Some(fetched.origin),
                reaction,
                error: fetched.error,
            }))
        };

        TaskSpec::new(STOCK_TASK, work, placeholder).with_timeout(self.config.stock_timeout())
    }

    // -------------------------------------------------------------------------
    // Scans
    // -------------------------------------------------------------------------

    /// Analyse `symbols` concurrently and return the flagged reports.
    pub async fn scan_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<SymbolReport> {
        let reports = join_all(symbols.iter().map(|s| self.analyze_symbol(s.as_ref()))).await;

        let flagged: Vec<SymbolReport> = reports
            .into_iter()
            .zip(symbols)
            .filter_map(|(r, s)| match r {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(symbol = s.as_ref(), error = %e, "scan skipped invalid symbol");
                    None
                }
            })
            .filter(|r| r.assessment.flagged)
            .collect();

        info!(scanned = symbols.len(), flagged = flagged.len(), "symbol scan complete");
        flagged
    }

    pub async fn scan_watchlist(&self) -> Vec<SymbolReport> {
        self.scan_symbols(&self.config.watchlist).await
    }

    /// Every entity the tracker has seen; returns those above the alert
    /// score.
    pub async fn scan_active_entities(&self) -> Vec<SymbolReport> {
        let entities = self.tracker.active_entities();
        let reports = join_all(entities.iter().map(|e| self.analyze_symbol(e))).await;
        reports
            .into_iter()
            .filter_map(Result::ok)
            .filter(|r| r.assessment.flagged && r.assessment.score > HIGH_RISK_ALERT_SCORE)
            .collect()
    }
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("market", &self.market)
            .field("classifier", &self.classifier.as_ref().map(|c| c.name().to_string()))
            .field("tracker", &self.tracker)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

fn text_placeholder(likely_pump: bool) -> TextOutput {
    TextOutput {
        analysis: TextAnalysis::placeholder(likely_pump),
        language: AnnouncementLanguage::default(),
        classification: None,
        classifier_error: None,
    }
}

/// Accepts `15-Jan-2024`, `2024-01-15` and `15-01-2024`.
pub fn parse_announcement_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ValidationError::BadDate(trimmed.to_string()))
}
