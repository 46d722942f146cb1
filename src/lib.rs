// =============================================================================
// Risk Sentinel — multi-signal fraud and pump-and-dump risk scoring
// =============================================================================
//
// Independent signals (mention volume, sentiment trend, price/volume
// statistics, text-pattern matches) are computed under a shared expiring
// cache and a bounded task orchestrator, then aggregated into a single 0-100
// risk score with hard overrides.
//
//   cache         expiring key/value store shared by every component
//   tracker       hourly mention buckets and sentiment samples per entity
//   market        price series, anomaly checks, market-data collaborator
//   text          pattern tables and the rule-based text scorer
//   classifier    optional language-model collaborator
//   orchestrator  concurrent tasks under global and per-task deadlines
//   aggregator    weighted-additive score, overrides, classification
//   engine        the public operations wired together
// =============================================================================

pub mod aggregator;
pub mod cache;
pub mod classifier;
pub mod clock;
pub mod engine;
pub mod error;
pub mod market;
pub mod orchestrator;
pub mod runtime_config;
pub mod text;
pub mod tracker;
pub mod types;

pub use aggregator::RiskAggregator;
pub use cache::ExpiringCache;
pub use classifier::{HttpClassifier, TextClassifier};
pub use engine::{AnnouncementReport, RiskEngine, SymbolReport};
pub use error::ValidationError;
pub use market::{MarketDataSource, YahooChartClient};
pub use orchestrator::TaskOrchestrator;
pub use runtime_config::EngineConfig;
pub use text::{ReportedFigures, TextSignalScorer};
pub use tracker::MentionTracker;
pub use types::{AnomalyKind, AnomalySignal, RiskAssessment, RiskFactor, RiskLevel};
