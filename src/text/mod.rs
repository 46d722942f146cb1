// =============================================================================
// Text module — static pattern tables and the rule-based text scorer
// =============================================================================

pub mod patterns;
pub mod scorer;

pub use scorer::{
    likely_pump_and_dump, AnnouncementLanguage, CachedText, ClaimMetric, CredibilityResult,
    PumpLanguageResult, ReportedFigures, SentimentCategory, SentimentResult, TextAnalysis,
    TextSignalScorer,
};
