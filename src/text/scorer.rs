// =============================================================================
// Text Signal Scorer — rule-based sentiment, credibility and pump language
// =============================================================================
//
// Every score is a pure function of the text.  Results are cached under
// "{function}:{sha256(normalized text)}" for a fixed TTL, so the same message
// arriving twice within the window costs one computation.
//
//   sentiment   (pos - neg) / (pos + neg + eps), plus exaggeration and
//               vagueness densities
//   credibility 0.7 minus language penalties and scam-pattern penalties,
//               clamped to [0, 1]
//   pump        min(0.95, 0.2 * matches) + salience boost + combination
//               boost, capped at 0.99
//
// Announcement-language extraction (exaggerations, speculative terms,
// financial claims, regulatory checks) is not cached; it runs once per
// verification.
// =============================================================================

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::patterns::{
    matches_opt, tables, PatternSet, MISLEADING_INDICATORS, NEGATIVE_WORDS, NEUTRAL_WORDS,
    POSITIVE_WORDS, PUMP_COMBINATIONS, VAGUE_INDICATORS,
};
use crate::cache::{text_key, ExpiringCache, DEFAULT_TTL_SECS};

const EPSILON: f64 = 0.001;
const POLARITY_THRESHOLD: f64 = 0.3;

const BASE_CREDIBILITY: f64 = 0.7;
const EMPTY_TEXT_CREDIBILITY: f64 = 0.5;
const SCAM_MATCH_PENALTY: f64 = 0.15;
const SCAM_PENALTY_CAP: f64 = 0.6;
const UNREALISTIC_RETURN_PENALTY: f64 = 0.5;
const EXTREMITY_THRESHOLD: f64 = 0.6;

const PUMP_MATCH_WEIGHT: f64 = 0.2;
const PUMP_MATCH_CAP: f64 = 0.95;
const PUMP_COMBINATION_BOOST: f64 = 0.4;
const PUMP_CONFIDENCE_CAP: f64 = 0.99;
const PUMP_THRESHOLD: f64 = 0.4;

const REVENUE_MISMATCH_PTS: f64 = 5.0;
const PROFIT_MISMATCH_PTS: f64 = 10.0;

// =============================================================================
// Result types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentCategory {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub score: f64,
    pub category: SentimentCategory,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub exaggeration_score: f64,
    pub vagueness_score: f64,
    pub word_count: usize,
}

impl SentimentResult {
    /// Placeholder used when text analysis is degraded.
    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            category: SentimentCategory::Neutral,
            positive: 0,
            negative: 0,
            neutral: 0,
            exaggeration_score: 0.0,
            vagueness_score: 0.0,
            word_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredibilityResult {
    pub score: f64,
    pub scam_patterns: Vec<String>,
    pub high_risk_patterns: Vec<String>,
    pub unrealistic_returns: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpLanguageResult {
    pub is_pump_and_dump: bool,
    pub confidence: f64,
    pub matched: Vec<String>,
}

/// All three cached scores for one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    pub sentiment: SentimentResult,
    pub credibility: CredibilityResult,
    pub pump_language: PumpLanguageResult,
}

impl TextAnalysis {
    /// Degraded result: neutral sentiment, credibility 0.2 when the cheap
    /// pre-check already flagged pump language, else 0.5.
    pub fn placeholder(likely_pump: bool) -> Self {
        Self {
            sentiment: SentimentResult::neutral(),
            credibility: CredibilityResult {
                score: if likely_pump { 0.2 } else { 0.5 },
                scam_patterns: Vec::new(),
                high_risk_patterns: Vec::new(),
                unrealistic_returns: false,
            },
            pump_language: PumpLanguageResult {
                is_pump_and_dump: likely_pump,
                confidence: 0.0,
                matched: Vec::new(),
            },
        }
    }
}

/// Cached value; one enum so a single cache instance serves every function.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedText {
    Sentiment(SentimentResult),
    Credibility(CredibilityResult),
    Pump(PumpLanguageResult),
}

// ---------------------------------------------------------------------------
// Announcement language
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimMetric {
    RevenueGrowth,
    ProfitGrowth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialClaim {
    pub metric: ClaimMetric,
    pub claimed_pct: f64,
    pub text: String,
}

/// Figures the caller believes were actually reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportedFigures {
    pub revenue_growth_pct: Option<f64>,
    pub profit_growth_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimMismatch {
    pub metric: ClaimMetric,
    pub claimed_pct: f64,
    pub actual_pct: f64,
    pub discrepancy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementLanguage {
    /// Every exaggeration occurrence (duplicates counted).
    pub exaggerations: Vec<String>,
    /// Every speculative occurrence (duplicates counted).
    pub speculative: Vec<String>,
    pub claims: Vec<FinancialClaim>,
    pub mismatches: Vec<ClaimMismatch>,
    pub regulatory_issues: Vec<String>,
}

impl AnnouncementLanguage {
    pub fn has_regulatory_issues(&self) -> bool {
        !self.regulatory_issues.is_empty()
    }
}

// =============================================================================
// TextSignalScorer
// =============================================================================

pub struct TextSignalScorer {
    cache: Arc<ExpiringCache<CachedText>>,
    ttl: Duration,
    computations: AtomicUsize,
}

impl TextSignalScorer {
    pub fn new(cache: Arc<ExpiringCache<CachedText>>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            computations: AtomicUsize::new(0),
        }
    }

    /// Scorer with its own private cache and the default 1 h TTL.
    pub fn standalone() -> Self {
        let ttl = Duration::from_secs(DEFAULT_TTL_SECS);
        Self::new(Arc::new(ExpiringCache::new(ttl)), ttl)
    }

    /// Number of uncached computations performed so far.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn analyze(&self, text: &str) -> TextAnalysis {
        TextAnalysis {
            sentiment: self.sentiment(text),
            credibility: self.credibility(text),
            pump_language: self.pump_language(text),
        }
    }

    pub fn sentiment(&self, text: &str) -> SentimentResult {
        let key = text_key("sentiment", text);
        if let Some(CachedText::Sentiment(hit)) = self.cache.get(&key) {
            return hit;
        }
        self.computations.fetch_add(1, Ordering::Relaxed);
        let result = compute_sentiment(text);
        self.cache.put(key, CachedText::Sentiment(result.clone()), self.ttl);
        result
    }

    pub fn credibility(&self, text: &str) -> CredibilityResult {
        let key = text_key("credibility", text);
        if let Some(CachedText::Credibility(hit)) = self.cache.get(&key) {
            return hit;
        }
        let sentiment = self.sentiment(text);
        self.computations.fetch_add(1, Ordering::Relaxed);
        let result = compute_credibility(text, &sentiment);
        self.cache.put(key, CachedText::Credibility(result.clone()), self.ttl);
        result
    }

    pub fn pump_language(&self, text: &str) -> PumpLanguageResult {
        let key = text_key("pump_and_dump", text);
        if let Some(CachedText::Pump(hit)) = self.cache.get(&key) {
            return hit;
        }
        self.computations.fetch_add(1, Ordering::Relaxed);
        let result = compute_pump_language(text);
        self.cache.put(key, CachedText::Pump(result.clone()), self.ttl);
        result
    }

    /// Announcement-specific extraction, compared against `reported` figures.
    pub fn announcement_language(
        &self,
        text: &str,
        reported: &ReportedFigures,
    ) -> AnnouncementLanguage {
        extract_announcement_language(text, reported)
    }
}

impl Default for TextSignalScorer {
    fn default() -> Self {
        Self::standalone()
    }
}

impl std::fmt::Debug for TextSignalScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSignalScorer")
            .field("cached", &self.cache.len())
            .field("ttl", &self.ttl)
            .field("computations", &self.computations())
            .finish()
    }
}

// =============================================================================
// Pure scoring functions
// =============================================================================

/// Whitespace-separated words containing any entry of `list`.  Each word
/// counts once.
fn count_indicators(words: &[&str], list: &[&str]) -> usize {
    words
        .iter()
        .filter(|w| list.iter().any(|s| w.contains(*s)))
        .count()
}

pub fn compute_sentiment(text: &str) -> SentimentResult {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let word_count = words.len();

    let positive = count_indicators(&words, POSITIVE_WORDS);
    let negative = count_indicators(&words, NEGATIVE_WORDS);
    let neutral = count_indicators(&words, NEUTRAL_WORDS);
    let exaggerations = count_indicators(&words, MISLEADING_INDICATORS);
    let vague = count_indicators(&words, VAGUE_INDICATORS);

    let score = (positive as f64 - negative as f64) / (positive as f64 + negative as f64 + EPSILON);
    let category = if score > POLARITY_THRESHOLD {
        SentimentCategory::Positive
    } else if score < -POLARITY_THRESHOLD {
        SentimentCategory::Negative
    } else {
        SentimentCategory::Neutral
    };

    SentimentResult {
        score,
        category,
        positive,
        negative,
        neutral,
        exaggeration_score: exaggerations as f64 / (word_count as f64 + EPSILON),
        vagueness_score: vague as f64 / (word_count as f64 + EPSILON),
        word_count,
    }
}

pub fn compute_credibility(text: &str, sentiment: &SentimentResult) -> CredibilityResult {
    if text.trim().is_empty() {
        return CredibilityResult {
            score: EMPTY_TEXT_CREDIBILITY,
            scam_patterns: Vec::new(),
            high_risk_patterns: Vec::new(),
            unrealistic_returns: false,
        };
    }
    let t = tables();

    let mut score = BASE_CREDIBILITY;
    score -= sentiment.exaggeration_score * 0.5;
    score -= sentiment.vagueness_score * 0.3;
    let extremity = sentiment.score.abs();
    if extremity > EXTREMITY_THRESHOLD {
        score -= (extremity - EXTREMITY_THRESHOLD) * 0.5;
    }

    let matched: Vec<_> = t.scam.matching(text).collect();
    score -= (matched.len() as f64 * SCAM_MATCH_PENALTY).min(SCAM_PENALTY_CAP);
    let high_risk: Vec<String> = matched
        .iter()
        .filter(|r| r.weight > 0.0)
        .map(|r| {
            score -= r.weight;
            r.name.to_string()
        })
        .collect();

    let unrealistic_returns = t.unrealistic_return.any_match(text);
    if unrealistic_returns {
        score -= UNREALISTIC_RETURN_PENALTY;
    }

    let score = score.clamp(0.0, 1.0);
    debug!(
        score,
        scam_matches = matched.len(),
        high_risk = high_risk.len(),
        unrealistic_returns,
        "credibility scored"
    );
    CredibilityResult {
        score,
        scam_patterns: matched.iter().map(|r| r.name.to_string()).collect(),
        high_risk_patterns: high_risk,
        unrealistic_returns,
    }
}

pub fn compute_pump_language(text: &str) -> PumpLanguageResult {
    let matched: Vec<_> = tables().pump.matching(text).collect();
    let names: BTreeSet<&str> = matched.iter().map(|r| r.name).collect();

    let mut confidence = (matched.len() as f64 * PUMP_MATCH_WEIGHT).min(PUMP_MATCH_CAP);
    // Salience boost is flat, not per rule.
    if matched.iter().any(|r| r.weight > 0.0) {
        confidence += matched.iter().map(|r| r.weight).fold(0.0, f64::max);
    }
    let combination = PUMP_COMBINATIONS
        .iter()
        .any(|(anchor, partners)| names.contains(anchor) && partners.iter().any(|p| names.contains(p)));
    if combination {
        confidence += PUMP_COMBINATION_BOOST;
    }
    let confidence = confidence.min(PUMP_CONFIDENCE_CAP);

    PumpLanguageResult {
        is_pump_and_dump: confidence > PUMP_THRESHOLD,
        confidence,
        matched: matched.iter().map(|r| r.name.to_string()).collect(),
    }
}

/// Cheap pre-check: pump confidence without touching the cache.
pub fn likely_pump_and_dump(text: &str) -> bool {
    compute_pump_language(text).is_pump_and_dump
}

// ---------------------------------------------------------------------------
// Announcement extraction
// ---------------------------------------------------------------------------

fn occurrences(set: &PatternSet, text: &str) -> Vec<String> {
    set.rules()
        .iter()
        .flat_map(|r| r.regex.find_iter(text).map(|m| m.as_str().to_lowercase()))
        .collect()
}

fn claims(set: &PatternSet, metric: ClaimMetric, lowered: &str) -> Vec<FinancialClaim> {
    set.rules()
        .iter()
        .flat_map(|r| r.regex.captures_iter(lowered))
        .filter_map(|caps| {
            let pct = caps.get(1)?.as_str().parse::<f64>().ok()?;
            Some(FinancialClaim {
                metric,
                claimed_pct: pct,
                text: caps.get(0)?.as_str().to_string(),
            })
        })
        .collect()
}

pub fn extract_announcement_language(text: &str, reported: &ReportedFigures) -> AnnouncementLanguage {
    let t = tables();
    let lowered = text.to_lowercase();

    let mut all_claims = claims(&t.revenue_claims, ClaimMetric::RevenueGrowth, &lowered);
    all_claims.extend(claims(&t.profit_claims, ClaimMetric::ProfitGrowth, &lowered));

    let mismatches = all_claims
        .iter()
        .filter_map(|c| {
            let (actual, tolerance) = match c.metric {
                ClaimMetric::RevenueGrowth => (reported.revenue_growth_pct?, REVENUE_MISMATCH_PTS),
                ClaimMetric::ProfitGrowth => (reported.profit_growth_pct?, PROFIT_MISMATCH_PTS),
            };
            let discrepancy = (c.claimed_pct - actual).abs();
            (discrepancy > tolerance).then_some(ClaimMismatch {
                metric: c.metric,
                claimed_pct: c.claimed_pct,
                actual_pct: actual,
                discrepancy,
            })
        })
        .collect();

    let mut regulatory_issues = Vec::new();
    if matches_opt(&t.forward_looking, text) && !matches_opt(&t.forward_looking_disclaimer, text) {
        regulatory_issues.push("Forward-looking statements without proper disclaimers".to_string());
    }
    if matches_opt(&t.absolute_claim, text) {
        regulatory_issues.push("Contains absolute claims or guarantees".to_string());
    }
    if matches_opt(&t.expert_reference, text) && !matches_opt(&t.attribution, text) {
        regulatory_issues.push("References experts or studies without attribution".to_string());
    }

    AnnouncementLanguage {
        exaggerations: occurrences(&t.suspicious, text),
        speculative: occurrences(&t.speculative, text),
        claims: all_claims,
        mismatches,
        regulatory_issues,
    }
}
