// =============================================================================
// Risk Aggregator — weighted-additive scoring with hard overrides
// =============================================================================
//
// Evaluation order, identical for both weight tables:
//
//   1. additive weights              (market table or announcement table)
//   2. well-known dampening          -30, floored at 0
//   3. clamp                         [0, 100]
//   4. hard overrides                credibility <= 0.2, high-risk phrases
//   5. classification                >= 70 high, >= 40 medium, else low;
//                                    critical = high score + an override
//
// `flagged` is `score >= FLAG_THRESHOLD || override`.  The flag threshold and
// the medium boundary are separate constants that happen to share a value.
//
// The market table keys on signal kind, not on arrival order: each kind
// contributes at most once and factors are emitted in a fixed kind order, so
// any permutation of the same signals yields the same assessment.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::market::detector::PriceReaction;
use crate::market::symbols::{is_well_known, WELL_KNOWN_DAMPENING};
use crate::text::patterns::tables;
use crate::text::scorer::AnnouncementLanguage;
use crate::types::{AnomalyKind, AnomalySignal, RiskAssessment, RiskFactor, RiskLevel};

pub const FLAG_THRESHOLD: u8 = 40;
pub const MEDIUM_THRESHOLD: u8 = 40;
pub const HIGH_THRESHOLD: u8 = 70;
/// Credibility at or below this forces the misleading verdict.
pub const OVERRIDE_CREDIBILITY: f64 = 0.2;

/// Market/tracker table in factor order.
pub const MARKET_WEIGHTS: &[(AnomalyKind, i32)] = &[
    (AnomalyKind::MentionSpike, 25),
    (AnomalyKind::PriceSpike, 25),
    (AnomalyKind::VolumeSpike, 20),
    (AnomalyKind::PatternMatch, 20),
    (AnomalyKind::SentimentShift, 10),
];

const VERY_LOW_CREDIBILITY: f64 = 0.3;
const LOW_CREDIBILITY: f64 = 0.5;
const VERY_LOW_CREDIBILITY_POINTS: i32 = 60;
const LOW_CREDIBILITY_POINTS: i32 = 40;
const MISMATCH_POINTS: i32 = 30;
const EXAGGERATION_MIN_COUNT: usize = 2;
const EXAGGERATION_PER_TERM: i32 = 5;
const EXAGGERATION_CAP: i32 = 20;
const SPECULATIVE_MIN_COUNT: usize = 2;
const SPECULATIVE_PER_TERM: i32 = 3;
const SPECULATIVE_CAP: i32 = 15;
const PRICE_MOVE_PCT: f64 = 10.0;
const PRICE_MOVE_POINTS: i32 = 20;
const ABNORMAL_VOLUME_POINTS: i32 = 15;
const REGULATORY_POINTS: i32 = 25;
const FAKE_SYMBOL_POINTS: i32 = 90;

/// Inputs to the announcement-verification table.
#[derive(Debug, Clone, Copy)]
pub struct AnnouncementEvidence<'a> {
    pub credibility: f64,
    pub language: &'a AnnouncementLanguage,
    pub reaction: Option<&'a PriceReaction>,
    /// The local symbol check flagged the ticker as likely fabricated.
    pub fake_symbol: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAggregator;

impl RiskAggregator {
    pub fn new() -> Self {
        Self
    }

    // -------------------------------------------------------------------------
    // Market / tracker variant
    // -------------------------------------------------------------------------

    /// Score detector and tracker signals for `subject`.  `credibility` and
    /// `raw_text` only feed the overrides.
    pub fn assess_market(
        &self,
        subject: &str,
        signals: &[AnomalySignal],
        credibility: Option<f64>,
        raw_text: Option<&str>,
    ) -> RiskAssessment {
        let factors = market_factors(signals);
        self.assess_factors(subject, factors, credibility, raw_text)
    }

    // -------------------------------------------------------------------------
    // Announcement variant
    // -------------------------------------------------------------------------

    pub fn assess_announcement(
        &self,
        subject: &str,
        evidence: &AnnouncementEvidence<'_>,
        raw_text: &str,
    ) -> RiskAssessment {
        let factors = announcement_factors(evidence, raw_text);
        self.assess_factors(subject, factors, Some(evidence.credibility), Some(raw_text))
    }

    // -------------------------------------------------------------------------
    // Shared tail: dampening, clamp, overrides, classification
    // -------------------------------------------------------------------------

    pub fn assess_factors(
        &self,
        subject: &str,
        mut factors: Vec<RiskFactor>,
        credibility: Option<f64>,
        raw_text: Option<&str>,
    ) -> RiskAssessment {
        let mut total: i32 = factors.iter().map(|f| f.contribution).sum();

        if is_well_known(subject) && total > 0 {
            debug!(subject, before = total, "dampening well-known symbol");
            factors.push(RiskFactor::new(
                format!("Well-known symbol {subject}: risk reduced"),
                -WELL_KNOWN_DAMPENING,
            ));
            total = (total - WELL_KNOWN_DAMPENING).max(0);
        }
        let score = total.clamp(0, 100) as u8;

        let mut overrides = Vec::new();
        if credibility.is_some_and(|c| c <= OVERRIDE_CREDIBILITY) {
            overrides.push("low_credibility".to_string());
        }
        if let Some(text) = raw_text {
            overrides.extend(tables().overrides.matching(text).map(|r| r.name.to_string()));
        }

        let level = classify(score, !overrides.is_empty());
        let flagged = score >= FLAG_THRESHOLD || !overrides.is_empty();
        if !overrides.is_empty() {
            warn!(subject, score, overrides = ?overrides, "hard override forced misleading verdict");
        }

        RiskAssessment {
            score,
            level,
            factors,
            flagged,
            overrides,
        }
    }
}

/// Level from a clamped score.  Critical needs both a high score and an
/// override.
pub fn classify(score: u8, overridden: bool) -> RiskLevel {
    if score >= HIGH_THRESHOLD {
        if overridden {
            RiskLevel::Critical
        } else {
            RiskLevel::High
        }
    } else if score >= MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn market_factors(signals: &[AnomalySignal]) -> Vec<RiskFactor> {
    MARKET_WEIGHTS
        .iter()
        .filter_map(|&(kind, points)| {
            let lead = signals
                .iter()
                .filter(|s| s.kind == kind)
                // Only a shift towards positive sentiment counts.
                .filter(|s| kind != AnomalyKind::SentimentShift || s.value > 0.0)
                .min_by(|a, b| {
                    b.confidence
                        .total_cmp(&a.confidence)
                        .then_with(|| a.detail.cmp(&b.detail))
                })?;
            Some(RiskFactor::new(describe(lead), points))
        })
        .collect()
}

fn describe(signal: &AnomalySignal) -> String {
    let v = signal.value;
    match signal.kind {
        AnomalyKind::MentionSpike => format!("Unusual spike in social media mentions ({v:.1}x normal)"),
        AnomalyKind::PriceSpike => format!("Abnormal price movement (z-score: {v:.2})"),
        AnomalyKind::VolumeSpike => format!("Unusual trading volume ({v:.1}x normal)"),
        AnomalyKind::PatternMatch => "Matches known pump and dump chart pattern".to_string(),
        AnomalyKind::SentimentShift => format!("Suspicious shift to positive sentiment (+{v:.2})"),
    }
}

fn announcement_factors(evidence: &AnnouncementEvidence<'_>, raw_text: &str) -> Vec<RiskFactor> {
    let mut factors = Vec::new();
    let lang = evidence.language;

    if evidence.fake_symbol {
        factors.push(RiskFactor::new(
            "Potentially fake or non-existent stock symbol commonly used in scams",
            FAKE_SYMBOL_POINTS,
        ));
    }

    let c = evidence.credibility;
    if c < VERY_LOW_CREDIBILITY {
        factors.push(RiskFactor::new(
            format!("Very low credibility score ({c:.2})"),
            VERY_LOW_CREDIBILITY_POINTS,
        ));
    } else if c < LOW_CREDIBILITY {
        factors.push(RiskFactor::new(
            format!("Low credibility score ({c:.2})"),
            LOW_CREDIBILITY_POINTS,
        ));
    }

    if !lang.mismatches.is_empty() {
        factors.push(RiskFactor::new(
            format!(
                "Financial claims don't match reported figures ({} discrepancies)",
                lang.mismatches.len()
            ),
            MISMATCH_POINTS,
        ));
    }

    let n = lang.exaggerations.len();
    if n > EXAGGERATION_MIN_COUNT {
        factors.push(RiskFactor::new(
            format!("Announcement contains {n} exaggerated terms"),
            (n as i32 * EXAGGERATION_PER_TERM).min(EXAGGERATION_CAP),
        ));
    }
    let n = lang.speculative.len();
    if n > SPECULATIVE_MIN_COUNT {
        factors.push(RiskFactor::new(
            format!("Announcement contains {n} speculative terms"),
            (n as i32 * SPECULATIVE_PER_TERM).min(SPECULATIVE_CAP),
        ));
    }

    for rule in tables().announcement_phrases.matching(raw_text) {
        let description = match rule.name {
            "unrealistic_returns" => "Promises unrealistic returns in short timeframe",
            _ => "Contains high-risk terms (multibagger/penny stock)",
        };
        factors.push(RiskFactor::new(description, rule.weight as i32));
    }

    if let Some(r) = evidence.reaction.filter(|r| r.significant) {
        if r.total_change_pct.abs() > PRICE_MOVE_PCT {
            factors.push(RiskFactor::new(
                format!(
                    "Unusual price movement ({:.1}%) following announcement",
                    r.total_change_pct
                ),
                PRICE_MOVE_POINTS,
            ));
        }
        if r.volume_abnormal {
            factors.push(RiskFactor::new(
                format!(
                    "Abnormal trading volume ({:.1}x normal) on announcement",
                    r.volume_ratio
                ),
                ABNORMAL_VOLUME_POINTS,
            ));
        }
    }

    if let Some(first) = lang.regulatory_issues.first() {
        factors.push(RiskFactor::new(
            format!("Potential regulatory issues: {first}"),
            REGULATORY_POINTS,
        ));
    }

    factors
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::scorer::{ClaimMetric, ClaimMismatch, TextSignalScorer};
    use chrono::NaiveDate;

    fn sig(kind: AnomalyKind, confidence: f64, value: f64) -> AnomalySignal {
        AnomalySignal::new(kind, confidence, value, format!("{kind} detail"))
    }

    fn all_kinds() -> Vec<AnomalySignal> {
        vec![
            sig(AnomalyKind::MentionSpike, 0.7, 4.0),
            sig(AnomalyKind::PriceSpike, 0.7, 3.1),
            sig(AnomalyKind::VolumeSpike, 0.6, 2.5),
            sig(AnomalyKind::PatternMatch, 0.8, 0.25),
            sig(AnomalyKind::SentimentShift, 0.7, 0.6),
        ]
    }

    #[test]
    fn market_weights_add_up() {
        let a = RiskAggregator::new().assess_market("ACME", &all_kinds(), None, None);
        assert_eq!(a.score, 100);
        assert_eq!(a.level, RiskLevel::High);
        assert!(a.flagged);
        assert_eq!(a.factors.len(), 5);
        assert_eq!(a.factors[0].description, "Unusual spike in social media mentions (4.0x normal)");
        assert_eq!(a.factors[1].description, "Abnormal price movement (z-score: 3.10)");
        assert_eq!(a.factors[4].description, "Suspicious shift to positive sentiment (+0.60)");
    }

    #[test]
    fn negative_sentiment_shift_adds_nothing() {
        let signals = vec![sig(AnomalyKind::SentimentShift, 0.7, -0.8)];
        let a = RiskAggregator::new().assess_market("ACME", &signals, None, None);
        assert_eq!(a.score, 0);
        assert!(a.factors.is_empty());
    }

    #[test]
    fn duplicate_kinds_count_once() {
        let signals = vec![
            sig(AnomalyKind::PatternMatch, 0.8, 0.3),
            sig(AnomalyKind::PatternMatch, 0.7, 0.1),
        ];
        let a = RiskAggregator::new().assess_market("ACME", &signals, None, None);
        assert_eq!(a.score, 20);
    }

    #[test]
    fn identical_inputs_give_identical_assessments() {
        let agg = RiskAggregator::new();
        let signals = all_kinds();
        let first = agg.assess_market("ACME", &signals, Some(0.4), Some("hot tip"));
        let second = agg.assess_market("ACME", &signals, Some(0.4), Some("hot tip"));
        assert_eq!(first, second);

        let mut reversed = signals.clone();
        reversed.reverse();
        assert_eq!(first, agg.assess_market("ACME", &reversed, Some(0.4), Some("hot tip")));
    }

    #[test]
    fn boundary_forty_and_thirty_nine() {
        let agg = RiskAggregator::new();
        let forty = agg.assess_factors("ACME", vec![RiskFactor::new("x", 40)], None, None);
        assert_eq!(forty.score, 40);
        assert_eq!(forty.level, RiskLevel::Medium);
        assert!(forty.flagged);

        let thirty_nine = agg.assess_factors("ACME", vec![RiskFactor::new("x", 39)], None, None);
        assert_eq!(thirty_nine.level, RiskLevel::Low);
        assert!(!thirty_nine.flagged);
    }

    #[test]
    fn well_known_subject_loses_exactly_thirty() {
        let agg = RiskAggregator::new();
        for signals in [
            all_kinds(),
            vec![
                sig(AnomalyKind::VolumeSpike, 0.6, 2.5),
                sig(AnomalyKind::PatternMatch, 0.8, 0.25),
            ],
        ] {
            let unknown = agg.assess_market("ACME", &signals, None, None);
            let index = agg.assess_market("^GSPC", &signals, None, None);
            assert_eq!(unknown.score - index.score, 30);
        }

        let small = vec![sig(AnomalyKind::VolumeSpike, 0.6, 2.5)];
        assert_eq!(agg.assess_market("SPY", &small, None, None).score, 0);
    }

    #[test]
    fn scam_phrase_forces_flag_regardless_of_score() {
        let text = "guaranteed 300% returns in 5 days";
        let analysis = TextSignalScorer::standalone().analyze(text);
        assert!(analysis.pump_language.is_pump_and_dump);
        assert!(analysis.pump_language.confidence >= 0.9);

        let a = RiskAggregator::new().assess_market(
            "ACME",
            &[],
            Some(analysis.credibility.score),
            Some(text),
        );
        assert_eq!(a.score, 0);
        assert!(a.flagged);
        assert!(a.overrides.contains(&"low_credibility".to_string()));
        assert!(a.overrides.contains(&"triple_digit_return".to_string()));
    }

    #[test]
    fn critical_needs_high_score_and_override() {
        assert_eq!(classify(85, true), RiskLevel::Critical);
        assert_eq!(classify(85, false), RiskLevel::High);
        assert_eq!(classify(50, true), RiskLevel::Medium);
    }

    #[test]
    fn announcement_table() {
        let language = AnnouncementLanguage {
            exaggerations: vec!["massive".into(); 5],
            speculative: vec!["may".into(); 3],
            mismatches: vec![ClaimMismatch {
                metric: ClaimMetric::RevenueGrowth,
                claimed_pct: 40.0,
                actual_pct: 10.0,
                discrepancy: 30.0,
            }],
            regulatory_issues: vec!["Contains absolute claims or guarantees".into()],
            ..Default::default()
        };
        let reaction = PriceReaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            pre_close: 100.0,
            day_close: 108.0,
            next_close: 112.0,
            day_of_change_pct: 8.0,
            next_day_change_pct: 3.7,
            total_change_pct: 12.0,
            volume_ratio: 4.0,
            volume_abnormal: true,
            volatility_before_pct: 10.0,
            volatility_after_pct: 30.0,
            significant: true,
        };
        let evidence = AnnouncementEvidence {
            credibility: 0.45,
            language: &language,
            reaction: Some(&reaction),
            fake_symbol: false,
        };
        let a = RiskAggregator::new().assess_announcement("ACME", &evidence, "plain text");
        let contributions: Vec<i32> = a.factors.iter().map(|f| f.contribution).collect();
        // credibility, mismatch, exaggeration, speculative, price, volume, regulatory
        assert_eq!(contributions, vec![40, 30, 20, 9, 20, 15, 25]);
        assert_eq!(a.score, 100);
        assert!(a.overrides.is_empty());
        assert_eq!(a.level, RiskLevel::High);
    }

    #[test]
    fn announcement_phrase_rules() {
        let language = AnnouncementLanguage::default();
        let evidence = AnnouncementEvidence {
            credibility: 0.9,
            language: &language,
            reaction: None,
            fake_symbol: false,
        };
        let a = RiskAggregator::new().assess_announcement(
            "ACME",
            &evidence,
            "This multibagger will give 60% returns in 10 days",
        );
        assert_eq!(a.score, 100);
        assert_eq!(a.factors.len(), 2);
        assert!(a.flagged);
    }
}
