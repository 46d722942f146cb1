// =============================================================================
// Pattern tables — every word list and regex rule the text scorers use
// =============================================================================
//
// Tables are plain static data: (name, pattern, weight).  The meaning of
// `weight` is per table and documented on each one.  Regexes are compiled
// once, case-insensitive, on first use.  A rule that fails to compile is
// logged and skipped; the tests assert every table compiles in full.
// =============================================================================

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

// ---------------------------------------------------------------------------
// Word lists (substring match against whitespace-split words)
// ---------------------------------------------------------------------------

pub const POSITIVE_WORDS: &[&str] = &[
    "growth", "profit", "increase", "success", "positive", "strong", "gain", "improved", "higher",
    "excellence", "innovative", "leading", "expansion", "opportunity", "strategic", "favorable",
    "beneficial", "advantage",
];

pub const NEGATIVE_WORDS: &[&str] = &[
    "loss", "decline", "decrease", "negative", "weak", "fall", "deteriorate", "lower", "poor",
    "challenge", "difficult", "adverse", "uncertainty", "delay", "litigation", "risk", "concern",
    "problem",
];

pub const NEUTRAL_WORDS: &[&str] = &[
    "announce", "report", "state", "inform", "disclose", "update", "notify", "declare",
    "communicate", "release", "issue", "publish", "present",
];

pub const MISLEADING_INDICATORS: &[&str] = &[
    "unprecedented", "revolutionary", "game-changing", "guaranteed", "breakthrough", "dramatic",
    "massive", "spectacular", "extraordinary", "industry-leading", "blockbuster", "disruptive",
];

pub const VAGUE_INDICATORS: &[&str] = &[
    "exploring", "considering", "evaluating", "potential", "possible", "may", "might", "could",
    "preliminary", "non-binding",
];

// ---------------------------------------------------------------------------
// Keyword lists (word-boundary regex, occurrences counted)
// ---------------------------------------------------------------------------

pub const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "record breaking", "unprecedented", "revolutionary", "game[ -]?changing", "breakthrough",
    "extraordinary", "massive", "tremendous", "spectacular", "guaranteed", "assured", "certain",
    "landmark", "blockbuster", "industry[ -]?leading", "first[- ]ever", "highest[- ]ever",
    "best[- ]ever", "transformational", "disruptive",
];

pub const SPECULATIVE_KEYWORDS: &[&str] = &[
    "exploring", "considering", "evaluating", "potential", "possible", "may", "might", "could",
    "looking into", "preliminary", "non-binding", "letter of intent",
    "memorandum of understanding", "proposed", "anticipated", "expected",
];

// ---------------------------------------------------------------------------
// Rule tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PatternRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub weight: f64,
}

const fn rule(name: &'static str, pattern: &'static str, weight: f64) -> PatternRule {
    PatternRule { name, pattern, weight }
}

/// Percent return promised over a short horizon.
pub const SHORT_HORIZON_RETURN: &str =
    r"(\d{2,3})%\s*returns?\s*(in|within)?\s*\d+\s*(days?|weeks?|months?)";

/// At least 50 % promised within days or weeks.
pub const UNREALISTIC_RETURN: &str =
    r"([5-9][0-9]|[1-9][0-9]{2,})%\s*returns?\s*(in|within)?\s*\d+\s*(days?|weeks?)";

/// Credibility scam rules.  Each match costs 0.15 (capped at 0.6 in total);
/// `weight` is the extra penalty for the high-risk subset.
pub const SCAM_RULES: &[PatternRule] = &[
    rule("short_horizon_return", SHORT_HORIZON_RETURN, 0.2),
    rule("multibagger", r"multibagger", 0.2),
    rule("penny_stock", r"penny\s*stock", 0.2),
    rule("tip", r"tip|hot\s*tip|stock\s*tip", 0.0),
    rule("guaranteed_returns", r"(guarantee|assured|certain)\s*(returns|profits)", 0.2),
    rule("pre_ipo", r"pre-?ipo", 0.0),
    rule("huge_profit", r"huge\s*profit|big\s*profit", 0.0),
    rule("unbelievable_returns", r"unbelievable\s*returns?", 0.0),
    rule("urgency", r"act\s*fast|act\s*now|don'?t\s*miss", 0.0),
    rule("sure_profit", r"sure\s*profit", 0.0),
    rule("chat_group", r"whatsapp|telegram\s*group", 0.0),
    rule("free_trading", r"free\s*trading|zero\s*brokerage", 0.0),
    rule("exclusive_offer", r"exclusive\s*offer", 0.0),
    rule("limited_offer", r"limited\s*seats|limited\s*time", 0.0),
    rule("double_money", r"double\s*your\s*money", 0.2),
    rule("target_price", r"target\s*price", 0.0),
    rule("buy_sell_now", r"buy\s*now|sell\s*now", 0.0),
];

/// Pump-and-dump language.  `weight` is the salience boost for the rule.
pub const PUMP_RULES: &[PatternRule] = &[
    rule("unrealistic_returns", SHORT_HORIZON_RETURN, 0.3),
    rule("multibagger", r"multibagger", 0.3),
    rule("penny_stock", r"penny\s*stock", 0.0),
    rule(
        "guaranteed_returns",
        r"(guarantee[ds]?|assured|certain)\s*(\d{1,4}%\s*)?(returns?|profits?)",
        0.0,
    ),
    rule("double_money", r"double\s*your\s*money", 0.0),
    rule("urgency", r"act\s*fast|act\s*now|don'?t\s*miss|limited\s*time|opportunity|hurry", 0.0),
    rule("target_price", r"target\s*price", 0.0),
    rule("secret_info", r"(insider|secret|exclusive)\s*(tip|information|news)", 0.0),
    rule("quick_profit", r"quick\s*(profit|gain|return|money)", 0.0),
    rule("hot_tip", r"hot\s*tip", 0.0),
];

/// Rule pairs that add 0.4 to pump confidence when both match.  The boost is
/// applied once even if several pairs match.
pub const PUMP_COMBINATIONS: &[(&str, &[&str])] = &[
    ("penny_stock", &["unrealistic_returns", "guaranteed_returns", "quick_profit"]),
    ("guaranteed_returns", &["unrealistic_returns"]),
];

/// Phrases that force the misleading verdict regardless of score.
pub const OVERRIDE_RULES: &[PatternRule] = &[
    rule("multibagger_penny_stock", r"multibagger\s+penny\s+stock", 0.0),
    rule("triple_digit_return", r"([1-9][0-9]{2,})%\s*returns?\s*in", 0.0),
    rule("guaranteed_profit", r"guaranteed\s+profit", 0.0),
    rule("pump_and_dump", r"pump\s+and\s+dump", 0.0),
];

/// Announcement phrase rules.  `weight` is risk points.
pub const ANNOUNCEMENT_PHRASE_RULES: &[PatternRule] = &[
    rule("high_risk_terms", r"multibagger|penny\s*stock", 50.0),
    rule("unrealistic_returns", UNREALISTIC_RETURN, 70.0),
];

/// Revenue growth claims; capture group 1 is the percentage.
pub const REVENUE_CLAIM_RULES: &[PatternRule] = &[
    rule("revenue_up", r"revenue up (\d+(?:\.\d+)?)%", 0.0),
    rule("revenue_growth_of", r"revenue growth of (\d+(?:\.\d+)?)%", 0.0),
    rule("revenue_increased_by", r"revenue increased by (\d+(?:\.\d+)?)%", 0.0),
    rule("sales_up", r"sales up (\d+(?:\.\d+)?)%", 0.0),
];

/// Profit growth claims; capture group 1 is the percentage.
pub const PROFIT_CLAIM_RULES: &[PatternRule] = &[
    rule("profit_up", r"profit up (\d+(?:\.\d+)?)%", 0.0),
    rule("profit_growth_of", r"profit growth of (\d+(?:\.\d+)?)%", 0.0),
    rule("profit_increased_by", r"profit increased by (\d+(?:\.\d+)?)%", 0.0),
    rule("net_income_up", r"net income up (\d+(?:\.\d+)?)%", 0.0),
    rule("earnings_up", r"earnings up (\d+(?:\.\d+)?)%", 0.0),
];

pub const FORWARD_LOOKING: &str = r"will\s+(?:be|reach|achieve|grow|increase)";
pub const FORWARD_LOOKING_DISCLAIMER: &str = r"forward[ -]looking|projection";
pub const ABSOLUTE_CLAIM: &str = r"best|guaranteed|certain|assured";
pub const EXPERT_REFERENCE: &str = r"experts|analysts|studies show";
pub const ATTRIBUTION: &str = r"according to|cited|referenced|published";

// ---------------------------------------------------------------------------
// Compiled sets
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CompiledRule {
    pub name: &'static str,
    pub regex: Regex,
    pub weight: f64,
}

#[derive(Debug, Default)]
pub struct PatternSet {
    rules: Vec<CompiledRule>,
}

impl PatternSet {
    pub fn compile(table: &[PatternRule]) -> Self {
        let rules = table
            .iter()
            .filter_map(|r| match compile_ci(r.pattern) {
                Some(regex) => Some(CompiledRule {
                    name: r.name,
                    regex,
                    weight: r.weight,
                }),
                None => {
                    warn!(rule = r.name, "pattern rule skipped");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Word-boundary keyword set; each keyword is its own rule.
    pub fn keywords(words: &[&'static str]) -> Self {
        let rules = words
            .iter()
            .filter_map(|&w| {
                compile_ci(&format!(r"\b{w}\b")).map(|regex| CompiledRule {
                    name: w,
                    regex,
                    weight: 1.0,
                })
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules with at least one match, in table order.
    pub fn matching<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a CompiledRule> + 'a {
        self.rules.iter().filter(move |r| r.regex.is_match(text))
    }

    pub fn any_match(&self, text: &str) -> bool {
        self.rules.iter().any(|r| r.regex.is_match(text))
    }
}

/// Compile a single case-insensitive regex, logging failures.
pub fn compile_ci(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "invalid regex");
            None
        }
    }
}

/// All compiled tables, built once per process.
#[derive(Debug)]
pub struct PatternTables {
    pub scam: PatternSet,
    pub pump: PatternSet,
    pub overrides: PatternSet,
    pub announcement_phrases: PatternSet,
    pub unrealistic_return: PatternSet,
    pub suspicious: PatternSet,
    pub speculative: PatternSet,
    pub revenue_claims: PatternSet,
    pub profit_claims: PatternSet,
    pub forward_looking: Option<Regex>,
    pub forward_looking_disclaimer: Option<Regex>,
    pub absolute_claim: Option<Regex>,
    pub expert_reference: Option<Regex>,
    pub attribution: Option<Regex>,
}

pub fn tables() -> &'static PatternTables {
    static TABLES: OnceLock<PatternTables> = OnceLock::new();
    TABLES.get_or_init(|| PatternTables {
        scam: PatternSet::compile(SCAM_RULES),
        pump: PatternSet::compile(PUMP_RULES),
        overrides: PatternSet::compile(OVERRIDE_RULES),
        announcement_phrases: PatternSet::compile(ANNOUNCEMENT_PHRASE_RULES),
        unrealistic_return: PatternSet::compile(&[rule("unrealistic_return", UNREALISTIC_RETURN, 0.5)]),
        suspicious: PatternSet::keywords(SUSPICIOUS_KEYWORDS),
        speculative: PatternSet::keywords(SPECULATIVE_KEYWORDS),
        revenue_claims: PatternSet::compile(REVENUE_CLAIM_RULES),
        profit_claims: PatternSet::compile(PROFIT_CLAIM_RULES),
        forward_looking: compile_ci(FORWARD_LOOKING),
        forward_looking_disclaimer: compile_ci(FORWARD_LOOKING_DISCLAIMER),
        absolute_claim: compile_ci(ABSOLUTE_CLAIM),
        expert_reference: compile_ci(EXPERT_REFERENCE),
        attribution: compile_ci(ATTRIBUTION),
    })
}

/// True when the regex compiled and matches.
pub fn matches_opt(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(text))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_compiles_in_full() {
        let t = tables();
        assert_eq!(t.scam.len(), 17);
        assert_eq!(t.pump.len(), 10);
        assert_eq!(t.overrides.len(), OVERRIDE_RULES.len());
        assert_eq!(t.announcement_phrases.len(), 2);
        assert_eq!(t.unrealistic_return.len(), 1);
        assert_eq!(t.suspicious.len(), SUSPICIOUS_KEYWORDS.len());
        assert_eq!(t.speculative.len(), SPECULATIVE_KEYWORDS.len());
        assert_eq!(t.revenue_claims.len(), 4);
        assert_eq!(t.profit_claims.len(), 5);
        assert!(t.forward_looking.is_some());
        assert!(t.forward_looking_disclaimer.is_some());
        assert!(t.absolute_claim.is_some());
        assert!(t.expert_reference.is_some());
        assert!(t.attribution.is_some());
    }

    #[test]
    fn high_risk_subset_is_five_rules() {
        assert_eq!(SCAM_RULES.iter().filter(|r| r.weight > 0.0).count(), 5);
    }

    #[test]
    fn unrealistic_return_threshold_is_fifty_percent() {
        let set = &tables().unrealistic_return;
        assert!(set.any_match("50% returns in 10 days"));
        assert!(set.any_match("Get 300% return within 2 weeks"));
        assert!(!set.any_match("49% returns in 10 days"));
        assert!(!set.any_match("80% returns in 3 months"));
    }

    #[test]
    fn keyword_sets_respect_word_boundaries() {
        let t = tables();
        assert!(t.speculative.any_match("The board may approve"));
        assert!(!t.speculative.any_match("Mayor visits plant"));
        assert!(t.suspicious.any_match("a GAME-CHANGING launch"));
    }

    #[test]
    fn override_phrases() {
        let o = &tables().overrides;
        assert!(o.any_match("guaranteed 300% returns in 5 days"));
        assert!(o.any_match("Classic Pump and Dump"));
        assert!(!o.any_match("quarterly results announced"));
    }
}
