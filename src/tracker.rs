// =============================================================================
// Mention & Sentiment Tracker — hourly attention buckets per entity
// =============================================================================
//
// Two bounded histories per entity, both ring buffers (oldest evicted first):
//
//   mentions  : one bucket per wall-clock hour, at most 24 buckets
//   sentiment : timestamped scores in [-1, 1], at most 7 * 24 samples
//
// Spike and shift detection are pure reads over this state.  Everything lives
// behind one coarse `RwLock`; hold times are a map lookup plus a deque push.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{system_clock, Clock};
use crate::types::{AnomalyKind, AnomalySignal};

/// Width of one mention bucket.
pub const MENTION_BUCKET_SECS: i64 = 3600;
/// Mention buckets retained per entity (24 hours).
pub const MENTION_HISTORY_BUCKETS: usize = 24;
/// Sentiment samples retained per entity (7 days of hourly-equivalent samples).
pub const SENTIMENT_HISTORY_SAMPLES: usize = 7 * 24;
/// Default latest/average ratio above which mentions are a spike.
pub const MENTION_SPIKE_THRESHOLD: f64 = 3.0;
/// Default |delta| above which a sentiment shift is significant.
pub const SENTIMENT_SHIFT_THRESHOLD: f64 = 0.3;
/// Minimum samples before a shift is evaluated.
const MIN_SHIFT_SAMPLES: usize = 10;
/// Samples inspected by the pattern detector.
const SENTIMENT_PATTERN_SIZE: usize = 5;

const MENTION_SPIKE_CONFIDENCE: f64 = 0.7;
const SENTIMENT_SHIFT_CONFIDENCE: f64 = 0.7;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionBucket {
    /// `unix_seconds / 3600` of the bucket.
    pub hour: i64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSample {
    pub at: DateTime<Utc>,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentPatternKind {
    ConsistentlyPositive,
    SentimentShift,
    Oscillating,
}

/// A recognised shape in an entity's sentiment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentPattern {
    pub pattern: SentimentPatternKind,
    pub confidence: f64,
    pub description: String,
}

#[derive(Default)]
struct EntityHistory {
    mentions: VecDeque<MentionBucket>,
    sentiment: VecDeque<SentimentSample>,
}

// ---------------------------------------------------------------------------
// MentionTracker
// ---------------------------------------------------------------------------

pub struct MentionTracker {
    entities: RwLock<HashMap<String, EntityHistory>>,
    clock: Arc<dyn Clock>,
    shift_threshold: f64,
}

impl MentionTracker {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            clock,
            shift_threshold: SENTIMENT_SHIFT_THRESHOLD,
        }
    }

    /// Override the |delta| threshold used by `detect_sentiment_shift`.
    pub fn with_shift_threshold(mut self, threshold: f64) -> Self {
        self.shift_threshold = threshold;
        self
    }

    // -------------------------------------------------------------------------
    // Recording
    // -------------------------------------------------------------------------

    /// Count one mention of `entity` in the current hour bucket.
    pub fn record_mention(&self, entity: &str) {
        let hour = self.clock.now().timestamp().div_euclid(MENTION_BUCKET_SECS);
        let mut map = self.entities.write();
        let history = map.entry(entity_key(entity)).or_default();

        match history.mentions.back_mut() {
            Some(last) if last.hour == hour => last.count += 1,
            _ => {
                history.mentions.push_back(MentionBucket { hour, count: 1 });
                while history.mentions.len() > MENTION_HISTORY_BUCKETS {
                    history.mentions.pop_front();
                }
            }
        }
    }

    /// Count a mention and append its sentiment score in one step.
    pub fn record_mention_with_sentiment(&self, entity: &str, score: f64, text: &str) {
        self.record_mention(entity);
        self.record_sentiment(entity, score, text);
    }

    /// Append a sentiment sample.  Scores are clamped to [-1, 1].
    pub fn record_sentiment(&self, entity: &str, score: f64, text: &str) {
        let score = if score.is_finite() {
            score.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let sample = SentimentSample {
            at: self.clock.now(),
            score,
            text: text.to_string(),
        };
        let mut map = self.entities.write();
        let history = map.entry(entity_key(entity)).or_default();
        history.sentiment.push_back(sample);
        while history.sentiment.len() > SENTIMENT_HISTORY_SAMPLES {
            history.sentiment.pop_front();
        }
    }

    // -------------------------------------------------------------------------
    // Detection
    // -------------------------------------------------------------------------

    /// Latest bucket vs. the mean of all earlier buckets.
    ///
    /// Returns `(false, 0.0)` with fewer than two buckets or a zero baseline.
    pub fn detect_mention_spike(&self, entity: &str, threshold: f64) -> (bool, f64) {
        let map = self.entities.read();
        let Some(history) = map.get(&entity_key(entity)) else {
            return (false, 0.0);
        };
        let buckets = &history.mentions;
        if buckets.len() < 2 {
            return (false, 0.0);
        }

        let prior = buckets.len() - 1;
        let prior_sum: u64 = buckets.iter().take(prior).map(|b| b.count).sum();
        let avg = prior_sum as f64 / prior as f64;
        if avg <= 0.0 {
            return (false, 0.0);
        }
        let latest = buckets.back().map_or(0, |b| b.count) as f64;
        let ratio = latest / avg;

        debug!(entity, ratio, threshold, "mention spike check");
        (ratio > threshold, ratio)
    }

    /// Second-half mean minus first-half mean of the sentiment history.
    ///
    /// Needs at least 10 samples; otherwise `(false, 0.0)`.
    pub fn detect_sentiment_shift(&self, entity: &str) -> (bool, f64) {
        let scores = self.sorted_scores(entity);
        if scores.len() < MIN_SHIFT_SAMPLES {
            return (false, 0.0);
        }

        let half = scores.len() / 2;
        let first = mean(&scores[..half]);
        let second = mean(&scores[half..]);
        let delta = second - first;
        (delta.abs() > self.shift_threshold, delta)
    }

    /// Recognise promotional shapes in the sentiment history.
    pub fn detect_sentiment_pattern(&self, entity: &str) -> Option<SentimentPattern> {
        let scores = self.sorted_scores(entity);
        if scores.len() < SENTIMENT_PATTERN_SIZE {
            return None;
        }

        if scores[scores.len() - SENTIMENT_PATTERN_SIZE..]
            .iter()
            .all(|s| *s > 0.5)
        {
            return Some(SentimentPattern {
                pattern: SentimentPatternKind::ConsistentlyPositive,
                confidence: 0.8,
                description: "Consistently positive sentiment may indicate promotional campaign"
                    .to_string(),
            });
        }

        let half = scores.len() / 2;
        let (first, second) = scores.split_at(half);
        if first.len() > 2 && second.len() > 2 && mean(first) < -0.2 && mean(second) > 0.5 {
            return Some(SentimentPattern {
                pattern: SentimentPatternKind::SentimentShift,
                confidence: 0.7,
                description: "Sharp shift from negative to positive sentiment".to_string(),
            });
        }

        if scores.len() >= 6 {
            let diffs: Vec<f64> = scores.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
            if mean(&diffs) > 0.5 {
                return Some(SentimentPattern {
                    pattern: SentimentPatternKind::Oscillating,
                    confidence: 0.6,
                    description: "Highly variable sentiment may indicate manipulation".to_string(),
                });
            }
        }

        None
    }

    /// Tracker findings for `entity` as aggregator-ready signals.
    pub fn signals(&self, entity: &str, spike_threshold: f64) -> Vec<AnomalySignal> {
        let mut out = Vec::new();

        let (spike, ratio) = self.detect_mention_spike(entity, spike_threshold);
        if spike {
            out.push(
                AnomalySignal::new(
                    AnomalyKind::MentionSpike,
                    MENTION_SPIKE_CONFIDENCE,
                    ratio,
                    format!("Unusual spike in social media mentions ({ratio:.1}x normal)"),
                )
                .with_timeframe("last hour"),
            );
        }

        let (shift, delta) = self.detect_sentiment_shift(entity);
        if shift {
            out.push(AnomalySignal::new(
                AnomalyKind::SentimentShift,
                SENTIMENT_SHIFT_CONFIDENCE,
                delta,
                format!("Sentiment shift of {delta:+.2} across the tracked window"),
            ));
        }

        out
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Entities with any recorded mention, sorted.
    pub fn active_entities(&self) -> Vec<String> {
        let map = self.entities.read();
        let mut names: Vec<String> = map
            .iter()
            .filter(|(_, h)| !h.mentions.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        names.sort();
        names
    }

    /// Copy of the mention buckets for `entity` (oldest first).
    pub fn mention_buckets(&self, entity: &str) -> Vec<MentionBucket> {
        self.entities
            .read()
            .get(&entity_key(entity))
            .map(|h| h.mentions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn sentiment_len(&self, entity: &str) -> usize {
        self.entities
            .read()
            .get(&entity_key(entity))
            .map_or(0, |h| h.sentiment.len())
    }

    fn sorted_scores(&self, entity: &str) -> Vec<f64> {
        let map = self.entities.read();
        let Some(history) = map.get(&entity_key(entity)) else {
            return Vec::new();
        };
        let mut samples: Vec<&SentimentSample> = history.sentiment.iter().collect();
        samples.sort_by_key(|s| s.at);
        samples.iter().map(|s| s.score).collect()
    }
}

impl Default for MentionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MentionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentionTracker")
            .field("entities", &self.entities.read().len())
            .field("shift_threshold", &self.shift_threshold)
            .finish()
    }
}

fn entity_key(entity: &str) -> String {
    entity.trim().to_uppercase()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    fn tracker() -> (MentionTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 8, 15, 0).unwrap(),
        ));
        (MentionTracker::with_clock(clock.clone()), clock)
    }

    fn fill_hours(t: &MentionTracker, clock: &ManualClock, entity: &str, counts: &[u64]) {
        for (i, &c) in counts.iter().enumerate() {
            if i > 0 {
                clock.advance(Duration::hours(1));
            }
            for _ in 0..c {
                t.record_mention(entity);
            }
        }
    }

    #[test]
    fn spike_ratio_matches_worked_example() {
        let (t, clock) = tracker();
        fill_hours(&t, &clock, "glenmark", &[5, 5, 5, 20]);
        let (spike, ratio) = t.detect_mention_spike("GLENMARK", MENTION_SPIKE_THRESHOLD);
        assert!(spike);
        assert!((ratio - 4.0).abs() < 1e-9);
    }

    #[test]
    fn identical_buckets_are_not_a_spike() {
        let (t, clock) = tracker();
        fill_hours(&t, &clock, "TCS", &[7, 7, 7, 7, 7]);
        let (spike, ratio) = t.detect_mention_spike("TCS", 3.0);
        assert!(!spike);
        assert!((ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_bucket_reports_no_ratio() {
        let (t, _clock) = tracker();
        for _ in 0..50 {
            t.record_mention("SBIN");
        }
        assert_eq!(t.detect_mention_spike("SBIN", 3.0), (false, 0.0));
        assert_eq!(t.mention_buckets("SBIN").len(), 1);
        assert_eq!(t.detect_mention_spike("UNSEEN", 3.0), (false, 0.0));
    }

    #[test]
    fn buckets_evict_oldest_beyond_retention() {
        let (t, clock) = tracker();
        let counts: Vec<u64> = (1..=30).collect();
        fill_hours(&t, &clock, "INFY", &counts);
        let buckets = t.mention_buckets("INFY");
        assert_eq!(buckets.len(), MENTION_HISTORY_BUCKETS);
        assert_eq!(buckets.first().unwrap().count, 7);
        assert_eq!(buckets.last().unwrap().count, 30);
        assert!(buckets.windows(2).all(|w| w[0].hour < w[1].hour));
    }

    #[test]
    fn sentiment_shift_requires_ten_samples() {
        let (t, _clock) = tracker();
        for _ in 0..9 {
            t.record_sentiment("TCS", 0.9, "up");
        }
        assert_eq!(t.detect_sentiment_shift("TCS"), (false, 0.0));
    }

    #[test]
    fn sentiment_shift_detects_negative_to_positive() {
        let (t, clock) = tracker();
        for _ in 0..5 {
            t.record_sentiment("TCS", -0.2, "meh");
            clock.advance(Duration::minutes(10));
        }
        for _ in 0..5 {
            t.record_sentiment("TCS", 0.8, "moon");
            clock.advance(Duration::minutes(10));
        }
        let (significant, delta) = t.detect_sentiment_shift("TCS");
        assert!(significant);
        assert!((delta - 1.0).abs() < 1e-9);

        let signals = t.signals("TCS", 3.0);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, AnomalyKind::SentimentShift);
        assert!(signals[0].value > 0.0);
    }

    #[test]
    fn sentiment_history_is_bounded() {
        let (t, _clock) = tracker();
        for _ in 0..(SENTIMENT_HISTORY_SAMPLES + 40) {
            t.record_sentiment("X", 2.0, "");
        }
        assert_eq!(t.sentiment_len("X"), SENTIMENT_HISTORY_SAMPLES);
    }

    #[test]
    fn patterns_are_recognised() {
        let (t, clock) = tracker();
        for s in [0.6, 0.7, 0.9, 0.8, 0.6] {
            t.record_sentiment("A", s, "");
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(
            t.detect_sentiment_pattern("A").unwrap().pattern,
            SentimentPatternKind::ConsistentlyPositive
        );

        for s in [-0.5, -0.4, -0.6, 0.9, 0.4, 0.9] {
            t.record_sentiment("B", s, "");
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(
            t.detect_sentiment_pattern("B").unwrap().pattern,
            SentimentPatternKind::SentimentShift
        );

        for s in [0.9, -0.9, 0.9, -0.9, 0.9, -0.9] {
            t.record_sentiment("C", s, "");
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(
            t.detect_sentiment_pattern("C").unwrap().pattern,
            SentimentPatternKind::Oscillating
        );

        assert!(t.detect_sentiment_pattern("unknown").is_none());
    }

    #[test]
    fn active_entities_lists_mentioned_only() {
        let (t, _clock) = tracker();
        t.record_mention("nvda");
        t.record_sentiment("quiet", 0.1, "");
        t.record_mention("aapl");
        assert_eq!(t.active_entities(), vec!["AAPL", "NVDA"]);
    }
}
