// =============================================================================
// Runtime Configuration — engine thresholds, timeouts and watchlist
// =============================================================================
//
// Every tunable number the engine reads lives here.  The defaults reproduce
// the observable contract (TTLs, spike thresholds, retry policy); a JSON file
// only needs the fields it wants to change.
//
// Persistence uses an atomic tmp + rename pattern.  All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{
    ANNOUNCEMENT_ROUTE_TTL_SECS, API_TTL_SECS, DEFAULT_TTL_SECS, MARKET_ROUTE_TTL_SECS,
};
use crate::market::detector::{
    DetectorConfig, LOOKBACK_DAYS, VOLATILITY_WINDOW, VOLUME_SPIKE_THRESHOLD, Z_SCORE_THRESHOLD,
};
use crate::market::source::FetchPolicy;
use crate::orchestrator::GLOBAL_TIMEOUT_SECS;
use crate::tracker::{MENTION_SPIKE_THRESHOLD, SENTIMENT_SHIFT_THRESHOLD};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_api_ttl_secs() -> u64 {
    API_TTL_SECS
}

fn default_market_route_ttl_secs() -> u64 {
    MARKET_ROUTE_TTL_SECS
}

fn default_announcement_route_ttl_secs() -> u64 {
    ANNOUNCEMENT_ROUTE_TTL_SECS
}

fn default_mention_spike_threshold() -> f64 {
    MENTION_SPIKE_THRESHOLD
}

fn default_sentiment_shift_threshold() -> f64 {
    SENTIMENT_SHIFT_THRESHOLD
}

fn default_z_score_threshold() -> f64 {
    Z_SCORE_THRESHOLD
}

fn default_volume_spike_threshold() -> f64 {
    VOLUME_SPIKE_THRESHOLD
}

fn default_lookback_days() -> usize {
    LOOKBACK_DAYS
}

fn default_volatility_window() -> usize {
    VOLATILITY_WINDOW
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_fetch_backoff_ms() -> u64 {
    1000
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_stock_timeout_secs() -> u64 {
    5
}

fn default_global_timeout_secs() -> u64 {
    GLOBAL_TIMEOUT_SECS
}

fn default_watchlist() -> Vec<String> {
    ["AAPL", "MSFT", "TSLA", "RELIANCE", "TCS"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// =============================================================================
// EngineConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Cache lifetimes ----------------------------------------------------

    /// General cache TTL, applied to text-analysis results.
    #[serde(default = "default_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// TTL for collaborator responses (stock series).
    #[serde(default = "default_api_ttl_secs")]
    pub api_ttl_secs: u64,

    /// TTL for cached symbol-analysis results.
    #[serde(default = "default_market_route_ttl_secs")]
    pub market_route_ttl_secs: u64,

    /// TTL for cached announcement verifications.
    #[serde(default = "default_announcement_route_ttl_secs")]
    pub announcement_route_ttl_secs: u64,

    // --- Detector thresholds ------------------------------------------------

    /// Latest mention bucket / mean of prior buckets.
    #[serde(default = "default_mention_spike_threshold")]
    pub mention_spike_threshold: f64,

    #[serde(default = "default_sentiment_shift_threshold")]
    pub sentiment_shift_threshold: f64,

    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,

    #[serde(default = "default_volume_spike_threshold")]
    pub volume_spike_threshold: f64,

    /// Rows excluded from the volume baseline.
    #[serde(default = "default_lookback_days")]
    pub volume_lookback_days: usize,

    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,

    // --- Market-data collaborator -------------------------------------------

    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    #[serde(default = "default_fetch_backoff_ms")]
    pub fetch_backoff_ms: u64,

    /// Deadline for one fetch attempt.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Deadline for the whole stock task of one verification.
    #[serde(default = "default_stock_timeout_secs")]
    pub stock_timeout_secs: u64,

    // --- Orchestration ------------------------------------------------------

    #[serde(default = "default_global_timeout_secs")]
    pub global_timeout_secs: u64,

    /// Weekly bars and a ±14 day window instead of daily bars and ±30 days.
    #[serde(default = "default_true")]
    pub fast_mode: bool,

    /// Symbols covered by a batch scan.
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,

    /// Call the language-model classifier when a key is available.
    #[serde(default = "default_true")]
    pub classifier_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_ttl_secs(),
            api_ttl_secs: default_api_ttl_secs(),
            market_route_ttl_secs: default_market_route_ttl_secs(),
            announcement_route_ttl_secs: default_announcement_route_ttl_secs(),
            mention_spike_threshold: default_mention_spike_threshold(),
            sentiment_shift_threshold: default_sentiment_shift_threshold(),
            z_score_threshold: default_z_score_threshold(),
            volume_spike_threshold: default_volume_spike_threshold(),
            volume_lookback_days: default_lookback_days(),
            volatility_window: default_volatility_window(),
            fetch_attempts: default_fetch_attempts(),
            fetch_backoff_ms: default_fetch_backoff_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            stock_timeout_secs: default_stock_timeout_secs(),
            global_timeout_secs: default_global_timeout_secs(),
            fast_mode: true,
            watchlist: default_watchlist(),
            classifier_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            watchlist = ?config.watchlist,
            fast_mode = config.fast_mode,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist to `path` via a `.tmp` sibling and a rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    // --- Derived component settings -----------------------------------------

    pub fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            lookback_days: self.volume_lookback_days,
            volume_spike_threshold: self.volume_spike_threshold,
            z_score_threshold: self.z_score_threshold,
            volatility_window: self.volatility_window,
        }
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            attempts: self.fetch_attempts.max(1),
            backoff: Duration::from_millis(self.fetch_backoff_ms),
            attempt_timeout: Duration::from_secs(self.fetch_timeout_secs),
            cache_ttl: Duration::from_secs(self.api_ttl_secs),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn stock_timeout(&self) -> Duration {
        Duration::from_secs(self.stock_timeout_secs)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.cache_ttl_secs, 3600);
        assert_eq!(cfg.api_ttl_secs, 300);
        assert_eq!(cfg.market_route_ttl_secs, 600);
        assert_eq!(cfg.announcement_route_ttl_secs, 1800);
        assert!((cfg.mention_spike_threshold - 3.0).abs() < f64::EPSILON);
        assert!((cfg.sentiment_shift_threshold - 0.3).abs() < f64::EPSILON);
        assert!((cfg.z_score_threshold - 2.5).abs() < f64::EPSILON);
        assert!((cfg.volume_spike_threshold - 2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.fetch_attempts, 3);
        assert_eq!(cfg.global_timeout_secs, 15);
        assert!(cfg.fast_mode);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "fast_mode": false, "watchlist": ["INFY"], "fetch_attempts": 0 }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.fast_mode);
        assert_eq!(cfg.watchlist, vec!["INFY"]);
        assert_eq!(cfg.volume_lookback_days, 5);
        // At least one attempt is always made.
        assert_eq!(cfg.fetch_policy().attempts, 1);
    }

    #[test]
    fn derived_settings() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.detector(), DetectorConfig::default());
        let policy = cfg.fetch_policy();
        assert_eq!(policy.backoff, Duration::from_secs(1));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(10));
        assert_eq!(policy.cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.stock_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn cache_ttl_follows_the_file() {
        let cfg: EngineConfig = serde_json::from_str(r#"{ "cache_ttl_secs": 90 }"#).unwrap();
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(90));
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("risk-config-{}.json", uuid::Uuid::new_v4()));
        let mut cfg = EngineConfig::default();
        cfg.watchlist = vec!["XYZ".into()];
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(!path.with_extension("json.tmp").exists());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("absent-{}.json", uuid::Uuid::new_v4()));
        assert!(EngineConfig::load(&path).is_err());
    }
}
