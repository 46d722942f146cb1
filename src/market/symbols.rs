// =============================================================================
// Symbol tables — aliases, well-known allow-list, local quick check
// =============================================================================
//
// All lookups here are local and allocation-light; nothing touches the network.
// Symbols are compared upper-cased.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Points removed from a well-known symbol's final score.
pub const WELL_KNOWN_DAMPENING: i32 = 30;

const WELL_KNOWN_ETFS: &[&str] = &["SPY", "QQQ", "VTI", "VOO", "SMH", "DIA", "IWM", "EEM"];
const WELL_KNOWN_INDICES: &[&str] = &["^GSPC", "^DJI", "^IXIC", "^NSEI", "^BSESN"];
const WELL_KNOWN_LARGE_CAPS: &[&str] = &[
    "MSFT", "AAPL", "GOOGL", "GOOG", "AMZN", "NVDA", "META", "TSLA", "TCS", "RELIANCE", "SBIN",
    "INFY", "HDFCBANK",
];
const INDEX_MARKERS: &[&str] = &["S&P", "DOW", "NASDAQ", "NIFTY", "SENSEX", "INDEX", "ETF"];

/// Company and index names mapped to tradable tickers.
const ALIASES: &[(&str, &str)] = &[
    ("GOLDMAN SACHS", "GS"),
    ("MORGAN STANLEY", "MS"),
    ("NVIDIA", "NVDA"),
    ("APPLE", "AAPL"),
    ("MICROSOFT", "MSFT"),
    ("GOOGLE", "GOOGL"),
    ("ALPHABET", "GOOGL"),
    ("AMAZON", "AMZN"),
    ("FACEBOOK", "META"),
    ("TESLA", "TSLA"),
    ("INTEL", "INTC"),
    ("SPDR", "SPY"),
    ("STATE BANK OF INDIA", "SBIN"),
    ("SBI", "SBIN"),
    ("HDFC BANK", "HDFCBANK"),
    ("S&P 500", "^GSPC"),
    ("S&P500", "^GSPC"),
    ("DOW", "^DJI"),
    ("NASDAQ", "^IXIC"),
    ("NIFTY", "^NSEI"),
    ("SENSEX", "^BSESN"),
];

/// Large caps the quick check accepts without any lookup.
const KNOWN_COMMON: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "META", "TSLA", "NVDA", "JPM", "V", "WMT", "JNJ",
    "PG", "MA", "UNH", "HD", "BAC", "XOM", "DIS", "NFLX", "INTC", "AMD", "GS", "MS", "RELIANCE",
    "TCS", "HDFCBANK", "INFY", "ICICIBANK", "HINDUNILVR", "SBIN", "BHARTIARTL", "ITC",
    "KOTAKBANK", "LT", "AXISBANK", "WIPRO", "MARUTI", "TATAMOTORS",
];

/// Substrings typical of fabricated tickers in scam messages.
const SCAM_INDICATORS: &[&str] = &["XYZ", "ABC", "123", "MULTI", "PENNY", "MOON", "QUICK"];

/// Map a company or index name to its ticker; unknown input passes through
/// upper-cased.
pub fn resolve_alias(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    ALIASES
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, ticker)| ticker.to_string())
        .unwrap_or(upper)
}

/// True for major indices, broad ETFs and mega-caps.  Index markers such as
/// `ETF` only count as whole words.
pub fn is_well_known(symbol: &str) -> bool {
    let upper = symbol.trim().to_uppercase();
    let base = base_symbol(&upper);
    if upper.starts_with('^') {
        return true;
    }
    WELL_KNOWN_ETFS
        .iter()
        .chain(WELL_KNOWN_INDICES)
        .chain(WELL_KNOWN_LARGE_CAPS)
        .any(|s| *s == upper || *s == base)
        || upper
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '&')
            .any(|word| INDEX_MARKERS.contains(&word))
}

/// Ticker without an exchange suffix (`TCS.NS` -> `TCS`).
pub fn base_symbol(symbol: &str) -> &str {
    symbol.split('.').next().unwrap_or(symbol)
}

/// Exchange variants tried in order when fetching: bare, NSE, BSE.
pub fn fetch_variants(symbol: &str) -> Vec<String> {
    if symbol.starts_with('^') || symbol.contains('.') {
        return vec![symbol.to_string()];
    }
    vec![
        symbol.to_string(),
        format!("{symbol}.NS"),
        format!("{symbol}.BO"),
    ]
}

// ---------------------------------------------------------------------------
// Quick check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolVerdict {
    Known,
    LikelyFake,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolCheck {
    pub symbol: String,
    pub verdict: SymbolVerdict,
    pub reason: String,
}

/// Classify a symbol from local tables only.
pub fn quick_check(symbol: &str) -> SymbolCheck {
    let upper = symbol.trim().to_uppercase();
    let base = base_symbol(&upper).to_string();

    let (verdict, reason) = if KNOWN_COMMON.contains(&base.as_str()) || is_well_known(&upper) {
        (SymbolVerdict::Known, "listed large cap or index".to_string())
    } else if let Some(hit) = SCAM_INDICATORS.iter().find(|i| base.contains(*i)) {
        (
            SymbolVerdict::LikelyFake,
            format!("contains scam indicator pattern {hit}"),
        )
    } else if base.len() > 10 || base.chars().any(|c| !c.is_ascii_alphanumeric() && c != '&') {
        (
            SymbolVerdict::LikelyFake,
            "not a standard ticker format".to_string(),
        )
    } else {
        (SymbolVerdict::Unknown, "passed basic format checks".to_string())
    };

    SymbolCheck {
        symbol: upper,
        verdict,
        reason,
    }
}
