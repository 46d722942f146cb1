// =============================================================================
// Validation errors — the only failures the engine surfaces to callers
// =============================================================================
//
// Data gaps, timeouts and collaborator failures are all recovered inside the
// engine.  Malformed input is rejected up front, before any task is spawned.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("text must not be empty")]
    EmptyText,

    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("malformed symbol {0:?}")]
    MalformedSymbol(String),

    #[error("unrecognised announcement date {0:?} (expected DD-Mon-YYYY, YYYY-MM-DD or DD-MM-YYYY)")]
    BadDate(String),
}

/// Symbols may carry letters, digits and `. ^ & - _` plus inner spaces
/// (company names such as "S&P 500" are resolved to tickers later).
pub fn validate_symbol(symbol: &str) -> Result<String, ValidationError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    if trimmed.len() > 32
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '^' | '&' | '-' | '_' | ' '))
    {
        return Err(ValidationError::MalformedSymbol(trimmed.to_string()));
    }
    Ok(trimmed.to_uppercase())
}

pub fn validate_text(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    Ok(trimmed)
}
