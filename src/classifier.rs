// =============================================================================
// Text classifier — optional language-model collaborator
// =============================================================================
//
// The engine runs fine without a classifier.  When one is configured, the
// text task calls it under the task's own deadline and attaches the answer to
// the run report as a diagnostic.  It never changes the score, and a failure
// is logged and recorded, nothing more.
//
// SECURITY: the API key is sent as a header and never logged.
// =============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

const PROMPT: &str = "You are a securities-fraud analyst. Classify the message below as \
\"legitimate\", \"suspicious\" or \"fraudulent\", list the companies, tickers or people it \
mentions, and justify briefly. Answer with a single JSON object with keys \
\"classification\", \"entities\" and \"justification\" and nothing else.\n\nMessage:\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub classification: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub justification: String,
}

#[async_trait]
pub trait TextClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HTTP adapter
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HttpClassifier {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(api_key: &str, timeout: std::time::Duration) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key, timeout)
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        api_key: &str,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-goog-api-key",
            HeaderValue::from_str(api_key).context("classifier API key is not a valid header")?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to build classifier HTTP client")?;

        let endpoint = endpoint.into();
        debug!(endpoint = %endpoint, "HttpClassifier initialised");
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl TextClassifier for HttpClassifier {
    #[instrument(skip(self, text), name = "classifier::classify", fields(chars = text.len()))]
    async fn classify(&self, text: &str) -> Result<Classification> {
        let body = json!({
            "contents": [{ "parts": [{ "text": format!("{PROMPT}{text}") }] }]
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("POST generateContent request failed")?;

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .context("failed to parse classifier response")?;
        if !status.is_success() {
            bail!("classifier returned {status}: {payload}");
        }

        let classification = parse_classification(&payload)?;
        debug!(label = %classification.classification, "text classified");
        Ok(classification)
    }

    fn name(&self) -> &str {
        "http"
    }
}

impl std::fmt::Debug for HttpClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClassifier")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Pull the model's answer out of a generateContent response.  The answer
/// text may be wrapped in a markdown code fence.
pub fn parse_classification(payload: &Value) -> Result<Classification> {
    let answer = payload["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .context("classifier response missing candidate text")?;

    let start = answer.find('{').context("classifier answer has no JSON object")?;
    let end = answer.rfind('}').context("classifier answer has no JSON object")?;
    if end < start {
        bail!("classifier answer has malformed JSON object");
    }
    serde_json::from_str(&answer[start..=end]).context("classifier answer is not valid JSON")
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn parses_fenced_answer() {
        let payload = wrap(
            "```json\n{\"classification\": \"fraudulent\", \"entities\": [\"XYZ Ltd\"], \
             \"justification\": \"promises fixed returns\"}\n```",
        );
        let c = parse_classification(&payload).unwrap();
        assert_eq!(c.classification, "fraudulent");
        assert_eq!(c.entities, vec!["XYZ Ltd".to_string()]);
    }

    #[test]
    fn missing_fields_default() {
        let c = parse_classification(&wrap("{\"classification\": \"legitimate\"}")).unwrap();
        assert!(c.entities.is_empty());
        assert!(c.justification.is_empty());
    }

    #[test]
    fn rejects_non_json_answers() {
        assert!(parse_classification(&wrap("I cannot help with that.")).is_err());
        assert!(parse_classification(&json!({ "candidates": [] })).is_err());
    }
}
