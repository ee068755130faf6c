//! The remote classifier seam.
//!
//! `PiiClassifier` is the polymorphic interface between the redactor and
//! the remote NLP service, so tests can substitute a fake classifier and
//! the pipeline can run local-only with no classifier at all. The HTTP
//! implementation keeps every call under a bounded timeout — no component
//! may block indefinitely.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use custodia_contracts::config::ClassifierConfig;
use custodia_contracts::error::ClassifierError;
use custodia_contracts::redaction::{RemotePiiEntity, TextAnalysis};

/// Languages the remote classifier supports for PII detection.
///
/// PII coverage is narrower than the analysis features: sentiment, key
/// phrases, and entities accept more languages, but PII spans are only
/// produced for English and Spanish. Japanese text always routes to the
/// local pattern set.
const PII_LANGUAGES: &[&str] = &["en", "es"];

/// Maximum request payload in bytes; longer text is truncated on a char
/// boundary before submission.
const MAX_TEXT_BYTES: usize = 100_000;

/// A remote PII/NLP classifier.
///
/// Implementations must never panic on remote failure — every error is
/// returned as a `ClassifierError` so the redactor can degrade to the
/// local pattern set.
pub trait PiiClassifier: Send + Sync {
    /// Whether PII detection is supported for `language`.
    fn supports_pii(&self, language: &str) -> bool;

    /// Detect PII spans in `text`.
    ///
    /// Returned offsets index into the submitted text. Findings below the
    /// configured confidence threshold are already filtered out.
    fn detect_pii(&self, text: &str, language: &str)
        -> Result<Vec<RemotePiiEntity>, ClassifierError>;

    /// Sentiment / key-phrase / entity analysis.
    fn analyze(&self, text: &str, language: &str) -> Result<TextAnalysis, ClassifierError>;
}

// ── HTTP implementation ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    pii_findings: Vec<RemotePiiEntity>,
    #[serde(flatten)]
    analysis: TextAnalysis,
}

/// Blocking HTTP client for the remote classifier endpoint.
///
/// `POST {endpoint}/analyze` with `{text, language}`; the response carries
/// any subset of `{pii_findings, sentiment, key_phrases, entities}`.
#[derive(Debug)]
pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    confidence_threshold: f64,
}

impl HttpClassifier {
    /// Build a classifier client from configuration.
    ///
    /// Returns `ClassifierError::Unavailable` when no endpoint is
    /// configured or the HTTP client cannot be constructed.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        if config.endpoint.is_empty() {
            return Err(ClassifierError::Unavailable {
                reason: "no classifier endpoint configured".to_string(),
            });
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ClassifierError::Unavailable {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            confidence_threshold: config.confidence_threshold,
        })
    }

    fn call(&self, text: &str, language: &str) -> Result<AnalyzeResponse, ClassifierError> {
        let text = truncate_to_boundary(text, MAX_TEXT_BYTES);
        let response = self
            .client
            .post(format!("{}/analyze", self.endpoint))
            .json(&AnalyzeRequest { text, language })
            .send()
            .map_err(|e| ClassifierError::Unavailable {
                reason: format!("classifier request failed: {}", e),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClassifierError::Throttled {
                reason: format!("classifier returned {}", status),
            });
        }
        if !status.is_success() {
            return Err(ClassifierError::Unavailable {
                reason: format!("classifier returned {}", status),
            });
        }

        response.json().map_err(|e| ClassifierError::Unavailable {
            reason: format!("classifier response malformed: {}", e),
        })
    }
}

impl PiiClassifier for HttpClassifier {
    fn supports_pii(&self, language: &str) -> bool {
        PII_LANGUAGES.contains(&language)
    }

    fn detect_pii(
        &self,
        text: &str,
        language: &str,
    ) -> Result<Vec<RemotePiiEntity>, ClassifierError> {
        if !self.supports_pii(language) {
            return Err(ClassifierError::UnsupportedLanguage {
                language: language.to_string(),
            });
        }
        let response = self.call(text, language)?;
        Ok(response
            .pii_findings
            .into_iter()
            .filter(|e| e.score >= self.confidence_threshold)
            .collect())
    }

    fn analyze(&self, text: &str, language: &str) -> Result<TextAnalysis, ClassifierError> {
        let response = self.call(text, language)?;
        Ok(response.analysis)
    }
}

/// Truncate `text` to at most `max_bytes`, backing up to a char boundary.
fn truncate_to_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    warn!(original_bytes = text.len(), truncated_bytes = end, "classifier input truncated");
    &text[..end]
}
