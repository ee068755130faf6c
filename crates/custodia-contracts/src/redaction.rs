//! Redaction result types shared between the redactor and the record builder.
//!
//! A `RedactionResult` is produced per masking call and embedded into the
//! audit record's `pii_detection` section — it is never persisted on its own.
//! The result is always honest about which detection tier actually ran:
//! a degraded remote classifier is recorded as `DetectorUsed::LocalPattern`,
//! never silently hidden.

use serde::{Deserialize, Serialize};

/// The PII categories the pipeline can mask.
///
/// The fixed set mirrors the local pattern table; `Remote` carries the type
/// name reported by the remote classifier (e.g. `SSN`, `ADDRESS`) for
/// categories the local patterns do not model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    /// RFC-5322-shaped email address.
    Email,
    /// Japanese domestic phone number (`0xx-xxxx-xxxx` shapes).
    PhoneJp,
    /// International `+81` phone number.
    PhoneIntl,
    /// Japanese My Number (`xxxx-xxxx-xxxx`).
    MyNumber,
    /// Japanese postal code (`xxx-xxxx`).
    ZipCodeJp,
    /// 13–16 digit payment card number with optional separators.
    CreditCard,
    /// Dotted-quad IPv4 address.
    Ipv4,
    /// A category reported by the remote classifier.
    Remote(String),
}

impl PiiCategory {
    /// The fixed placeholder token substituted for spans of this category.
    ///
    /// Placeholders are keyed to the category so distinct PII kinds remain
    /// distinguishable in masked text. Length preservation is explicitly
    /// not attempted.
    pub fn placeholder(&self) -> String {
        match self {
            PiiCategory::Email => "[MASKED_EMAIL]".to_string(),
            PiiCategory::PhoneJp => "[MASKED_PHONE_JP]".to_string(),
            PiiCategory::PhoneIntl => "[MASKED_PHONE_INTL]".to_string(),
            PiiCategory::MyNumber => "[MASKED_MY_NUMBER]".to_string(),
            PiiCategory::ZipCodeJp => "[MASKED_ZIP_CODE_JP]".to_string(),
            PiiCategory::CreditCard => "[MASKED_CREDIT_CARD]".to_string(),
            PiiCategory::Ipv4 => "[MASKED_IPV4]".to_string(),
            PiiCategory::Remote(kind) => format!("[MASKED_{}]", kind.to_uppercase()),
        }
    }
}

/// Which detection tier produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorUsed {
    /// Only the deterministic local pattern set ran (the remote classifier
    /// was disabled, unsupported for the language, or unreachable).
    LocalPattern,
    /// The remote classifier ran and its findings were merged with the
    /// local pattern pass.
    RemoteClassifier,
}

/// How a single span was masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingMethod {
    /// Replaced with the category's fixed placeholder token.
    PlaceholderToken,
}

/// One masked span.
///
/// The original text is not retained — only a SHA-256 hash of the span, so
/// an auditor holding the original can confirm what was masked without the
/// record re-exposing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiFinding {
    /// The category that matched.
    pub category: PiiCategory,

    /// Lowercase SHA-256 hex of the original (unmasked) span bytes.
    pub original_span_hash: String,

    /// How the span was redacted.
    pub masking_method: MaskingMethod,
}

/// The outcome of one masking call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionResult {
    /// The input text with every finding replaced by its placeholder.
    pub masked_text: String,

    /// All masked spans, in the order they were applied.
    pub findings: Vec<PiiFinding>,

    /// Which detection tier actually ran.
    pub detector_used: DetectorUsed,

    /// Count of masked spans. Always equals `findings.len()`.
    pub total_masked: usize,

    /// Fraction of input characters that were PII, rounded to two decimals.
    pub risk_score: f64,

    /// Known precision limits of the tier that ran, stated rather than
    /// hidden (no checksum validation of numeric identifiers, no free-form
    /// narrative PII, no image content).
    pub limitations: String,
}

/// Auxiliary text analysis. Best-effort and independent of masking
/// correctness; an unreachable classifier yields `TextAnalysis::default()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    /// Dominant sentiment with per-class scores, if analysis ran.
    pub sentiment: Option<Sentiment>,

    /// Key phrases by descending confidence.
    #[serde(default)]
    pub key_phrases: Vec<KeyPhrase>,

    /// Named entities (person, location, organization, ...).
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// Sentiment classification from the remote classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// Dominant label: `POSITIVE`, `NEGATIVE`, `NEUTRAL`, or `MIXED`.
    pub label: String,
    /// Confidence for the dominant label, 0.0–1.0.
    pub score: f64,
}

/// A key phrase with classifier confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPhrase {
    pub text: String,
    pub score: f64,
}

/// A named entity with classifier confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity kind: `PERSON`, `LOCATION`, `ORGANIZATION`, `DATE`, ...
    pub kind: String,
    pub text: String,
    pub score: f64,
}

/// A PII span reported by the remote classifier, byte offsets into the
/// original text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePiiEntity {
    /// Classifier's type name for the span (`EMAIL`, `SSN`, ...).
    pub kind: String,
    /// Classifier confidence, 0.0–1.0.
    pub score: f64,
    /// Inclusive start byte offset.
    pub begin_offset: usize,
    /// Exclusive end byte offset.
    pub end_offset: usize,
}
