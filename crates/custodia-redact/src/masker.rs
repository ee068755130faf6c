//! The layered redactor.
//!
//! Masking never fails: every remote-classifier error degrades to the
//! local pattern set, and the result records which tier actually ran.
//! The local patterns run unconditionally — even after a successful remote
//! pass — so locale-specific identifiers the remote tier does not cover
//! are still caught. Overlapping spans are de-duplicated in the remote
//! tier's favor simply by applying remote spans first: once a span is a
//! placeholder, no local pattern can match inside it.

use tracing::{debug, warn};

use custodia_contracts::redaction::{
    DetectorUsed, MaskingMethod, PiiCategory, PiiFinding, RedactionResult, RemotePiiEntity,
    TextAnalysis,
};

use crate::classifier::PiiClassifier;
use crate::patterns::{apply_local_patterns, hash_span};

/// Precision limits of the current detection tiers, carried verbatim in
/// every result so the record is honest about what was not checked.
const KNOWN_LIMITATIONS: &str = "no checksum validation of numeric identifiers; \
     free-form narrative PII and image content are not detected";

/// The PII redactor.
///
/// Holds an optional remote classifier; without one, masking is local-only
/// and `analyze` returns an empty analysis.
pub struct Redactor {
    classifier: Option<Box<dyn PiiClassifier>>,
}

impl Redactor {
    /// A local-pattern-only redactor.
    pub fn local_only() -> Self {
        Self { classifier: None }
    }

    /// A redactor that augments the local patterns with a remote classifier.
    pub fn with_classifier(classifier: Box<dyn PiiClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    /// Mask PII in `text`.
    ///
    /// The remote classifier is consulted only when `use_remote` is set, a
    /// classifier is configured, and it supports PII for `language`; in
    /// every other case — including any remote failure — detection falls
    /// back to the local pattern set and the result says so via
    /// `detector_used`.
    pub fn mask(&self, text: &str, language: &str, use_remote: bool) -> RedactionResult {
        let total_chars = text.chars().count();
        let mut working = text.to_string();
        let mut findings: Vec<PiiFinding> = Vec::new();
        let mut masked_chars = 0usize;
        let mut detector_used = DetectorUsed::LocalPattern;

        if use_remote {
            match self.remote_entities(text, language) {
                Ok(entities) => {
                    detector_used = DetectorUsed::RemoteClassifier;
                    let (masked, remote_findings, chars) = apply_remote_entities(&working, entities);
                    working = masked;
                    findings.extend(remote_findings);
                    masked_chars += chars;
                }
                Err(e) => {
                    warn!(error = %e, language, "remote PII detection degraded to local patterns");
                }
            }
        }

        // Local patterns always run, over the (possibly already masked)
        // working text.
        let (masked, local_findings, chars) = apply_local_patterns(&working);
        working = masked;
        findings.extend(local_findings);
        masked_chars += chars;

        let total_masked = findings.len();
        debug!(total_masked, detector = ?detector_used, "masking complete");

        RedactionResult {
            masked_text: working,
            findings,
            detector_used,
            total_masked,
            risk_score: risk_score(masked_chars, total_chars),
            limitations: KNOWN_LIMITATIONS.to_string(),
        }
    }

    /// Auxiliary sentiment / key-phrase / entity analysis.
    ///
    /// Best-effort: any classifier failure (or no classifier at all) yields
    /// an empty `TextAnalysis` and never affects the masking path.
    pub fn analyze(&self, text: &str, language: &str) -> TextAnalysis {
        let Some(classifier) = self.classifier.as_deref() else {
            return TextAnalysis::default();
        };
        match classifier.analyze(text, language) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, language, "text analysis unavailable");
                TextAnalysis::default()
            }
        }
    }

    fn remote_entities(
        &self,
        text: &str,
        language: &str,
    ) -> Result<Vec<RemotePiiEntity>, custodia_contracts::error::ClassifierError> {
        use custodia_contracts::error::ClassifierError;

        let Some(classifier) = self.classifier.as_deref() else {
            return Err(ClassifierError::Unavailable {
                reason: "no classifier configured".to_string(),
            });
        };
        if !classifier.supports_pii(language) {
            return Err(ClassifierError::UnsupportedLanguage {
                language: language.to_string(),
            });
        }
        classifier.detect_pii(text, language)
    }
}

/// Replace remote-reported spans with placeholders, highest offset first so
/// earlier offsets stay valid.
fn apply_remote_entities(
    text: &str,
    mut entities: Vec<RemotePiiEntity>,
) -> (String, Vec<PiiFinding>, usize) {
    entities.sort_by(|a, b| b.begin_offset.cmp(&a.begin_offset));

    let mut masked = text.to_string();
    let mut findings = Vec::new();
    let mut masked_chars = 0usize;

    for entity in entities {
        let (start, end) = (entity.begin_offset, entity.end_offset);
        if start >= end
            || end > masked.len()
            || !masked.is_char_boundary(start)
            || !masked.is_char_boundary(end)
        {
            warn!(kind = %entity.kind, start, end, "discarding remote finding with invalid offsets");
            continue;
        }

        let category = PiiCategory::Remote(entity.kind);
        let span = &masked[start..end];
        masked_chars += span.chars().count();
        findings.push(PiiFinding {
            category: category.clone(),
            original_span_hash: hash_span(span),
            masking_method: MaskingMethod::PlaceholderToken,
        });
        masked.replace_range(start..end, &category.placeholder());
    }

    (masked, findings, masked_chars)
}

/// Fraction of input characters that were PII, two-decimal rounded and
/// clamped to 1.0. Empty input scores 0.0.
fn risk_score(masked_chars: usize, total_chars: usize) -> f64 {
    if total_chars == 0 {
        return 0.0;
    }
    let raw = (masked_chars as f64 / total_chars as f64).min(1.0);
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_contracts::error::ClassifierError;

    // ── Fakes ─────────────────────────────────────────────────────────────────

    /// A classifier that reports fixed PII spans for English text.
    struct FakeClassifier {
        entities: Vec<RemotePiiEntity>,
    }

    impl PiiClassifier for FakeClassifier {
        fn supports_pii(&self, language: &str) -> bool {
            language == "en" || language == "es"
        }

        fn detect_pii(
            &self,
            _text: &str,
            _language: &str,
        ) -> Result<Vec<RemotePiiEntity>, ClassifierError> {
            Ok(self.entities.clone())
        }

        fn analyze(&self, _text: &str, _language: &str) -> Result<TextAnalysis, ClassifierError> {
            Ok(TextAnalysis {
                sentiment: Some(custodia_contracts::redaction::Sentiment {
                    label: "NEUTRAL".to_string(),
                    score: 0.8,
                }),
                key_phrases: Vec::new(),
                entities: Vec::new(),
            })
        }
    }

    /// A classifier that always fails.
    struct DownClassifier;

    impl PiiClassifier for DownClassifier {
        fn supports_pii(&self, _language: &str) -> bool {
            true
        }

        fn detect_pii(
            &self,
            _text: &str,
            _language: &str,
        ) -> Result<Vec<RemotePiiEntity>, ClassifierError> {
            Err(ClassifierError::Unavailable {
                reason: "connection refused".to_string(),
            })
        }

        fn analyze(&self, _text: &str, _language: &str) -> Result<TextAnalysis, ClassifierError> {
            Err(ClassifierError::Unavailable {
                reason: "connection refused".to_string(),
            })
        }
    }

    // ── Masking ───────────────────────────────────────────────────────────────

    #[test]
    fn email_and_phone_scenario_masks_both_with_distinct_placeholders() {
        let redactor = Redactor::local_only();
        let result = redactor.mask("Contact: test@example.com, Phone: 090-1234-5678", "ja", false);

        assert!(!result.masked_text.contains("test@example.com"));
        assert!(!result.masked_text.contains("090-1234-5678"));
        assert!(result.masked_text.contains("[MASKED_EMAIL]"));
        assert!(result.masked_text.contains("[MASKED_PHONE_JP]"));
        assert_eq!(result.total_masked, 2);
        assert_eq!(result.findings.len(), 2);
    }

    #[test]
    fn email_like_input_always_yields_at_least_one_finding() {
        let redactor = Redactor::local_only();
        let result = redactor.mask("ping admin@corp.example.org", "en", false);
        assert!(result.total_masked >= 1);
        assert!(!result.masked_text.contains('@'));
    }

    #[test]
    fn total_masked_equals_findings_len() {
        let redactor = Redactor::local_only();
        let result = redactor.mask(
            "a@b.co, 03-1234-5678, 192.168.1.1, 1234-5678-9012",
            "ja",
            false,
        );
        assert_eq!(result.total_masked, result.findings.len());
        assert!(result.total_masked >= 4);
    }

    #[test]
    fn remote_findings_are_merged_and_preferred_on_overlap() {
        // Remote classifier claims the email span as NAME-typed PII; the
        // local email pattern must not produce a second finding for it.
        let text = "mail test@example.com now";
        let span = "test@example.com";
        let start = text.find(span).unwrap();
        let classifier = FakeClassifier {
            entities: vec![RemotePiiEntity {
                kind: "EMAIL_ADDRESS".to_string(),
                score: 0.99,
                begin_offset: start,
                end_offset: start + span.len(),
            }],
        };
        let redactor = Redactor::with_classifier(Box::new(classifier));
        let result = redactor.mask(text, "en", true);

        assert_eq!(result.detector_used, DetectorUsed::RemoteClassifier);
        assert_eq!(result.total_masked, 1, "overlap must not double-count");
        assert_eq!(
            result.findings[0].category,
            PiiCategory::Remote("EMAIL_ADDRESS".to_string())
        );
        assert!(result.masked_text.contains("[MASKED_EMAIL_ADDRESS]"));
    }

    #[test]
    fn local_patterns_still_run_after_remote_pass() {
        // Remote tier reports nothing; the Japanese phone must still be
        // caught by the local pattern even though the remote pass ran.
        let classifier = FakeClassifier { entities: Vec::new() };
        let redactor = Redactor::with_classifier(Box::new(classifier));
        let result = redactor.mask("Phone: 090-1234-5678", "en", true);

        assert_eq!(result.detector_used, DetectorUsed::RemoteClassifier);
        assert!(result.masked_text.contains("[MASKED_PHONE_JP]"));
        assert_eq!(result.total_masked, 1);
    }

    #[test]
    fn unreachable_classifier_degrades_to_local_pattern() {
        let redactor = Redactor::with_classifier(Box::new(DownClassifier));
        let result = redactor.mask("mail test@example.com", "en", true);

        assert_eq!(result.detector_used, DetectorUsed::LocalPattern);
        assert!(result.masked_text.contains("[MASKED_EMAIL]"));
        assert_eq!(result.total_masked, 1);
    }

    #[test]
    fn unsupported_language_routes_to_local_only() {
        let classifier = FakeClassifier {
            entities: vec![RemotePiiEntity {
                kind: "NAME".to_string(),
                score: 0.9,
                begin_offset: 0,
                end_offset: 4,
            }],
        };
        let redactor = Redactor::with_classifier(Box::new(classifier));
        // Japanese is not PII-supported; masking must never be skipped.
        let result = redactor.mask("電話は 090-1234-5678 です", "ja", true);

        assert_eq!(result.detector_used, DetectorUsed::LocalPattern);
        assert!(result.masked_text.contains("[MASKED_PHONE_JP]"));
    }

    #[test]
    fn invalid_remote_offsets_are_discarded_not_fatal() {
        let classifier = FakeClassifier {
            entities: vec![RemotePiiEntity {
                kind: "NAME".to_string(),
                score: 0.9,
                begin_offset: 5,
                end_offset: 999,
            }],
        };
        let redactor = Redactor::with_classifier(Box::new(classifier));
        let result = redactor.mask("short text", "en", true);
        assert_eq!(result.total_masked, 0);
        assert_eq!(result.masked_text, "short text");
    }

    // ── Risk score ────────────────────────────────────────────────────────────

    #[test]
    fn risk_score_is_zero_for_empty_text() {
        let redactor = Redactor::local_only();
        let result = redactor.mask("", "en", false);
        assert_eq!(result.risk_score, 0.0);
    }

    #[test]
    fn risk_score_is_positive_when_pii_present() {
        let redactor = Redactor::local_only();
        let result = redactor.mask("test@example.com", "en", false);
        assert!(result.risk_score > 0.0);
        assert!(result.risk_score <= 1.0);
    }

    // ── Analysis ──────────────────────────────────────────────────────────────

    #[test]
    fn analysis_failure_yields_empty_analysis() {
        let redactor = Redactor::with_classifier(Box::new(DownClassifier));
        let analysis = redactor.analyze("some text", "ja");
        assert_eq!(analysis, TextAnalysis::default());
    }

    #[test]
    fn analysis_passes_through_classifier_result() {
        let classifier = FakeClassifier { entities: Vec::new() };
        let redactor = Redactor::with_classifier(Box::new(classifier));
        let analysis = redactor.analyze("some text", "ja");
        assert_eq!(analysis.sentiment.unwrap().label, "NEUTRAL");
    }

    #[test]
    fn no_classifier_means_empty_analysis() {
        let redactor = Redactor::local_only();
        assert_eq!(redactor.analyze("text", "ja"), TextAnalysis::default());
    }
}
