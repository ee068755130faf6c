//! The deterministic local PII pattern set.
//!
//! These patterns run unconditionally on every masking call — even when the
//! remote classifier succeeded — because they cover locale-specific
//! identifiers (Japanese phone numbers, My Number, postal codes) the remote
//! tier does not model. They are matched against the working text, which may
//! already contain placeholder tokens from the remote pass; placeholders
//! contain no digits or `@`, so a span is never masked twice.
//!
//! No checksum validation is performed on numeric identifiers — a string
//! that merely looks like a card number is masked. Precision limits are
//! surfaced in the redaction result, not hidden.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use custodia_contracts::redaction::{MaskingMethod, PiiCategory, PiiFinding};

/// Pattern table in application order.
///
/// Order matters where shapes overlap: Japanese phone numbers run before
/// My Number so `090-1234-5678` is reported as a phone, and card numbers
/// run before My Number so a fully dashed 16-digit card is not split into
/// a 12-digit prefix match.
static PATTERNS: LazyLock<Vec<(PiiCategory, Regex)>> = LazyLock::new(|| {
    [
        (
            PiiCategory::Email,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        ),
        (PiiCategory::PhoneJp, r"\b0\d{1,4}-\d{1,4}-\d{4}\b"),
        (
            PiiCategory::PhoneIntl,
            r"\+81[-\s]?\d{1,4}[-\s]?\d{1,4}[-\s]?\d{4}\b",
        ),
        (
            PiiCategory::CreditCard,
            r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
        ),
        (PiiCategory::MyNumber, r"\b\d{4}-\d{4}-\d{4}\b"),
        (PiiCategory::ZipCodeJp, r"\b\d{3}-\d{4}\b"),
        (
            PiiCategory::Ipv4,
            r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b",
        ),
    ]
    .into_iter()
    .map(|(category, pattern)| {
        // The table is a compile-time constant; an invalid pattern is a
        // programming error caught by the tests below.
        let regex = Regex::new(pattern).expect("local PII pattern must compile");
        (category, regex)
    })
    .collect()
});

/// Lowercase SHA-256 hex of a matched span.
pub(crate) fn hash_span(span: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(span.as_bytes());
    hex::encode(hasher.finalize())
}

/// Run every local pattern over `text`, replacing matches with their
/// category placeholder.
///
/// Returns the masked text, the findings in application order, and the
/// total character count of the masked spans (for the risk score).
pub fn apply_local_patterns(text: &str) -> (String, Vec<PiiFinding>, usize) {
    let mut masked = text.to_string();
    let mut findings = Vec::new();
    let mut masked_chars = 0usize;

    for (category, regex) in PATTERNS.iter() {
        // Collect ranges first, then rewrite back-to-front so earlier
        // offsets stay valid.
        let ranges: Vec<(usize, usize)> = regex
            .find_iter(&masked)
            .map(|m| (m.start(), m.end()))
            .collect();

        for &(start, end) in ranges.iter().rev() {
            let span = &masked[start..end];
            masked_chars += span.chars().count();
            findings.push(PiiFinding {
                category: category.clone(),
                original_span_hash: hash_span(span),
                masking_method: MaskingMethod::PlaceholderToken,
            });
            masked.replace_range(start..end, &category.placeholder());
        }
    }

    (masked, findings, masked_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_masked() {
        let (masked, findings, _) = apply_local_patterns("reach me at test@example.com please");
        assert!(masked.contains("[MASKED_EMAIL]"));
        assert!(!masked.contains("test@example.com"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, PiiCategory::Email);
    }

    #[test]
    fn japanese_phone_is_reported_as_phone_not_my_number() {
        let (masked, findings, _) = apply_local_patterns("Phone: 090-1234-5678");
        assert!(masked.contains("[MASKED_PHONE_JP]"));
        assert_eq!(findings[0].category, PiiCategory::PhoneJp);
    }

    #[test]
    fn dashed_card_number_is_one_card_finding() {
        let (masked, findings, _) = apply_local_patterns("card 1234-5678-9012-3456 on file");
        assert!(masked.contains("[MASKED_CREDIT_CARD]"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, PiiCategory::CreditCard);
    }

    #[test]
    fn my_number_and_zip_code_are_distinguished() {
        let (masked, findings, _) =
            apply_local_patterns("my number 1234-5678-9012, zip 123-4567");
        assert!(masked.contains("[MASKED_MY_NUMBER]"));
        assert!(masked.contains("[MASKED_ZIP_CODE_JP]"));
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn international_phone_is_masked() {
        let (masked, _, _) = apply_local_patterns("call +81-90-1234-5678");
        assert!(masked.contains("[MASKED_PHONE_INTL]"));
        assert!(!masked.contains("+81"));
    }

    #[test]
    fn ipv4_is_masked() {
        let (masked, findings, _) = apply_local_patterns("connect to 192.168.0.1 now");
        assert!(masked.contains("[MASKED_IPV4]"));
        assert_eq!(findings[0].category, PiiCategory::Ipv4);
    }

    #[test]
    fn clean_text_produces_no_findings() {
        let (masked, findings, chars) = apply_local_patterns("no identifiers here");
        assert_eq!(masked, "no identifiers here");
        assert!(findings.is_empty());
        assert_eq!(chars, 0);
    }

    #[test]
    fn span_hash_matches_recomputation() {
        let (_, findings, _) = apply_local_patterns("test@example.com");
        assert_eq!(findings[0].original_span_hash, hash_span("test@example.com"));
    }

    #[test]
    fn masked_chars_counts_span_lengths() {
        let (_, _, chars) = apply_local_patterns("a test@example.com b");
        assert_eq!(chars, "test@example.com".chars().count());
    }
}
