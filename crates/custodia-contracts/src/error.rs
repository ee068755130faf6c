//! Error taxonomy for the Custodia audit pipeline.
//!
//! All fallible operations return `CustodiaResult<T>`. The taxonomy follows
//! the pipeline's failure semantics:
//!
//! - `Setup` / `Config` are fatal and never retried — the operator must fix
//!   the environment (missing keys, malformed config) before anything runs.
//! - `SinkError` classifies remote sink failures so the delivery engine can
//!   decide retry-vs-abort per variant without string matching.
//! - `ClassifierError` covers the remote PII classifier; every variant
//!   degrades to local-only detection and is never surfaced as a failure.
//! - `Integrity` halts record creation: the hash chain state is ambiguous
//!   and appending more records would make it worse.

use thiserror::Error;

/// The unified error type for the Custodia pipeline.
#[derive(Debug, Error)]
pub enum CustodiaError {
    /// A required key pair or other one-time setup artifact is missing.
    ///
    /// Fatal. Key generation is an explicit operation (`custodia keygen`),
    /// never performed implicitly on the hot path.
    #[error("setup error: {reason}")]
    Setup { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// The local record store could not persist, list, or relocate a record.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// Chain state is inconsistent — a concurrent writer collision or a
    /// corrupted state file.
    ///
    /// Fatal: record creation must halt until the chain state is resolved,
    /// otherwise two records could claim the same `prev_hash`.
    #[error("chain integrity error: {reason}")]
    Integrity { reason: String },

    /// Signing or signature verification failed.
    #[error("signing error: {reason}")]
    Signing { reason: String },

    /// A record payload could not be serialized or deserialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// The remote log sink rejected or failed a delivery.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Convenience alias used throughout the Custodia crates.
pub type CustodiaResult<T> = Result<T, CustodiaError>;

/// Failure classification for the remote log sink.
///
/// The delivery engine branches on these variants: `Throttled` is the only
/// retryable case, `Auth` aborts the whole batch, `Transport` fails the
/// current record and moves on.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink signalled that the caller exceeded its allowed request rate.
    ///
    /// Retryable with exponential backoff, up to the configured attempt cap.
    #[error("sink throttled the request: {reason}")]
    Throttled { reason: String },

    /// Authentication or authorization was rejected.
    ///
    /// Fatal for the batch — retrying with the same credentials cannot succeed.
    #[error("sink rejected credentials: {reason}")]
    Auth { reason: String },

    /// Any other transport or server failure.
    ///
    /// Fatal for the current record only; the batch continues.
    #[error("sink transport failure: {reason}")]
    Transport { reason: String },
}

/// Failure classification for the remote PII classifier.
///
/// Every variant is recoverable: the redactor falls back to the local
/// pattern set and records which detection tier actually ran.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The classifier does not support PII detection for this language.
    #[error("PII detection not supported for language '{language}'")]
    UnsupportedLanguage { language: String },

    /// The classifier could not be reached or timed out.
    #[error("classifier unreachable: {reason}")]
    Unavailable { reason: String },

    /// The classifier throttled the request.
    #[error("classifier throttled the request: {reason}")]
    Throttled { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_error_display_names_the_missing_artifact() {
        let err = CustodiaError::Setup {
            reason: "signing key not found at ./keys/audit_signing.key".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("setup error"));
        assert!(msg.contains("audit_signing.key"));
    }

    #[test]
    fn integrity_error_display() {
        let err = CustodiaError::Integrity {
            reason: "chain state lock held by another writer".to_string(),
        };
        assert!(err.to_string().contains("chain integrity error"));
    }

    #[test]
    fn sink_error_converts_into_custodia_error() {
        let err: CustodiaError = SinkError::Auth {
            reason: "token expired".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("sink error"));
        assert!(msg.contains("token expired"));
    }

    #[test]
    fn classifier_unsupported_language_display() {
        let err = ClassifierError::UnsupportedLanguage {
            language: "ja".to_string(),
        };
        assert!(err.to_string().contains("'ja'"));
    }
}
