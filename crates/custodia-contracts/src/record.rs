//! The chain-linked audit record and its request/response sections.
//!
//! An `AuditRecord` is the unit of the tamper-evident trail: created once
//! per exchange, persisted once, never mutated in place. The integrity
//! fields (`prev_hash`, `record_hash`, `signature`) are computed by the
//! record builder in custodia-audit; this crate only defines the shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::redaction::{RedactionResult, TextAnalysis};
use crate::trace::TraceId;

/// Request-side metadata for one exchange.
///
/// `body_hash` is computed over the raw (unmasked) request bytes so an
/// auditor can verify "this request corresponds to hash X" without the
/// record re-exposing PII; any stored text lives in `pii_detection` in its
/// masked form only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// The invoking surface (e.g. `chatgpt`, `gemini`, `copilot`).
    pub method: String,

    /// The model the request was sent to.
    pub model: String,

    /// Lowercase SHA-256 hex of the raw request body.
    pub body_hash: String,

    /// The redaction outcome for the request text.
    pub pii_detection: RedactionResult,

    /// Auxiliary analysis, when the remote classifier was reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlp_analysis: Option<TextAnalysis>,
}

/// Response-side metadata for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Outcome status reported by the wrapped tool (`success`, `error`, ...).
    pub status: String,

    /// Lowercase SHA-256 hex of the raw response content.
    pub content_hash: String,
}

/// One signed, chain-linked entry in the audit trail.
///
/// Integrity invariants (enforced by the builder, checked by the verifier):
///
/// - `record_hash = SHA256(canonical_json(core) ‖ prev_hash_bytes)` where
///   `core` is the record without its three integrity fields and
///   `prev_hash_bytes` is the hex string, empty for the genesis record.
/// - `signature = Ed25519(record_hash bytes)`, hex-encoded.
/// - `prev_hash` equals the `record_hash` of the preceding record, or
///   `None` for the first record of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// The exchange this record describes.
    pub trace_id: TraceId,

    /// Wall-clock time (UTC) the record was built.
    pub timestamp: DateTime<Utc>,

    /// Request-side metadata.
    pub request: RequestMeta,

    /// Response-side metadata.
    pub response: ResponseMeta,

    /// `record_hash` of the predecessor, `None` for the chain's first record.
    pub prev_hash: Option<String>,

    /// Lowercase SHA-256 hex committing to this record and its predecessor.
    pub record_hash: String,

    /// Hex-encoded Ed25519 signature over the `record_hash` bytes.
    pub signature: String,
}

impl AuditRecord {
    /// The canonical core serialization the `record_hash` commits to:
    /// this record minus `prev_hash`, `record_hash`, and `signature`.
    ///
    /// `serde_json::to_vec` is deterministic for a given value (struct
    /// fields serialize in declaration order), which makes the hash stable
    /// across processes.
    pub fn core_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        #[derive(Serialize)]
        struct Core<'a> {
            trace_id: &'a TraceId,
            timestamp: &'a DateTime<Utc>,
            request: &'a RequestMeta,
            response: &'a ResponseMeta,
        }
        serde_json::to_vec(&Core {
            trace_id: &self.trace_id,
            timestamp: &self.timestamp,
            request: &self.request,
            response: &self.response,
        })
    }
}
