//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Every field that contributes to a record's hash is listed explicitly so
//! nothing is accidentally omitted.
//!
//! Hash input layout (bytes, in order):
//!   1. canonical JSON of the record core (trace_id, timestamp, request,
//!      response — serde_json with no pretty-printing, declaration order)
//!   2. prev_hash as UTF-8 bytes (64 ASCII hex chars; empty for genesis)

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use custodia_contracts::error::{CustodiaError, CustodiaResult};
use custodia_contracts::record::AuditRecord;

/// Lowercase SHA-256 hex of arbitrary content bytes.
///
/// Used for `body_hash` / `content_hash` over the raw (unmasked) exchange
/// bodies, so an auditor can verify a record corresponds to known content
/// without the record re-exposing it.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute the chain hash for a record core and its predecessor link.
///
/// Returns a lowercase 64-character hex string committing to both the
/// record's own content and its stated `prev_hash`.
pub fn hash_record(core_bytes: &[u8], prev_hash: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(core_bytes);
    hasher.update(prev_hash.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a single record against its expected predecessor hash.
///
/// Checks, in order:
///
/// 1. **Prev-hash linkage** — the stored `prev_hash` equals `expected_prev`
///    (`None` for the first record of a chain).
/// 2. **Hash correctness** — `record_hash` matches the value recomputed
///    from the record's own fields.
/// 3. **Signature** — the Ed25519 signature over the `record_hash` bytes
///    verifies under `key`.
///
/// # Errors
///
/// `Integrity` for linkage or hash mismatches, `Signing` for a bad or
/// malformed signature.
pub fn verify_record(
    record: &AuditRecord,
    expected_prev: Option<&str>,
    key: &VerifyingKey,
) -> CustodiaResult<()> {
    if record.prev_hash.as_deref() != expected_prev {
        return Err(CustodiaError::Integrity {
            reason: format!(
                "record {} links to {:?}, expected {:?}",
                record.trace_id, record.prev_hash, expected_prev
            ),
        });
    }

    let core = record.core_bytes().map_err(|e| CustodiaError::Serialization {
        reason: format!("record core serialization failed: {}", e),
    })?;
    let recomputed = hash_record(&core, record.prev_hash.as_deref());
    if recomputed != record.record_hash {
        return Err(CustodiaError::Integrity {
            reason: format!("record {} hash mismatch", record.trace_id),
        });
    }

    let sig_bytes: [u8; 64] = hex::decode(&record.signature)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| CustodiaError::Signing {
            reason: format!("record {} signature is not 64 hex-encoded bytes", record.trace_id),
        })?;
    let signature = Signature::from_bytes(&sig_bytes);

    key.verify(record.record_hash.as_bytes(), &signature)
        .map_err(|_| CustodiaError::Signing {
            reason: format!("record {} signature verification failed", record.trace_id),
        })
}

/// Verify the integrity of a whole chain, oldest record first.
///
/// An empty chain is valid. Returns at the first mismatch with an error
/// naming the offending record.
pub fn verify_chain(records: &[AuditRecord], key: &VerifyingKey) -> CustodiaResult<()> {
    let mut expected_prev: Option<String> = None;

    for record in records {
        verify_record(record, expected_prev.as_deref(), key)?;
        expected_prev = Some(record.record_hash.clone());
    }

    Ok(())
}
