//! The audit record builder.
//!
//! One builder per process; `build()` is the only writer of chain state.
//! The chain-state lock is held for the full read-hash-sign-write sequence,
//! so a record's `prev_hash` and the persisted `last_hash` can never
//! diverge, even with a concurrent builder in another process.

use chrono::Utc;
use tracing::info;

use custodia_contracts::error::{CustodiaError, CustodiaResult};
use custodia_contracts::record::{AuditRecord, RequestMeta, ResponseMeta};
use custodia_contracts::trace::TraceId;

use crate::chain::hash_record;
use crate::keys::SigningIdentity;
use crate::state::{ChainState, ChainStateFile};

/// Builds signed, chain-linked audit records.
pub struct RecordBuilder {
    identity: SigningIdentity,
    state_file: ChainStateFile,
}

impl RecordBuilder {
    /// Create a builder from a loaded signing identity and the store's
    /// chain-state file.
    pub fn new(identity: SigningIdentity, state_file: ChainStateFile) -> Self {
        Self { identity, state_file }
    }

    /// Build one signed record, extending the hash chain.
    ///
    /// Acquires the chain-state lock, links the record to the persisted
    /// `last_hash`, computes `record_hash`, signs it, and advances the
    /// persisted state — all under the lock.
    ///
    /// # Errors
    ///
    /// `Integrity` when the lock is contended or the state file is corrupt
    /// (record creation halts), `Serialization`/`Store` for I/O failures.
    pub fn build(
        &self,
        trace_id: TraceId,
        request: RequestMeta,
        response: ResponseMeta,
    ) -> CustodiaResult<AuditRecord> {
        let guard = self.state_file.lock()?;
        let state = guard.read()?;

        let mut record = AuditRecord {
            trace_id,
            timestamp: Utc::now(),
            request,
            response,
            prev_hash: state.last_hash.clone(),
            record_hash: String::new(),
            signature: String::new(),
        };

        let core = record.core_bytes().map_err(|e| CustodiaError::Serialization {
            reason: format!("record core serialization failed: {}", e),
        })?;
        record.record_hash = hash_record(&core, record.prev_hash.as_deref());
        record.signature = self.identity.sign(record.record_hash.as_bytes());

        guard.write(&ChainState {
            last_hash: Some(record.record_hash.clone()),
            records: state.records + 1,
        })?;

        info!(
            trace_id = %record.trace_id,
            record_hash = %record.record_hash,
            sequence = state.records,
            "audit record built"
        );

        Ok(record)
    }
}
