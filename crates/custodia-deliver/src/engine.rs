//! The delivery engine.
//!
//! Ships pending records to the remote sink oldest first, moves each to
//! `processed/` only after explicit acknowledgment, and purges processed
//! records past the retention window. A record only ever leaves `pending/`
//! after remote acceptance is confirmed — a crash at any earlier point
//! simply re-submits the identical content on the next run, which the sink
//! is expected to tolerate (each message carries the record's `record_hash`
//! as a content-addressed token for downstream duplicate identification).

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use custodia_contracts::config::{DeliveryConfig, SinkConfig};
use custodia_contracts::error::{CustodiaResult, SinkError};
use custodia_store::{RecordHandle, RecordStore};

use crate::retry::{DeliveryState, RetryPolicy};
use crate::sink::{LogSink, SinkEvent};

/// Aggregate outcome of one `deliver_all` run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Records acknowledged by the sink and moved to `processed/`.
    pub succeeded: usize,

    /// Records that exhausted retries or hit a non-retryable error.
    pub failed: usize,

    /// Records not submitted: unreadable payloads, or every record in
    /// preview mode.
    pub skipped: usize,

    /// Processed records purged past retention (in preview mode: the count
    /// that would be purged).
    pub purged: usize,
}

/// Delivers persisted records to a remote log sink.
pub struct DeliveryEngine {
    sink: Box<dyn LogSink>,
    policy: RetryPolicy,
    pacing: Duration,
    retention_window: Duration,
    log_group: String,
    log_stream: String,
    dry_run: bool,
}

impl DeliveryEngine {
    /// Build an engine from configuration and a sink implementation.
    pub fn new(sink: Box<dyn LogSink>, delivery: &DeliveryConfig, sink_config: &SinkConfig) -> Self {
        Self {
            sink,
            policy: RetryPolicy {
                max_attempts: delivery.max_attempts,
                backoff_base: delivery.backoff_base(),
            },
            pacing: delivery.pacing(),
            retention_window: delivery.retention_window(),
            log_group: sink_config.log_group.clone(),
            log_stream: sink_config.log_stream.clone(),
            dry_run: false,
        }
    }

    /// Switch the engine into non-mutating preview mode: identical
    /// traversal and retention computation, but submit, move, and purge are
    /// simulated and reported rather than executed.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Deliver every pending record, oldest first, then apply retention.
    ///
    /// Per-record failures never abort the batch; the engine continues to
    /// the next record and reports aggregate counts. The one exception is
    /// an authentication failure, which is fatal for the whole batch:
    /// every remaining record would be rejected with the same credentials.
    pub fn deliver_all(&self, store: &RecordStore) -> CustodiaResult<DeliveryReport> {
        let mut report = DeliveryReport::default();

        for handle in store.list_pending()? {
            match self.deliver_one(store, &handle)? {
                DeliveryOutcome::Delivered => report.succeeded += 1,
                DeliveryOutcome::Failed => report.failed += 1,
                DeliveryOutcome::Skipped => report.skipped += 1,
            }
        }

        report.purged = if self.dry_run {
            let would_purge = store.select_processed_older_than(self.retention_window)?;
            for handle in &would_purge {
                info!(trace_uuid = %handle.uuid, "would purge processed record past retention");
            }
            would_purge.len()
        } else {
            store.purge_processed_older_than(self.retention_window)?.len()
        };

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            purged = report.purged,
            dry_run = self.dry_run,
            "delivery run complete"
        );
        Ok(report)
    }

    fn deliver_one(
        &self,
        store: &RecordStore,
        handle: &RecordHandle,
    ) -> CustodiaResult<DeliveryOutcome> {
        let record = match store.read_record(handle) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %handle.path.display(), error = %e, "skipping unreadable record");
                return Ok(DeliveryOutcome::Skipped);
            }
        };

        if self.dry_run {
            info!(trace_id = %record.trace_id, "would deliver pending record");
            return Ok(DeliveryOutcome::Skipped);
        }

        let event = SinkEvent {
            timestamp_ms: record.timestamp.timestamp_millis(),
            message: serde_json::to_string(&record).map_err(|e| {
                custodia_contracts::error::CustodiaError::Serialization {
                    reason: format!("record serialization failed: {}", e),
                }
            })?,
        };

        let state = self.policy.run(|| {
            self.sink
                .put_events(&self.log_group, &self.log_stream, std::slice::from_ref(&event))
        });

        match state {
            DeliveryState::Succeeded => {
                // The idempotency boundary: only after explicit remote
                // acknowledgment does the record leave pending/.
                store.move_to_processed(handle)?;
                info!(trace_id = %record.trace_id, "record delivered and moved to processed");
                thread::sleep(self.pacing);
                Ok(DeliveryOutcome::Delivered)
            }
            DeliveryState::Failed { error: error @ SinkError::Auth { .. } } => Err(error.into()),
            DeliveryState::Failed { error } => {
                warn!(trace_id = %record.trace_id, error = %error, "record delivery failed");
                Ok(DeliveryOutcome::Failed)
            }
            state @ (DeliveryState::Attempting { .. } | DeliveryState::Backoff { .. }) => {
                unreachable!("retry driver returned non-terminal state {:?}", state)
            }
        }
    }
}

enum DeliveryOutcome {
    Delivered,
    Failed,
    Skipped,
}
