//! The remote log sink seam.
//!
//! `LogSink` is the trust boundary between the delivery engine and the
//! centralized log store. The engine only ever sees `SinkError` variants,
//! so retry-vs-fatal classification lives in one place; the HTTP
//! implementation maps transport realities onto that taxonomy and keeps
//! every request under a bounded timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use custodia_contracts::config::SinkConfig;
use custodia_contracts::error::SinkError;

/// One entry in a batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkEvent {
    /// Record creation time in Unix milliseconds, used by the sink for
    /// chronological ordering.
    pub timestamp_ms: i64,

    /// The serialized `AuditRecord` JSON. Carries the record's
    /// `record_hash`, which doubles as a content-addressed token for
    /// downstream duplicate identification.
    pub message: String,
}

/// A remote, centrally monitored log store.
pub trait LogSink: Send + Sync {
    /// Submit a batch of events to `log_group` / `log_stream`.
    ///
    /// Returning `Ok(())` is the explicit acknowledgment the delivery
    /// engine treats as its idempotency boundary.
    fn put_events(
        &self,
        log_group: &str,
        log_stream: &str,
        events: &[SinkEvent],
    ) -> Result<(), SinkError>;
}

// ── HTTP implementation ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct PutEventsRequest<'a> {
    log_group: &'a str,
    log_stream: &'a str,
    events: &'a [SinkEvent],
}

/// Blocking HTTP client for the sink's put-events endpoint.
#[derive(Debug)]
pub struct HttpLogSink {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpLogSink {
    /// Build a sink client from configuration.
    pub fn from_config(config: &SinkConfig) -> Result<Self, SinkError> {
        if config.endpoint.is_empty() {
            return Err(SinkError::Transport {
                reason: "no sink endpoint configured".to_string(),
            });
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SinkError::Transport {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl LogSink for HttpLogSink {
    fn put_events(
        &self,
        log_group: &str,
        log_stream: &str,
        events: &[SinkEvent],
    ) -> Result<(), SinkError> {
        let response = self
            .client
            .post(format!("{}/put-events", self.endpoint))
            .json(&PutEventsRequest { log_group, log_stream, events })
            .send()
            .map_err(|e| SinkError::Transport {
                reason: format!("sink request failed: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status.as_u16() {
            429 => Err(SinkError::Throttled {
                reason: format!("sink returned {}", status),
            }),
            401 | 403 => Err(SinkError::Auth {
                reason: format!("sink returned {}", status),
            }),
            _ => Err(SinkError::Transport {
                reason: format!("sink returned {}", status),
            }),
        }
    }
}
