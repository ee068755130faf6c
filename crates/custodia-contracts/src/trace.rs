//! Trace identifiers: globally unique, time-sortable.
//!
//! A `TraceId` pairs a v4 UUID with a UTC wall-clock timestamp truncated to
//! whole seconds. The external form is `<uuid>:<YYYY-MM-DDTHH:MM:SSZ>`,
//! so the timestamp component sorts lexicographically in creation order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CustodiaError;

/// A unique, sortable identifier for one request/response exchange.
///
/// Immutable once created; owned by the caller for the lifetime of the
/// exchange. The UUID component makes collisions cryptographically
/// negligible, the timestamp component makes string ordering monotone with
/// creation order (second resolution).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TraceId {
    /// Random v4 UUID drawn from the OS CSPRNG.
    pub unique_id: Uuid,

    /// Creation time (UTC), truncated to whole seconds.
    pub created_at: DateTime<Utc>,
}

impl TraceId {
    /// Generate a fresh trace identifier.
    ///
    /// Pure in the sense of the pipeline contract: no inputs, no failure
    /// modes, no side effects beyond reading the clock and the CSPRNG.
    pub fn new() -> Self {
        let now = Utc::now();
        // Truncate sub-second precision so Display and created_at agree.
        let truncated = now
            .with_nanosecond(0)
            .unwrap_or(now);
        Self {
            unique_id: Uuid::new_v4(),
            created_at: truncated,
        }
    }

    /// The UUID component, used to derive store filenames.
    pub fn uuid(&self) -> Uuid {
        self.unique_id
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    /// Render as `<uuid>:<ISO8601, second resolution, Z suffix>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.unique_id,
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

impl FromStr for TraceId {
    type Err = CustodiaError;

    /// Parse the `<uuid>:<timestamp>` form.
    ///
    /// The timestamp itself contains colons, so only the first colon splits
    /// the two components.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (uuid_part, ts_part) = s.split_once(':').ok_or_else(|| {
            CustodiaError::Serialization {
                reason: format!("trace id '{}' has no ':' separator", s),
            }
        })?;

        let unique_id = Uuid::parse_str(uuid_part).map_err(|e| CustodiaError::Serialization {
            reason: format!("trace id UUID component invalid: {}", e),
        })?;

        let created_at = DateTime::parse_from_rfc3339(ts_part)
            .map_err(|e| CustodiaError::Serialization {
                reason: format!("trace id timestamp component invalid: {}", e),
            })?
            .with_timezone(&Utc);

        Ok(Self { unique_id, created_at })
    }
}

impl From<TraceId> for String {
    fn from(id: TraceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for TraceId {
    type Error = CustodiaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
