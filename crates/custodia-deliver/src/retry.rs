//! The per-record retry state machine.
//!
//! Expressed as explicit states rather than nested loops so the attempt cap
//! and the retryable-vs-fatal classification are independently testable:
//!
//! ```text
//! Attempting(k) --Ok-----------------------→ Succeeded
//! Attempting(k) --Throttled, k < cap-------→ Backoff(k) → Attempting(k+1)
//! Attempting(k) --Throttled, k == cap------→ Failed
//! Attempting(k) --Auth / Transport---------→ Failed
//! ```
//!
//! Only throttling is retryable. Backoff sleeps are synchronous and block
//! the calling flow; the expected workload is interactive and human-paced.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use custodia_contracts::error::SinkError;

/// Retry tuning for one delivery sequence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum submission attempts per record.
    pub max_attempts: u32,

    /// Backoff time unit; attempt `k` waits `base * 2^k` before retrying.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// One delivery sequence's position in the retry lifecycle.
#[derive(Debug)]
pub enum DeliveryState {
    /// Submission attempt `attempt` (1-based) is due.
    Attempting { attempt: u32 },

    /// Attempt `attempt` was throttled; wait `delay` before the next one.
    Backoff { attempt: u32, delay: Duration },

    /// The sink acknowledged the submission.
    Succeeded,

    /// The sequence ended without acknowledgment.
    Failed { error: SinkError },
}

impl DeliveryState {
    /// The initial state of every sequence.
    pub fn start() -> Self {
        DeliveryState::Attempting { attempt: 1 }
    }

    /// Whether this state ends the sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Succeeded | DeliveryState::Failed { .. })
    }
}

impl RetryPolicy {
    /// Advance from `Attempting(attempt)` given the submission outcome.
    pub fn observe(&self, attempt: u32, outcome: Result<(), SinkError>) -> DeliveryState {
        match outcome {
            Ok(()) => DeliveryState::Succeeded,
            Err(SinkError::Throttled { reason }) if attempt < self.max_attempts => {
                let delay = self.backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, %reason, "throttled; backing off");
                DeliveryState::Backoff { attempt, delay }
            }
            Err(error @ SinkError::Throttled { .. }) => {
                warn!(attempt, cap = self.max_attempts, "throttle attempt cap reached");
                DeliveryState::Failed { error }
            }
            // Auth and transport failures are never retried.
            Err(error) => DeliveryState::Failed { error },
        }
    }

    /// Exponential backoff for attempt `k`: `base * 2^k`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }

    /// Drive one full sequence, sleeping through backoff states.
    ///
    /// `submit` is called once per `Attempting` state; the returned state is
    /// always terminal.
    pub fn run(&self, mut submit: impl FnMut() -> Result<(), SinkError>) -> DeliveryState {
        let mut state = DeliveryState::start();
        loop {
            state = match state {
                DeliveryState::Attempting { attempt } => self.observe(attempt, submit()),
                DeliveryState::Backoff { attempt, delay } => {
                    thread::sleep(delay);
                    DeliveryState::Attempting { attempt: attempt + 1 }
                }
                terminal => return terminal,
            };
        }
    }
}
