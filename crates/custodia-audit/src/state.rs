//! Persisted chain state and its exclusive-access guard.
//!
//! `last_hash` is process-wide mutable state that must survive restarts and
//! must be read-modify-written atomically relative to record creation:
//! without mutual exclusion, two concurrently created records could both
//! claim the same `prev_hash` and fork the chain. Record creation and
//! delivery may legitimately run as separate processes, so the guard is a
//! filesystem lock (`O_EXCL` lock file), not an in-process mutex.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use custodia_contracts::error::{CustodiaError, CustodiaResult};

/// File name of the persisted chain state, stored in the store root.
pub const STATE_FILE: &str = "chain_state.json";

/// File name of the exclusive lock beside the state file.
pub const LOCK_FILE: &str = "chain_state.lock";

/// A lock file older than this is treated as abandoned by a crashed writer
/// and stolen with a warning.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// The persisted chain state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    /// `record_hash` of the most recently built record; `None` before any
    /// record exists (the next record is the chain's genesis).
    pub last_hash: Option<String>,

    /// Count of records built on this chain.
    pub records: u64,
}

/// Handle to the on-disk chain state.
#[derive(Debug)]
pub struct ChainStateFile {
    state_path: PathBuf,
    lock_path: PathBuf,
    lock_attempts: u32,
    lock_retry_delay: Duration,
}

impl ChainStateFile {
    /// Chain state stored under `store_root`.
    pub fn new(store_root: &Path) -> Self {
        Self {
            state_path: store_root.join(STATE_FILE),
            lock_path: store_root.join(LOCK_FILE),
            lock_attempts: 50,
            lock_retry_delay: Duration::from_millis(100),
        }
    }

    /// Tune lock acquisition for tests that exercise contention.
    #[doc(hidden)]
    pub fn with_lock_budget(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.lock_attempts = attempts;
        self.lock_retry_delay = retry_delay;
        self
    }

    /// Acquire the exclusive chain-state lock.
    ///
    /// Retries briefly on contention; a lock file older than
    /// `STALE_LOCK_AGE` is assumed abandoned by a crashed writer and stolen
    /// with a warning.
    ///
    /// # Errors
    ///
    /// `Integrity` when the lock cannot be acquired within the retry
    /// budget — record creation must halt rather than risk two records
    /// claiming the same `prev_hash`.
    pub fn lock(&self) -> CustodiaResult<ChainStateGuard<'_>> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| CustodiaError::Store {
                reason: format!("cannot create store directory '{}': {}", parent.display(), e),
            })?;
        }

        for attempt in 0..self.lock_attempts {
            // O_EXCL creation is the atomic acquire: exactly one writer can
            // create the file.
            match OpenOptions::new().write(true).create_new(true).open(&self.lock_path) {
                Ok(_) => {
                    debug!(lock = %self.lock_path.display(), attempt, "chain state lock acquired");
                    return Ok(ChainStateGuard { owner: self });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.steal_if_stale() {
                        continue;
                    }
                    thread::sleep(self.lock_retry_delay);
                }
                Err(e) => {
                    return Err(CustodiaError::Store {
                        reason: format!("cannot create lock file '{}': {}", self.lock_path.display(), e),
                    });
                }
            }
        }

        Err(CustodiaError::Integrity {
            reason: format!(
                "chain state lock '{}' held by another writer; record creation halted",
                self.lock_path.display()
            ),
        })
    }

    /// Remove the lock file if it has outlived `STALE_LOCK_AGE`.
    fn steal_if_stale(&self) -> bool {
        let age = fs::metadata(&self.lock_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok());

        match age {
            Some(age) if age >= STALE_LOCK_AGE => {
                warn!(
                    lock = %self.lock_path.display(),
                    age_secs = age.as_secs(),
                    "stealing stale chain state lock left by a crashed writer"
                );
                fs::remove_file(&self.lock_path).is_ok()
            }
            _ => false,
        }
    }
}

/// Exclusive access to the chain state. Held for the duration of one
/// record's hash computation; the lock file is removed on drop, on every
/// exit path.
#[derive(Debug)]
pub struct ChainStateGuard<'a> {
    owner: &'a ChainStateFile,
}

impl ChainStateGuard<'_> {
    /// Read the current state. A missing state file is the genesis state.
    ///
    /// # Errors
    ///
    /// `Integrity` when the state file exists but cannot be parsed — an
    /// unreadable chain state must halt record creation, not silently
    /// restart the chain.
    pub fn read(&self) -> CustodiaResult<ChainState> {
        match fs::read_to_string(&self.owner.state_path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| CustodiaError::Integrity {
                reason: format!(
                    "chain state file '{}' is corrupt: {}",
                    self.owner.state_path.display(),
                    e
                ),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChainState::default()),
            Err(e) => Err(CustodiaError::Store {
                reason: format!(
                    "cannot read chain state '{}': {}",
                    self.owner.state_path.display(),
                    e
                ),
            }),
        }
    }

    /// Persist `state`, replacing the previous state atomically
    /// (write-temp-then-rename).
    pub fn write(&self, state: &ChainState) -> CustodiaResult<()> {
        let json = serde_json::to_string_pretty(state).map_err(|e| CustodiaError::Serialization {
            reason: format!("chain state serialization failed: {}", e),
        })?;

        let tmp_path = self.owner.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| CustodiaError::Store {
            reason: format!("cannot write chain state '{}': {}", tmp_path.display(), e),
        })?;
        fs::rename(&tmp_path, &self.owner.state_path).map_err(|e| CustodiaError::Store {
            reason: format!(
                "cannot replace chain state '{}': {}",
                self.owner.state_path.display(),
                e
            ),
        })
    }
}

impl Drop for ChainStateGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.owner.lock_path) {
            // Nothing to do beyond reporting; the stale-lock path recovers.
            warn!(
                lock = %self.owner.lock_path.display(),
                error = %e,
                "failed to remove chain state lock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_state_is_genesis() {
        let dir = TempDir::new().unwrap();
        let file = ChainStateFile::new(dir.path());
        let guard = file.lock().unwrap();
        let state = guard.read().unwrap();
        assert_eq!(state, ChainState::default());
        assert!(state.last_hash.is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let file = ChainStateFile::new(dir.path());
        let guard = file.lock().unwrap();

        let state = ChainState {
            last_hash: Some("ab".repeat(32)),
            records: 7,
        };
        guard.write(&state).unwrap();
        assert_eq!(guard.read().unwrap(), state);
    }

    #[test]
    fn state_survives_reacquisition() {
        let dir = TempDir::new().unwrap();
        let file = ChainStateFile::new(dir.path());

        {
            let guard = file.lock().unwrap();
            guard.write(&ChainState { last_hash: Some("cd".repeat(32)), records: 1 }).unwrap();
        }

        let guard = file.lock().unwrap();
        assert_eq!(guard.read().unwrap().records, 1);
    }

    #[test]
    fn contended_lock_is_an_integrity_error() {
        let dir = TempDir::new().unwrap();
        let file = ChainStateFile::new(dir.path());
        let _held = file.lock().unwrap();

        let contender =
            ChainStateFile::new(dir.path()).with_lock_budget(3, Duration::from_millis(1));
        let err = contender.lock().unwrap_err();
        assert!(matches!(err, CustodiaError::Integrity { .. }));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let file = ChainStateFile::new(dir.path());
        drop(file.lock().unwrap());
        // Reacquisition succeeds immediately when the guard was dropped.
        let again = ChainStateFile::new(dir.path()).with_lock_budget(1, Duration::from_millis(1));
        assert!(again.lock().is_ok());
    }

    #[test]
    fn corrupt_state_file_is_an_integrity_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(STATE_FILE), "not json").unwrap();
        let file = ChainStateFile::new(dir.path());
        let guard = file.lock().unwrap();
        let err = guard.read().unwrap_err();
        assert!(matches!(err, CustodiaError::Integrity { .. }));
    }
}
