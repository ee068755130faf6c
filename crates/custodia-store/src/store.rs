//! The append-only local record store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/pending/<uuid>.json      persisted, not yet delivered
//! <root>/processed/<uuid>.json    delivered and acknowledged
//! ```
//!
//! Records are write-once: persisted exactly once into `pending/`, later
//! relocated (never modified) into `processed/` by a single atomic rename,
//! and eventually deleted only from `processed/` once past the retention
//! window. The pending area is never purged.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use custodia_contracts::error::{CustodiaError, CustodiaResult};
use custodia_contracts::record::AuditRecord;

/// Name of the pending area under the store root.
pub const PENDING_DIR: &str = "pending";

/// Name of the processed area under the store root.
pub const PROCESSED_DIR: &str = "processed";

/// A reference to one persisted record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    /// The UUID component of the record's trace id, which names the file.
    pub uuid: Uuid,

    /// Current location of the record file.
    pub path: PathBuf,
}

impl RecordHandle {
    fn from_dir_entry(path: PathBuf) -> Option<Self> {
        if path.extension().is_none_or(|ext| ext != "json") {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let uuid = Uuid::parse_str(stem).ok()?;
        Some(Self { uuid, path })
    }
}

/// The local record store.
pub struct RecordStore {
    pending: PathBuf,
    processed: PathBuf,
}

impl RecordStore {
    /// Open (creating if necessary) the store rooted at `root`.
    pub fn open(root: &Path) -> CustodiaResult<Self> {
        let pending = root.join(PENDING_DIR);
        let processed = root.join(PROCESSED_DIR);
        for dir in [&pending, &processed] {
            fs::create_dir_all(dir).map_err(|e| CustodiaError::Store {
                reason: format!("cannot create store directory '{}': {}", dir.display(), e),
            })?;
        }
        Ok(Self { pending, processed })
    }

    /// Persist one record into the pending area.
    ///
    /// The file is named deterministically from the trace UUID and created
    /// exclusively — a second persist of the same trace id is a `Store`
    /// error, not an overwrite.
    pub fn persist(&self, record: &AuditRecord) -> CustodiaResult<RecordHandle> {
        let uuid = record.trace_id.uuid();
        let path = self.pending.join(format!("{}.json", uuid));

        let json = serde_json::to_string_pretty(record).map_err(|e| {
            CustodiaError::Serialization {
                reason: format!("record serialization failed: {}", e),
            }
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CustodiaError::Store {
                reason: format!("cannot create record file '{}': {}", path.display(), e),
            })?;
        file.write_all(json.as_bytes()).map_err(|e| CustodiaError::Store {
            reason: format!("cannot write record file '{}': {}", path.display(), e),
        })?;

        restrict_to_owner(&path);

        info!(trace_uuid = %uuid, path = %path.display(), "audit record persisted");
        Ok(RecordHandle { uuid, path })
    }

    /// List pending records, oldest first (by file modification time, ties
    /// broken by name). Insertion order matters downstream: the delivery
    /// engine ships records in this order for chronological replay.
    pub fn list_pending(&self) -> CustodiaResult<Vec<RecordHandle>> {
        self.list_dir(&self.pending)
    }

    /// List processed records, oldest first.
    pub fn list_processed(&self) -> CustodiaResult<Vec<RecordHandle>> {
        self.list_dir(&self.processed)
    }

    /// Read and deserialize the record behind `handle`.
    pub fn read_record(&self, handle: &RecordHandle) -> CustodiaResult<AuditRecord> {
        let contents = fs::read_to_string(&handle.path).map_err(|e| CustodiaError::Store {
            reason: format!("cannot read record '{}': {}", handle.path.display(), e),
        })?;
        serde_json::from_str(&contents).map_err(|e| CustodiaError::Serialization {
            reason: format!("record '{}' is not valid JSON: {}", handle.path.display(), e),
        })
    }

    /// Relocate a delivered record from `pending/` to `processed/`.
    ///
    /// A single `rename`, so a crash can never leave the record visible in
    /// both locations or neither.
    pub fn move_to_processed(&self, handle: &RecordHandle) -> CustodiaResult<RecordHandle> {
        let dest = self.processed.join(format!("{}.json", handle.uuid));
        fs::rename(&handle.path, &dest).map_err(|e| CustodiaError::Store {
            reason: format!(
                "cannot move record '{}' to processed: {}",
                handle.path.display(),
                e
            ),
        })?;
        debug!(trace_uuid = %handle.uuid, "record moved to processed");
        Ok(RecordHandle { uuid: handle.uuid, path: dest })
    }

    /// Processed records whose file age exceeds `window`, oldest first.
    ///
    /// Selection is by file modification time only — record contents are
    /// never inspected for retention decisions.
    pub fn select_processed_older_than(
        &self,
        window: Duration,
    ) -> CustodiaResult<Vec<RecordHandle>> {
        let cutoff = SystemTime::now()
            .checked_sub(window)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut expired = Vec::new();
        for handle in self.list_processed()? {
            let modified = fs::metadata(&handle.path)
                .and_then(|m| m.modified())
                .map_err(|e| CustodiaError::Store {
                    reason: format!("cannot stat '{}': {}", handle.path.display(), e),
                })?;
            if modified < cutoff {
                expired.push(handle);
            }
        }
        Ok(expired)
    }

    /// Delete processed records older than `window`.
    ///
    /// Only ever deletes from the processed area; the pending area is the
    /// durability boundary and is never touched here.
    pub fn purge_processed_older_than(
        &self,
        window: Duration,
    ) -> CustodiaResult<Vec<RecordHandle>> {
        let expired = self.select_processed_older_than(window)?;
        for handle in &expired {
            fs::remove_file(&handle.path).map_err(|e| CustodiaError::Store {
                reason: format!("cannot purge record '{}': {}", handle.path.display(), e),
            })?;
            info!(trace_uuid = %handle.uuid, "processed record purged past retention");
        }
        Ok(expired)
    }

    fn list_dir(&self, dir: &Path) -> CustodiaResult<Vec<RecordHandle>> {
        let entries = fs::read_dir(dir).map_err(|e| CustodiaError::Store {
            reason: format!("cannot list store directory '{}': {}", dir.display(), e),
        })?;

        let mut handles: Vec<(SystemTime, RecordHandle)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CustodiaError::Store {
                reason: format!("cannot read store entry in '{}': {}", dir.display(), e),
            })?;
            let Some(handle) = RecordHandle::from_dir_entry(entry.path()) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            handles.push((modified, handle));
        }

        handles.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.path.file_name().cmp(&b.1.path.file_name()))
        });
        Ok(handles.into_iter().map(|(_, h)| h).collect())
    }
}

/// Tighten `path` to owner-only permissions. Best-effort: a filesystem that
/// cannot express the restriction gets a loud warning, not a failure.
fn restrict_to_owner(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(
                path = %path.display(),
                error = %e,
                "could not restrict record file to owner-only permissions"
            );
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use custodia_contracts::record::{RequestMeta, ResponseMeta};
    use custodia_contracts::redaction::{DetectorUsed, RedactionResult};
    use custodia_contracts::trace::TraceId;

    fn make_record() -> AuditRecord {
        AuditRecord {
            trace_id: TraceId::new(),
            timestamp: Utc::now(),
            request: RequestMeta {
                method: "test".to_string(),
                model: "test-model".to_string(),
                body_hash: "00".repeat(32),
                pii_detection: RedactionResult {
                    masked_text: "masked".to_string(),
                    findings: Vec::new(),
                    detector_used: DetectorUsed::LocalPattern,
                    total_masked: 0,
                    risk_score: 0.0,
                    limitations: String::new(),
                },
                nlp_analysis: None,
            },
            response: ResponseMeta {
                status: "success".to_string(),
                content_hash: "11".repeat(32),
            },
            prev_hash: None,
            record_hash: "22".repeat(32),
            signature: "33".repeat(64),
        }
    }

    /// Backdate a record file's modification time for retention tests.
    fn backdate(handle: &RecordHandle, age: Duration) {
        let file = fs::File::options().write(true).open(&handle.path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn persist_writes_into_pending_named_by_uuid() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let record = make_record();
        let handle = store.persist(&record).unwrap();

        assert_eq!(handle.uuid, record.trace_id.uuid());
        assert!(handle.path.starts_with(dir.path().join(PENDING_DIR)));
        assert_eq!(store.read_record(&handle).unwrap(), record);
    }

    #[test]
    fn duplicate_persist_is_a_store_error() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let record = make_record();
        store.persist(&record).unwrap();
        let err = store.persist(&record).unwrap_err();
        assert!(matches!(err, CustodiaError::Store { .. }));
    }

    #[test]
    fn list_pending_is_oldest_first() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();

        let first = store.persist(&make_record()).unwrap();
        let second = store.persist(&make_record()).unwrap();
        // Make the ordering unambiguous regardless of filesystem timestamp
        // granularity.
        backdate(&first, Duration::from_secs(60));

        let pending = store.list_pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].uuid, first.uuid);
        assert_eq!(pending[1].uuid, second.uuid);
    }

    #[test]
    fn move_to_processed_leaves_exactly_one_copy() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let handle = store.persist(&make_record()).unwrap();

        let moved = store.move_to_processed(&handle).unwrap();

        assert!(store.list_pending().unwrap().is_empty());
        let processed = store.list_processed().unwrap();
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].uuid, moved.uuid);
        assert!(!handle.path.exists());
        assert!(moved.path.exists());
    }

    #[test]
    fn purge_respects_the_retention_boundary() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let window = Duration::from_secs(3600);

        let expired = store.move_to_processed(&store.persist(&make_record()).unwrap()).unwrap();
        let fresh = store.move_to_processed(&store.persist(&make_record()).unwrap()).unwrap();
        // One record just past the window, one just inside it.
        backdate(&expired, window + Duration::from_secs(1));
        backdate(&fresh, window - Duration::from_secs(60));

        let purged = store.purge_processed_older_than(window).unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].uuid, expired.uuid);

        let remaining = store.list_processed().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].uuid, fresh.uuid);
    }

    #[test]
    fn purge_never_touches_pending() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let handle = store.persist(&make_record()).unwrap();
        backdate(&handle, Duration::from_secs(999_999));

        let purged = store.purge_processed_older_than(Duration::from_secs(1)).unwrap();
        assert!(purged.is_empty());
        assert_eq!(store.list_pending().unwrap().len(), 1);
    }

    #[test]
    fn select_reports_without_deleting() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let handle = store.move_to_processed(&store.persist(&make_record()).unwrap()).unwrap();
        backdate(&handle, Duration::from_secs(120));

        let selected = store.select_processed_older_than(Duration::from_secs(60)).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(store.list_processed().unwrap().len(), 1, "select must not delete");
    }

    #[test]
    fn non_record_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        fs::write(dir.path().join(PENDING_DIR).join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join(PENDING_DIR).join("bad-name.json"), "{}").unwrap();
        assert!(store.list_pending().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn persisted_records_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let handle = store.persist(&make_record()).unwrap();
        let mode = fs::metadata(&handle.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
