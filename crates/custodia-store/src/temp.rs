//! Secure scoped temporary files.
//!
//! Transient artifacts may carry unmasked request bodies or key material on
//! their way to a subprocess, so a temp file gets two guarantees:
//!
//! 1. Its permissions are tightened to the current principal only right
//!    after creation. This is attempted unconditionally; on a filesystem
//!    that cannot express the restriction the operation proceeds with a
//!    loud warning rather than failing closed.
//! 2. It is deleted on every exit path — success, error, or panic — via
//!    the temp file's RAII guard.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use custodia_contracts::error::{CustodiaError, CustodiaResult};

/// Create a temp file holding `contents`, run `f` with its path, and delete
/// the file no matter how `f` exits.
pub fn with_scoped_temp_file<T>(
    contents: &[u8],
    f: impl FnOnce(&Path) -> CustodiaResult<T>,
) -> CustodiaResult<T> {
    let mut file = NamedTempFile::new().map_err(|e| CustodiaError::Store {
        reason: format!("cannot create temp file: {}", e),
    })?;

    restrict_to_owner(file.path());

    file.write_all(contents).map_err(|e| CustodiaError::Store {
        reason: format!("cannot write temp file '{}': {}", file.path().display(), e),
    })?;
    file.flush().map_err(|e| CustodiaError::Store {
        reason: format!("cannot flush temp file '{}': {}", file.path().display(), e),
    })?;

    debug!(path = %file.path().display(), bytes = contents.len(), "scoped temp file created");

    // `file` is dropped when this frame unwinds or returns, removing the
    // file on success, error, and panic alike.
    f(file.path())
}

/// Strip inherited permissions down to owner read/write only.
fn restrict_to_owner(path: &Path) {
    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(
                path = %path.display(),
                error = %e,
                "could not restrict temp file to owner-only access; continuing"
            );
        }
    }
    #[cfg(not(unix))]
    {
        warn!(
            path = %path.display(),
            "owner-only ACL restriction not implemented on this platform; continuing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn closure_sees_the_contents() {
        let read_back = with_scoped_temp_file(b"payload bytes", |path| {
            Ok(fs::read(path).unwrap())
        })
        .unwrap();
        assert_eq!(read_back, b"payload bytes");
    }

    #[test]
    fn file_is_deleted_after_success() {
        let mut captured = PathBuf::new();
        with_scoped_temp_file(b"x", |path| {
            captured = path.to_path_buf();
            Ok(())
        })
        .unwrap();
        assert!(!captured.exists());
    }

    #[test]
    fn file_is_deleted_after_closure_error() {
        let mut captured = PathBuf::new();
        let result: CustodiaResult<()> = with_scoped_temp_file(b"x", |path| {
            captured = path.to_path_buf();
            Err(CustodiaError::Store { reason: "simulated".to_string() })
        });
        assert!(result.is_err());
        assert!(!captured.exists());
    }

    #[test]
    fn file_is_deleted_after_panic() {
        use std::sync::Mutex;

        let captured: Mutex<PathBuf> = Mutex::new(PathBuf::new());
        let outcome = std::panic::catch_unwind(|| {
            with_scoped_temp_file(b"x", |path| -> CustodiaResult<()> {
                *captured.lock().unwrap() = path.to_path_buf();
                panic!("simulated subprocess crash");
            })
        });
        assert!(outcome.is_err());
        assert!(!captured.lock().unwrap().exists());
    }

    #[cfg(unix)]
    #[test]
    fn temp_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        with_scoped_temp_file(b"secret", |path| {
            let mode = fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
            Ok(())
        })
        .unwrap();
    }
}
