//! Ed25519 signing key management.
//!
//! The key pair lives as two hex-encoded files in a fixed directory:
//! `audit_signing.key` (32-byte secret) and `audit_signing.pub` (32-byte
//! public). A missing pair is a fatal setup error at first use — generation
//! is an explicit one-time operation (`custodia keygen`), never performed
//! implicitly on the record-building hot path.

use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use tracing::info;

use custodia_contracts::error::{CustodiaError, CustodiaResult};

/// File name of the hex-encoded private key.
pub const PRIVATE_KEY_FILE: &str = "audit_signing.key";

/// File name of the hex-encoded public key.
pub const PUBLIC_KEY_FILE: &str = "audit_signing.pub";

/// The process-wide signing identity, loaded once per process lifetime.
///
/// The private key never leaves the key directory; this type only holds it
/// in memory for signing.
#[derive(Debug)]
pub struct SigningIdentity {
    signing_key: SigningKey,
}

impl SigningIdentity {
    /// Load the signing identity from `dir`.
    ///
    /// # Errors
    ///
    /// `Setup` when either key file is missing (the message points at the
    /// one-time `custodia keygen` step) or malformed.
    pub fn load(dir: &Path) -> CustodiaResult<Self> {
        let key_path = dir.join(PRIVATE_KEY_FILE);
        let contents = fs::read_to_string(&key_path).map_err(|e| CustodiaError::Setup {
            reason: format!(
                "signing key not found at '{}' ({}); run `custodia keygen` once to create it",
                key_path.display(),
                e
            ),
        })?;

        let bytes: [u8; 32] = hex::decode(contents.trim())
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| CustodiaError::Setup {
                reason: format!("signing key at '{}' is not 32 hex-encoded bytes", key_path.display()),
            })?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    /// The matching public verification key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign `message`, returning the hex-encoded Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(message);
        hex::encode(signature.to_bytes())
    }
}

/// Load only the public verification key from `dir`.
///
/// Verification-only paths (e.g. `custodia verify`) must not need the
/// private key.
pub fn load_verifying_key(dir: &Path) -> CustodiaResult<VerifyingKey> {
    let pub_path = dir.join(PUBLIC_KEY_FILE);
    let contents = fs::read_to_string(&pub_path).map_err(|e| CustodiaError::Setup {
        reason: format!(
            "public key not found at '{}' ({}); run `custodia keygen` once to create it",
            pub_path.display(),
            e
        ),
    })?;

    let bytes: [u8; 32] = hex::decode(contents.trim())
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| CustodiaError::Setup {
            reason: format!("public key at '{}' is not 32 hex-encoded bytes", pub_path.display()),
        })?;

    VerifyingKey::from_bytes(&bytes).map_err(|e| CustodiaError::Setup {
        reason: format!("public key at '{}' is not a valid Ed25519 point: {}", pub_path.display(), e),
    })
}

/// Generate a fresh key pair into `dir`, the explicit one-time setup step.
///
/// Refuses to overwrite an existing pair. Files are written with owner-only
/// permissions on Unix.
///
/// # Errors
///
/// `Setup` when a key file already exists or the directory is not writable.
pub fn generate_keypair(dir: &Path) -> CustodiaResult<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).map_err(|e| CustodiaError::Setup {
        reason: format!("cannot create key directory '{}': {}", dir.display(), e),
    })?;

    let key_path = dir.join(PRIVATE_KEY_FILE);
    let pub_path = dir.join(PUBLIC_KEY_FILE);
    if key_path.exists() || pub_path.exists() {
        return Err(CustodiaError::Setup {
            reason: format!(
                "key pair already exists in '{}'; refusing to overwrite",
                dir.display()
            ),
        });
    }

    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    write_restricted(&key_path, &hex::encode(signing_key.to_bytes()))?;
    write_restricted(&pub_path, &hex::encode(verifying_key.to_bytes()))?;

    info!(dir = %dir.display(), "generated Ed25519 signing key pair");
    Ok((key_path, pub_path))
}

/// Write `contents` to `path` with permissions restricted to the owner.
fn write_restricted(path: &Path, contents: &str) -> CustodiaResult<()> {
    fs::write(path, contents).map_err(|e| CustodiaError::Setup {
        reason: format!("cannot write key file '{}': {}", path.display(), e),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            CustodiaError::Setup {
                reason: format!("cannot restrict key file '{}': {}", path.display(), e),
            }
        })?;
    }

    Ok(())
}
