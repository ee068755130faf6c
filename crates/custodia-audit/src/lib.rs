//! # custodia-audit
//!
//! Tamper-evident audit records for the Custodia pipeline: a SHA-256 hash
//! chain with Ed25519 signatures and crash-safe, file-locked chain state.
//!
//! ## Overview
//!
//! Every request/response exchange produces one `AuditRecord` that commits
//! to the digest of its predecessor. Modifying any record — even a single
//! byte — invalidates its own signature and every subsequent `prev_hash`
//! link, which `verify_chain` detects with the public key alone.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use custodia_audit::{ChainStateFile, RecordBuilder, SigningIdentity};
//!
//! let builder = RecordBuilder::new(
//!     SigningIdentity::load(&key_dir)?,
//!     ChainStateFile::new(&store_root),
//! );
//! let record = builder.build(trace_id, request, response)?;
//! ```

pub mod builder;
pub mod chain;
pub mod keys;
pub mod state;

pub use builder::RecordBuilder;
pub use chain::{content_hash, hash_record, verify_chain, verify_record};
pub use keys::{generate_keypair, load_verifying_key, SigningIdentity};
pub use state::{ChainState, ChainStateFile};
