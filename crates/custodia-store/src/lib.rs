//! # custodia-store
//!
//! Durable local persistence for audit records, plus the secure scoped
//! temporary workspace.
//!
//! ## Overview
//!
//! Records land as discrete, owner-only JSON files in a `pending/`
//! directory, move to a sibling `processed/` directory by atomic rename
//! once the remote sink acknowledges them, and are purged from
//! `processed/` — never from `pending/` — once past the retention window.

pub mod store;
pub mod temp;

pub use store::{RecordHandle, RecordStore};
pub use temp::with_scoped_temp_file;
