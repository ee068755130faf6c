//! # custodia-redact
//!
//! Layered PII redaction for the Custodia audit pipeline.
//!
//! ## Overview
//!
//! Detection runs in two tiers. A deterministic local pattern set (email,
//! Japanese phone, `+81` phone, My Number, postal code, card number, IPv4)
//! runs on every call; an optional remote classifier augments it for the
//! languages it supports. Remote failures never fail the masking path —
//! they degrade to local-only, and the result records which tier ran.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use custodia_redact::{HttpClassifier, Redactor};
//!
//! let redactor = Redactor::with_classifier(Box::new(classifier));
//! let result = redactor.mask(prompt, "en", true);
//! assert_eq!(result.total_masked, result.findings.len());
//! ```

pub mod classifier;
pub mod masker;
pub mod patterns;

pub use classifier::{HttpClassifier, PiiClassifier};
pub use masker::Redactor;
