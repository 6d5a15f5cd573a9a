//! Vendor-side license issuance for MedGate.
//!
//! This crate holds the private signing key and must never be linked into the
//! application shipped to customers. It handles:
//! - RSA key pair generation and PEM export per key epoch
//! - Loading the private key for issuance
//! - Validating operator drafts and signing them into license tokens
//! - Atomic output of keys and license files
//!
//! # Issuing a license
//!
//! ```no_run
//! use medgate_issuer::{issue, load_signing_key, write_token};
//! use medgate_license::{LicenseDraft, Plan};
//! use std::path::Path;
//!
//! # fn run() -> medgate_license::LicenseResult<()> {
//! let key = load_signing_key(Path::new("license-epoch1.key.pem"), None)?;
//! let draft = LicenseDraft {
//!     hardware_id: "468067510a6c".into(),
//!     licensee_name: "St. Mary Hospital".into(),
//!     expiry_date: "2026-12-31".into(),
//!     plan: Plan::Enterprise,
//!     max_users: -1,
//!     modules: vec!["LAB".into(), "PHARMACY".into()],
//! };
//! let license = issue(draft, &key)?;
//! write_token(Path::new("license.mgl"), &license)?;
//! # Ok(())
//! # }
//! ```

mod atomic;
mod custody;
mod issuer;

pub use atomic::{write_atomic, Visibility};
pub use custody::{load_signing_key, write_key_pair, KeyFiles, KeyPair, SigningKey, KEY_BITS};
pub use issuer::{issue, issue_at, write_token, IssuedLicense};
