//! License verification and entitlement enforcement for MedGate.
//!
//! This crate is the customer-site half of the licensing system:
//! - Entitlement model and its canonical encoding
//! - Signed token envelope parsing
//! - Hardware fingerprinting for host binding
//! - Offline signature, hardware and expiry verification
//! - Module and seat gating with an atomically replaced license state
//!
//! It only ever holds public keys. Signing lives in `medgate-issuer`, which is
//! never shipped to customers.
//!
//! # Startup
//!
//! ```no_run
//! use medgate_license::{spawn_refresh_task, LicenseConfig, LicenseGuard};
//! use std::sync::Arc;
//!
//! # async fn start() -> medgate_license::LicenseResult<()> {
//! let config = LicenseConfig::load()?;
//! let guard = Arc::new(LicenseGuard::from_config(&config)?);
//! guard.refresh();
//! let _task = spawn_refresh_task(Arc::clone(&guard), config.refresh_interval());
//!
//! if guard.is_module_enabled("PHARMACY") {
//!     // serve pharmacy routes
//! }
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod entitlement;
mod error;
mod fingerprint;
mod guard;
mod keys;
mod refresh;
mod token;
mod verifier;

pub use clock::{CheckTime, Clock, ManualClock, SystemClock};
pub use config::{
    LicenseConfig, DEFAULT_CONFIG_PATH, DEFAULT_FINGERPRINT_TIMEOUT_MS, DEFAULT_PUBLIC_KEY_PATH,
    DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_TOKEN_PATH,
};
pub use entitlement::{
    LicenseDraft, LicenseEntitlement, ModuleId, Plan, SeatLimit, KNOWN_MODULES, UNLIMITED_USERS,
};
pub use error::{LicenseError, LicenseResult};
pub use fingerprint::{
    compute_hardware_id, compute_hardware_id_with_timeout, machine_id_digest, normalize_mac,
    FixedProbe, HardwareId, HardwareProbe, HostInfo, SystemProbe, DEFAULT_FINGERPRINT_TIMEOUT,
};
pub use guard::{EnforcementState, GracePolicy, LicenseGuard, LicenseSnapshot};
pub use keys::{parse_public_key_pem, TrustedKeys, MIN_KEY_BITS};
pub use refresh::spawn_refresh_task;
pub use token::{KeyEpoch, LicenseToken, FORMAT_VERSION};
pub use verifier::{verify, verify_with_fingerprint, FailureReason, VerificationVerdict};
