//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
///
/// Verification never surfaces these to the host: the verifier folds every
/// failure into a [`VerificationVerdict`](crate::VerificationVerdict). They
/// reach callers only from issuance, key handling and configuration.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Draft entitlement failed validation before signing.
    #[error("invalid entitlement: {0}")]
    InvalidEntitlement(String),

    /// Private key is unusable or signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Public key material could not be loaded.
    #[error("invalid public key: {0}")]
    Key(String),

    /// Token text is not a well-formed license envelope.
    #[error("malformed license token: {0}")]
    Malformed(String),

    /// No stable host attribute could be read.
    #[error("hardware fingerprint unavailable: {0}")]
    FingerprintUnavailable(String),

    /// Configuration file is unreadable or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
