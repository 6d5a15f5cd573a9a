//! License verification.
//!
//! [`verify`] runs the checks in a fixed order and stops at the first failure:
//!
//! 1. format: the envelope parses
//! 2. signature: the token's key epoch is trusted and the signature covers the
//!    exact payload bytes, which then decode as a canonical entitlement
//! 3. hardware: the entitlement is bound to this host
//! 4. expiry: today is on or before the expiry date
//!
//! Hardware precedes expiry so an expired license copied to another machine
//! reports the wrong machine. Every outcome is a [`VerificationVerdict`]; no
//! error escapes this module.

use crate::clock::CheckTime;
use crate::entitlement::LicenseEntitlement;
use crate::error::LicenseResult;
use crate::fingerprint::HardwareId;
use crate::keys::TrustedKeys;
use crate::token::LicenseToken;
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::Signature;
use rsa::signature::Verifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Why a license is not valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No verification has run yet.
    Unchecked,
    /// The token file could not be read.
    Missing,
    /// The token is not a well-formed envelope or entitlement.
    Malformed,
    /// The signature does not verify under a trusted key.
    SignatureInvalid,
    /// The license is bound to a different host.
    HardwareMismatch,
    /// The expiry date has passed.
    Expired,
    /// The host's hardware id could not be determined.
    FingerprintUnavailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unchecked => "license not yet checked",
            Self::Missing => "license file missing or unreadable",
            Self::Malformed => "license file is malformed",
            Self::SignatureInvalid => "license signature invalid",
            Self::HardwareMismatch => "license is bound to a different machine",
            Self::Expired => "license expired",
            Self::FingerprintUnavailable => "hardware fingerprint unavailable",
        };
        f.write_str(text)
    }
}

/// Outcome of one verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationVerdict {
    pub valid: bool,
    /// Failure cause; `None` exactly when `valid`.
    pub reason: Option<FailureReason>,
    /// Decoded entitlement, present whenever the signature verified.
    pub entitlement: Option<LicenseEntitlement>,
    pub checked_at: DateTime<Utc>,
}

impl VerificationVerdict {
    /// A passing verdict.
    pub fn valid(entitlement: LicenseEntitlement, checked_at: DateTime<Utc>) -> Self {
        Self {
            valid: true,
            reason: None,
            entitlement: Some(entitlement),
            checked_at,
        }
    }

    /// A failing verdict.
    pub fn failure(
        reason: FailureReason,
        entitlement: Option<LicenseEntitlement>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            entitlement,
            checked_at,
        }
    }

    /// The verdict held before any verification has run.
    pub fn unchecked(checked_at: DateTime<Utc>) -> Self {
        Self::failure(FailureReason::Unchecked, None, checked_at)
    }

    /// A message suitable for an operator, e.g. `license expired on 2026-12-31`.
    #[must_use]
    pub fn message(&self) -> String {
        match (self.reason, &self.entitlement) {
            (None, Some(ent)) => format!(
                "licensed to {} ({}) through {}",
                ent.licensee_name, ent.plan, ent.expiry_date
            ),
            (None, None) => "license valid".to_string(),
            (Some(FailureReason::Expired), Some(ent)) => {
                format!("license expired on {}", ent.expiry_date)
            }
            (Some(FailureReason::HardwareMismatch), Some(ent)) => format!(
                "license is bound to hardware id {}, not this machine",
                ent.hardware_id
            ),
            (Some(reason), _) => reason.to_string(),
        }
    }
}

/// Verifies token text for the host identified by `hardware_id` at `now`.
pub fn verify(
    token: &str,
    keys: &TrustedKeys,
    hardware_id: &HardwareId,
    now: CheckTime,
) -> VerificationVerdict {
    check(token, keys, Some(hardware_id), now)
}

/// Like [`verify`], taking the fingerprinting result as-is.
///
/// A fingerprint failure yields [`FailureReason::FingerprintUnavailable`] in
/// place of the hardware check, after the signature check, so the verdict
/// still carries the entitlement when the token is genuine.
pub fn verify_with_fingerprint(
    token: &str,
    keys: &TrustedKeys,
    hardware_id: &LicenseResult<HardwareId>,
    now: CheckTime,
) -> VerificationVerdict {
    match hardware_id {
        Ok(id) => check(token, keys, Some(id), now),
        Err(e) => {
            debug!("verifying without hardware id: {e}");
            check(token, keys, None, now)
        }
    }
}

fn check(
    token: &str,
    keys: &TrustedKeys,
    hardware_id: Option<&HardwareId>,
    now: CheckTime,
) -> VerificationVerdict {
    let fail = |reason, entitlement| VerificationVerdict::failure(reason, entitlement, now.at);

    // 1. Format
    let token = match LicenseToken::parse(token) {
        Ok(token) => token,
        Err(e) => {
            debug!("license token rejected: {e}");
            return fail(FailureReason::Malformed, None);
        }
    };

    // 2. Signature
    let Some(verifying_key) = keys.get(token.epoch()) else {
        debug!("license signed by untrusted key epoch {}", token.epoch());
        return fail(FailureReason::SignatureInvalid, None);
    };
    let signature_ok = Signature::try_from(token.signature())
        .and_then(|signature| verifying_key.verify(token.payload(), &signature))
        .is_ok();
    if !signature_ok {
        debug!("license signature does not verify under epoch {}", token.epoch());
        return fail(FailureReason::SignatureInvalid, None);
    }
    let entitlement = match LicenseEntitlement::from_canonical_bytes(token.payload()) {
        Ok(entitlement) => entitlement,
        Err(e) => {
            debug!("signed payload rejected: {e}");
            return fail(FailureReason::Malformed, None);
        }
    };

    // 3. Hardware
    let Some(hardware_id) = hardware_id else {
        return fail(FailureReason::FingerprintUnavailable, Some(entitlement));
    };
    if entitlement.hardware_id != *hardware_id {
        return fail(FailureReason::HardwareMismatch, Some(entitlement));
    }

    // 4. Expiry (inclusive, by calendar date)
    if now.date > entitlement.expiry_date {
        return fail(FailureReason::Expired, Some(entitlement));
    }

    VerificationVerdict::valid(entitlement, now.at)
}
