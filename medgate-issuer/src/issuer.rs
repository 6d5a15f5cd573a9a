//! License issuance.

use crate::atomic::{write_atomic, Visibility};
use crate::custody::SigningKey;
use chrono::{DateTime, Utc};
use medgate_license::{LicenseDraft, LicenseEntitlement, LicenseResult, LicenseToken};
use std::path::Path;
use tracing::{debug, info};

/// A signed license ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedLicense {
    pub entitlement: LicenseEntitlement,
    pub token: LicenseToken,
}

impl IssuedLicense {
    /// Returns the token text to write to the customer's license file.
    pub fn text(&self) -> String {
        self.token.encode()
    }
}

/// Validates `draft`, stamps it with the current time and signs it.
///
/// # Errors
///
/// [`medgate_license::LicenseError::InvalidEntitlement`] for a bad draft,
/// [`medgate_license::LicenseError::Signing`] if the key cannot sign.
pub fn issue(draft: LicenseDraft, key: &SigningKey) -> LicenseResult<IssuedLicense> {
    issue_at(draft, key, Utc::now())
}

/// Like [`issue`] with an explicit issue timestamp.
pub fn issue_at(
    draft: LicenseDraft,
    key: &SigningKey,
    issued_at: DateTime<Utc>,
) -> LicenseResult<IssuedLicense> {
    let entitlement = draft.into_entitlement(issued_at)?;
    let payload = entitlement.to_canonical_bytes()?;
    debug!("signing {} byte payload with epoch {}", payload.len(), key.epoch());

    let signature = key.sign(&payload)?;
    let token = LicenseToken::new(key.epoch(), payload, signature);

    info!(
        "issued {} license for {:?} bound to {}, expires {}",
        entitlement.plan, entitlement.licensee_name, entitlement.hardware_id, entitlement.expiry_date
    );
    Ok(IssuedLicense { entitlement, token })
}

/// Writes the token text to `path` atomically, replacing any previous license.
pub fn write_token(path: &Path, license: &IssuedLicense) -> LicenseResult<()> {
    let mut text = license.text();
    text.push('\n');
    write_atomic(path, text.as_bytes(), Visibility::Public, true)?;
    info!("wrote license to {}", path.display());
    Ok(())
}
