//! License token envelope.
//!
//! Tokens use the format: `MGL1.<epoch>.base64url(payload).base64url(signature)`
//!
//! - `MGL1` is the format-version tag.
//! - `epoch` names the signing key generation, so verifiers can trust several
//!   keys during rotation without trying each one.
//! - `payload` is the canonical entitlement encoding.
//! - `signature` is RSASSA-PKCS1-v1_5 with SHA-256 over the exact payload bytes.

use crate::entitlement::LicenseEntitlement;
use crate::error::{LicenseError, LicenseResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format-version tag of the current envelope.
pub const FORMAT_VERSION: &str = "MGL1";

/// Generation of a vendor signing key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyEpoch(u16);

impl KeyEpoch {
    /// Creates an epoch tag.
    #[must_use]
    pub const fn new(epoch: u16) -> Self {
        Self(epoch)
    }

    /// Returns the numeric epoch.
    #[must_use]
    pub const fn get(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for KeyEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeyEpoch {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Digits only, no leading zeros: the header is not signed, so each
        // epoch must have exactly one spelling. `u16::from_str` also accepts `+`.
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LicenseError::Malformed(format!("invalid key epoch {s:?}")));
        }
        if s.len() > 1 && s.starts_with('0') {
            return Err(LicenseError::Malformed(format!(
                "key epoch {s:?} has leading zeros"
            )));
        }
        s.parse::<u16>()
            .map(Self)
            .map_err(|e| LicenseError::Malformed(format!("invalid key epoch {s:?}: {e}")))
    }
}

/// A parsed, not yet verified, license token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseToken {
    epoch: KeyEpoch,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl LicenseToken {
    /// Assembles a token from its parts.
    pub fn new(epoch: KeyEpoch, payload: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            epoch,
            payload,
            signature,
        }
    }

    /// Parses token text. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Malformed`] if the envelope cannot be split and
    /// decoded. The payload is not interpreted here.
    pub fn parse(text: &str) -> LicenseResult<Self> {
        let text = text.trim();

        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() != 4 {
            return Err(LicenseError::Malformed(
                "token must have exactly four dot-separated parts".to_string(),
            ));
        }

        if parts[0] != FORMAT_VERSION {
            return Err(LicenseError::Malformed(format!(
                "unsupported token version {:?}",
                parts[0]
            )));
        }

        let epoch: KeyEpoch = parts[1].parse()?;

        let payload = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|e| LicenseError::Malformed(format!("invalid payload base64: {e}")))?;
        if payload.is_empty() {
            return Err(LicenseError::Malformed("empty payload".to_string()));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(parts[3])
            .map_err(|e| LicenseError::Malformed(format!("invalid signature base64: {e}")))?;
        if signature.is_empty() {
            return Err(LicenseError::Malformed("empty signature".to_string()));
        }

        Ok(Self {
            epoch,
            payload,
            signature,
        })
    }

    /// Renders the token text.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{FORMAT_VERSION}.{}.{}.{}",
            self.epoch,
            URL_SAFE_NO_PAD.encode(&self.payload),
            URL_SAFE_NO_PAD.encode(&self.signature)
        )
    }

    /// Returns the epoch of the key that signed this token.
    #[must_use]
    pub fn epoch(&self) -> KeyEpoch {
        self.epoch
    }

    /// Returns the signed payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the detached signature.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Decodes the payload without checking the signature.
    ///
    /// For vendor-side inspection only; nothing decoded this way may be
    /// trusted for enforcement.
    pub fn decode_unverified(&self) -> LicenseResult<LicenseEntitlement> {
        LicenseEntitlement::from_canonical_bytes(&self.payload)
    }
}

impl fmt::Display for LicenseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for LicenseToken {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
