//! Trusted public keys for signature verification.

use crate::error::{LicenseError, LicenseResult};
use crate::token::KeyEpoch;
use rsa::RsaPublicKey;
use rsa::pkcs1v15::VerifyingKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Smallest accepted RSA modulus, in bits.
pub const MIN_KEY_BITS: usize = 2048;

/// Parses an SPKI PEM public key, rejecting keys below [`MIN_KEY_BITS`].
pub fn parse_public_key_pem(pem: &str) -> LicenseResult<RsaPublicKey> {
    let key = RsaPublicKey::from_public_key_pem(pem.trim())
        .map_err(|e| LicenseError::Key(format!("not an SPKI RSA public key: {e}")))?;
    let bits = key.size() * 8;
    if bits < MIN_KEY_BITS {
        return Err(LicenseError::Key(format!(
            "key is {bits} bits, at least {MIN_KEY_BITS} required"
        )));
    }
    Ok(key)
}

/// Public keys the verifier accepts, one per key epoch.
#[derive(Default)]
pub struct TrustedKeys {
    keys: BTreeMap<KeyEpoch, VerifyingKey<Sha256>>,
}

impl TrustedKeys {
    /// Creates an empty key ring. Every token fails verification against it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a key ring holding a single PEM key.
    pub fn single(epoch: KeyEpoch, pem: &str) -> LicenseResult<Self> {
        let mut keys = Self::new();
        keys.insert_pem(epoch, pem)?;
        Ok(keys)
    }

    /// Loads one PEM file per epoch.
    pub fn load<P: AsRef<Path>>(files: &BTreeMap<KeyEpoch, P>) -> LicenseResult<Self> {
        let mut keys = Self::new();
        for (epoch, path) in files {
            keys.insert_file(*epoch, path.as_ref())?;
        }
        Ok(keys)
    }

    /// Adds a PEM key, replacing any key already trusted for `epoch`.
    pub fn insert_pem(&mut self, epoch: KeyEpoch, pem: &str) -> LicenseResult<()> {
        let key = parse_public_key_pem(pem)?;
        self.insert(epoch, key);
        Ok(())
    }

    /// Adds a parsed key.
    pub fn insert(&mut self, epoch: KeyEpoch, key: RsaPublicKey) {
        self.keys.insert(epoch, VerifyingKey::new(key));
    }

    /// Reads and adds a PEM key file.
    pub fn insert_file(&mut self, epoch: KeyEpoch, path: &Path) -> LicenseResult<()> {
        let pem = std::fs::read_to_string(path).map_err(|e| {
            LicenseError::Key(format!("failed to read public key {}: {e}", path.display()))
        })?;
        self.insert_pem(epoch, &pem)
    }

    /// Returns the verifying key for `epoch`, if trusted.
    pub fn get(&self, epoch: KeyEpoch) -> Option<&VerifyingKey<Sha256>> {
        self.keys.get(&epoch)
    }

    /// Returns the trusted epochs in ascending order.
    pub fn epochs(&self) -> impl Iterator<Item = KeyEpoch> + '_ {
        self.keys.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for TrustedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedKeys")
            .field("epochs", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}
