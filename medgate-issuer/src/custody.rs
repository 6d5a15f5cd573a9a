//! Vendor key custody.
//!
//! One RSA-2048 key pair exists per [`KeyEpoch`]. The private half is exported
//! as PKCS#8 PEM for cold storage and stays on the issuing machine; the public
//! half is exported as SPKI PEM and shipped with the application.

use crate::atomic::{write_atomic, Visibility};
use medgate_license::{KeyEpoch, LicenseError, LicenseResult, MIN_KEY_BITS};
use rand::rngs::OsRng;
use rsa::pkcs1v15::{SigningKey as RsaSigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Modulus size of generated keys.
pub const KEY_BITS: usize = 2048;

/// A freshly generated vendor key pair.
pub struct KeyPair {
    epoch: KeyEpoch,
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generates a new key pair for `epoch` from the OS random source.
    pub fn generate(epoch: KeyEpoch) -> LicenseResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| LicenseError::Signing(format!("key generation failed: {e}")))?;
        let public = private.to_public_key();
        info!("generated {KEY_BITS}-bit key pair for epoch {epoch}");
        Ok(Self {
            epoch,
            private,
            public,
        })
    }

    /// Returns the key epoch.
    pub fn epoch(&self) -> KeyEpoch {
        self.epoch
    }

    /// Returns the public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Exports the public key as SPKI PEM.
    pub fn export_public_key(&self) -> LicenseResult<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| LicenseError::Signing(format!("public key export failed: {e}")))
    }

    /// Exports the private key as PKCS#8 PEM. The buffer is wiped on drop.
    pub fn export_private_key(&self) -> LicenseResult<Zeroizing<String>> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| LicenseError::Signing(format!("private key export failed: {e}")))
    }

    /// Returns a signing key for this pair.
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_private(self.epoch, self.private.clone())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("epoch", &self.epoch)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Private key loaded for issuance.
pub struct SigningKey {
    epoch: KeyEpoch,
    inner: RsaSigningKey<Sha256>,
    public: RsaPublicKey,
}

impl SigningKey {
    fn from_private(epoch: KeyEpoch, private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self {
            epoch,
            inner: RsaSigningKey::new(private),
            public,
        }
    }

    /// Parses a PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Signing`] if the PEM is not an RSA PKCS#8 key,
    /// fails consistency checks, or is shorter than 2048 bits.
    pub fn from_pkcs8_pem(epoch: KeyEpoch, pem: &str) -> LicenseResult<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem.trim())
            .map_err(|e| LicenseError::Signing(format!("not a PKCS#8 RSA private key: {e}")))?;
        private
            .validate()
            .map_err(|e| LicenseError::Signing(format!("private key is corrupted: {e}")))?;
        let bits = private.size() * 8;
        if bits < MIN_KEY_BITS {
            return Err(LicenseError::Signing(format!(
                "key is {bits} bits, at least {MIN_KEY_BITS} required"
            )));
        }
        Ok(Self::from_private(epoch, private))
    }

    /// Reads and parses a PKCS#8 PEM private key file.
    pub fn load(epoch: KeyEpoch, path: &Path) -> LicenseResult<Self> {
        let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            LicenseError::Storage(format!("failed to read private key {}: {e}", path.display()))
        })?);
        Self::from_pkcs8_pem(epoch, &pem)
    }

    /// Returns the key epoch tagged into issued tokens.
    pub fn epoch(&self) -> KeyEpoch {
        self.epoch
    }

    /// Exports the matching public key as SPKI PEM.
    pub fn public_key_pem(&self) -> LicenseResult<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| LicenseError::Signing(format!("public key export failed: {e}")))
    }

    /// Signs `payload` and checks the signature against the public half.
    pub(crate) fn sign(&self, payload: &[u8]) -> LicenseResult<Vec<u8>> {
        let signature = self
            .inner
            .try_sign(payload)
            .map_err(|e| LicenseError::Signing(e.to_string()))?;
        VerifyingKey::<Sha256>::new(self.public.clone())
            .verify(payload, &signature)
            .map_err(|e| LicenseError::Signing(format!("signature self-check failed: {e}")))?;
        Ok(signature.to_vec())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("epoch", &self.epoch)
            .field("inner", &"[REDACTED]")
            .finish()
    }
}

/// Paths of a persisted key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFiles {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl KeyFiles {
    /// Standard file names for `epoch` inside `dir`.
    pub fn in_dir(dir: &Path, epoch: KeyEpoch) -> Self {
        Self {
            private_key: dir.join(format!("license-epoch{epoch}.key.pem")),
            public_key: dir.join(format!("license-epoch{epoch}.pub.pem")),
        }
    }

    /// Reads the epoch from a standard private key file name.
    pub fn epoch_of_private_key(path: &Path) -> Option<KeyEpoch> {
        path.file_name()?
            .to_str()?
            .strip_prefix("license-epoch")?
            .strip_suffix(".key.pem")?
            .parse()
            .ok()
    }
}

/// Loads a private key for issuance and settles which epoch it signs as.
///
/// The epoch comes from a standard `license-epoch<N>.key.pem` name, otherwise
/// from `epoch`; when both are given they must agree. If the epoch's public
/// key file sits next to the private key, it must be the matching half.
pub fn load_signing_key(path: &Path, epoch: Option<KeyEpoch>) -> LicenseResult<SigningKey> {
    let epoch = match (KeyFiles::epoch_of_private_key(path), epoch) {
        (Some(named), Some(given)) if named != given => {
            return Err(LicenseError::Signing(format!(
                "{} is the epoch {named} key, not epoch {given}",
                path.display()
            )));
        }
        (Some(named), _) => named,
        (None, Some(given)) => given,
        (None, None) => {
            return Err(LicenseError::Signing(format!(
                "cannot tell the key epoch of {}; name it license-epoch<N>.key.pem or give the epoch",
                path.display()
            )));
        }
    };

    let key = SigningKey::load(epoch, path)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let public_path = KeyFiles::in_dir(dir, epoch).public_key;
    if public_path.exists() {
        let published = std::fs::read_to_string(&public_path).map_err(|e| {
            LicenseError::Storage(format!("failed to read {}: {e}", public_path.display()))
        })?;
        if published.trim() != key.public_key_pem()?.trim() {
            return Err(LicenseError::Signing(format!(
                "{} does not match the public key {} published for epoch {epoch}",
                path.display(),
                public_path.display()
            )));
        }
    }

    debug!("loaded signing key for epoch {epoch} from {}", path.display());
    Ok(key)
}

/// Persists a key pair under its standard names in `dir`.
///
/// The private key is written owner-only and never overwritten: an existing
/// private key for the same epoch is an error. The public key goes first, so a
/// failed run leaves at most a public file that the next run replaces.
pub fn write_key_pair(dir: &Path, pair: &KeyPair) -> LicenseResult<KeyFiles> {
    std::fs::create_dir_all(dir).map_err(|e| {
        LicenseError::Storage(format!("failed to create {}: {e}", dir.display()))
    })?;

    let files = KeyFiles::in_dir(dir, pair.epoch());
    if files.private_key.exists() {
        return Err(LicenseError::Storage(format!(
            "refusing to overwrite existing private key {}",
            files.private_key.display()
        )));
    }

    write_atomic(
        &files.public_key,
        pair.export_public_key()?.as_bytes(),
        Visibility::Public,
        true,
    )?;
    let private_pem = pair.export_private_key()?;
    write_atomic(
        &files.private_key,
        private_pem.as_bytes(),
        Visibility::Private,
        false,
    )?;

    info!(
        "wrote key pair for epoch {} to {}",
        pair.epoch(),
        dir.display()
    );
    Ok(files)
}
