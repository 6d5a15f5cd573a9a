//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use medgate_license::{
    KeyEpoch, LicenseDraft, LicenseEntitlement, LicenseToken, Plan, TrustedKeys,
};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::sync::OnceLock;

pub const EPOCH: KeyEpoch = KeyEpoch::new(1);
pub const HOST: &str = "468067510a6c";
pub const OTHER_HOST: &str = "aa11bb22cc33";

/// The vendor key, generated once per test binary.
pub fn vendor_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap())
}

/// An unrelated key pair.
pub fn other_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap())
}

pub fn public_pem(key: &RsaPrivateKey) -> String {
    key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap()
}

/// A key ring trusting `key` under [`EPOCH`].
pub fn trusted(key: &RsaPrivateKey) -> TrustedKeys {
    TrustedKeys::single(EPOCH, &public_pem(key)).unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Signs raw payload bytes into token text.
pub fn sign_payload(key: &RsaPrivateKey, epoch: KeyEpoch, payload: &[u8]) -> String {
    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let signature = signing_key.sign(payload).to_vec();
    LicenseToken::new(epoch, payload.to_vec(), signature).encode()
}

/// Signs an entitlement's canonical bytes into token text.
pub fn sign_entitlement(key: &RsaPrivateKey, entitlement: &LicenseEntitlement) -> String {
    sign_payload(key, EPOCH, &entitlement.to_canonical_bytes().unwrap())
}

pub fn draft(hardware_id: &str, expiry: &str) -> LicenseDraft {
    LicenseDraft {
        hardware_id: hardware_id.into(),
        licensee_name: "St. Mary Hospital".into(),
        expiry_date: expiry.into(),
        plan: Plan::Enterprise,
        max_users: -1,
        modules: vec!["LAB".into(), "PHARMACY".into()],
    }
}

pub fn entitlement_from(draft: LicenseDraft) -> LicenseEntitlement {
    let issued_at = Utc.with_ymd_and_hms(2024, 12, 20, 9, 0, 0).unwrap();
    draft.into_entitlement(issued_at).unwrap()
}

/// ENTERPRISE, unlimited seats, LAB + PHARMACY, bound to [`HOST`], through 2026-12-31.
pub fn scenario_entitlement() -> LicenseEntitlement {
    entitlement_from(draft(HOST, "2026-12-31"))
}

/// Token text for [`scenario_entitlement`] signed by [`vendor_key`].
pub fn scenario_token() -> String {
    sign_entitlement(vendor_key(), &scenario_entitlement())
}
