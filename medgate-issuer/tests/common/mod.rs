//! Shared test helpers for issuer tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use medgate_issuer::{KeyPair, SigningKey};
use medgate_license::{KeyEpoch, LicenseDraft, Plan, TrustedKeys};
use std::sync::OnceLock;

pub const EPOCH: KeyEpoch = KeyEpoch::new(1);
pub const HOST: &str = "468067510a6c";
pub const OTHER_HOST: &str = "aa11bb22cc33";

/// The vendor key pair, generated once per test binary.
pub fn vendor_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| KeyPair::generate(EPOCH).unwrap())
}

/// An unrelated key pair.
pub fn other_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| KeyPair::generate(EPOCH).unwrap())
}

pub fn signing_key() -> SigningKey {
    vendor_pair().signing_key()
}

/// A key ring trusting `pair` under its own epoch.
pub fn trusted(pair: &KeyPair) -> TrustedKeys {
    TrustedKeys::single(pair.epoch(), &pair.export_public_key().unwrap()).unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn issued_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 20, 9, 0, 0).unwrap()
}

/// St. Mary Hospital: ENTERPRISE, unlimited seats, LAB + PHARMACY.
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
