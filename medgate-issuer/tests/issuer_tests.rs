mod common;

use common::{date, draft, issued_at, other_pair, signing_key, trusted, vendor_pair, HOST, OTHER_HOST};
use medgate_issuer::{issue, issue_at, write_token, SigningKey};
use medgate_license::{
    verify, CheckTime, EnforcementState, FailureReason, FixedProbe, HardwareId, KeyEpoch,
    LicenseError, LicenseGuard, LicenseToken, ManualClock, Plan, SeatLimit,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

fn on(day: &str) -> CheckTime {
    CheckTime::on(date(day))
}

// ── Draft validation ─────────────────────────────────────────────

#[test]
fn empty_hardware_id_is_rejected() {
    let err = issue(draft("  ", "2026-12-31"), &signing_key()).unwrap_err();
    assert!(matches!(err, LicenseError::InvalidEntitlement(_)));
}

#[test]
fn malformed_expiry_is_rejected() {
    for expiry in ["2026-13-01", "31/12/2026", "2026-02-30", ""] {
        let err = issue(draft(HOST, expiry), &signing_key()).unwrap_err();
        assert!(
            matches!(err, LicenseError::InvalidEntitlement(_)),
            "{expiry:?} accepted"
        );
    }
}

#[test]
fn zero_and_negative_seat_counts_are_rejected() {
    for max_users in [0, -2, -100] {
        let mut d = draft(HOST, "2026-12-31");
        d.max_users = max_users;
        let err = issue(d, &signing_key()).unwrap_err();
        assert!(matches!(err, LicenseError::InvalidEntitlement(_)));
    }
}

#[test]
fn empty_module_list_is_rejected() {
    let mut d = draft(HOST, "2026-12-31");
    d.modules.clear();
    assert!(matches!(
        issue(d, &signing_key()),
        Err(LicenseError::InvalidEntitlement(_))
    ));
}

#[test]
fn unknown_module_is_rejected() {
    let mut d = draft(HOST, "2026-12-31");
    d.modules.push("TELEPORT".into());
    let err = issue(d, &signing_key()).unwrap_err();
    assert!(err.to_string().contains("TELEPORT"));
}

#[test]
fn module_names_are_normalized() {
    let mut d = draft(HOST, "2026-12-31");
    d.modules = vec!["pharmacy".into(), " LAB ".into(), "PHARMACY".into()];
    let license = issue_at(d, &signing_key(), issued_at()).unwrap();
    let modules: Vec<&str> = license
        .entitlement
        .modules
        .iter()
        .map(|m| m.as_str())
        .collect();
    assert_eq!(modules, vec!["LAB", "PHARMACY"]);
}

#[test]
fn rejected_draft_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("license.mgl");
    let result = issue(draft(HOST, "not-a-date"), &signing_key())
        .and_then(|license| write_token(&out, &license));
    assert!(result.is_err());
    assert!(!out.exists());
}

// ── Token shape ──────────────────────────────────────────────────

#[test]
fn token_carries_signing_epoch() {
    let pem = vendor_pair().export_private_key().unwrap();
    let key = SigningKey::from_pkcs8_pem(KeyEpoch::new(7), &pem).unwrap();
    let license = issue_at(draft(HOST, "2026-12-31"), &key, issued_at()).unwrap();
    assert_eq!(license.token.epoch(), KeyEpoch::new(7));
    assert!(license.text().starts_with("MGL1.7."));
}

#[test]
fn issued_at_is_truncated_to_seconds() {
    let at = issued_at() + chrono::Duration::milliseconds(750);
    let license = issue_at(draft(HOST, "2026-12-31"), &signing_key(), at).unwrap();
    assert_eq!(license.entitlement.issued_at, issued_at());
}

#[test]
fn token_text_parses_back() {
    let license = issue_at(draft(HOST, "2026-12-31"), &signing_key(), issued_at()).unwrap();
    let parsed = LicenseToken::parse(&license.text()).unwrap();
    assert_eq!(parsed, license.token);
    assert_eq!(parsed.decode_unverified().unwrap(), license.entitlement);
}

// ── Issue then verify ────────────────────────────────────────────

#[test]
fn st_mary_license_is_valid_on_its_host() {
    let license = issue_at(draft(HOST, "2026-12-31"), &signing_key(), issued_at()).unwrap();
    let verdict = verify(
        &license.text(),
        &trusted(vendor_pair()),
        &HardwareId::new(HOST),
        on("2025-01-01"),
    );

    assert!(verdict.valid);
    let entitlement = verdict.entitlement.unwrap();
    assert_eq!(entitlement.plan, Plan::Enterprise);
    assert_eq!(entitlement.max_users, SeatLimit::Unlimited);
    assert!(entitlement.has_module("PHARMACY"));
    assert!(!entitlement.has_module("RADIOLOGY"));
}

#[test]
fn st_mary_license_is_rejected_on_another_host() {
    let license = issue(draft(HOST, "2026-12-31"), &signing_key()).unwrap();
    let verdict = verify(
        &license.text(),
        &trusted(vendor_pair()),
        &HardwareId::new(OTHER_HOST),
        on("2025-01-01"),
    );
    assert_eq!(verdict.reason, Some(FailureReason::HardwareMismatch));
}

#[test]
fn license_signed_by_another_vendor_key_is_rejected() {
    let license = issue(draft(HOST, "2026-12-31"), &other_pair().signing_key()).unwrap();
    let verdict = verify(
        &license.text(),
        &trusted(vendor_pair()),
        &HardwareId::new(HOST),
        on("2025-01-01"),
    );
    assert_eq!(verdict.reason, Some(FailureReason::SignatureInvalid));
    assert_eq!(verdict.entitlement, None);
}

#[test]
fn written_license_drives_the_guard() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("license.mgl");
    let license = issue(draft(HOST, "2026-12-31"), &signing_key()).unwrap();
    write_token(&path, &license).unwrap();

    let guard = LicenseGuard::new(&path, trusted(vendor_pair()))
        .with_probe(Arc::new(FixedProbe::new(HOST)))
        .with_clock(Arc::new(ManualClock::new(date("2025-01-01"))));
    assert!(!guard.is_module_enabled("PHARMACY"));

    guard.refresh();
    assert_eq!(guard.state(), EnforcementState::Valid);
    assert!(guard.is_module_enabled("PHARMACY"));
    assert!(!guard.is_module_enabled("RADIOLOGY"));
    assert!(guard.check_seat_limit(10_000));
}

#[test]
fn rewriting_license_replaces_previous_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("license.mgl");
    let first = issue(draft(HOST, "2026-12-31"), &signing_key()).unwrap();
    write_token(&path, &first).unwrap();

    let mut renewal = draft(HOST, "2027-12-31");
    renewal.modules.push("RADIOLOGY".into());
    let second = issue(renewal, &signing_key()).unwrap();
    write_token(&path, &second).unwrap();

    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk.trim(), second.text());

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["license.mgl".to_string()]);
}

// ── Properties ───────────────────────────────────────────────────

fn module_subset() -> impl Strategy<Value = Vec<String>> {
    proptest::sample::subsequence(medgate_license::KNOWN_MODULES.to_vec(), 1..=8)
        .prop_map(|modules| modules.into_iter().map(String::from).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn issued_licenses_verify_until_expiry(
        modules in module_subset(),
        seats in prop_oneof![Just(-1i64), 1i64..5000],
        days in 0i64..3650,
        plan in prop_oneof![Just(Plan::Trial), Just(Plan::Standard), Just(Plan::Enterprise)],
    ) {
        let expiry = date("2025-01-01") + chrono::Duration::days(days);
        let mut d = draft(HOST, &expiry.format("%Y-%m-%d").to_string());
        d.modules = modules.clone();
        d.max_users = seats;
        d.plan = plan;

        let license = issue_at(d, &signing_key(), issued_at()).unwrap();
        let keys = trusted(vendor_pair());
        let host = HardwareId::new(HOST);

        let verdict = verify(&license.text(), &keys, &host, CheckTime::on(expiry));
        prop_assert!(verdict.valid);
        let entitlement = verdict.entitlement.unwrap();
        prop_assert_eq!(&entitlement, &license.entitlement);
        for module in &modules {
            prop_assert!(entitlement.has_module(module));
        }

        let late = verify(&license.text(), &keys, &host, CheckTime::on(expiry.succ_opt().unwrap()));
        prop_assert_eq!(late.reason, Some(FailureReason::Expired));
    }
}
