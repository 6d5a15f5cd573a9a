//! Entitlement model and its canonical encoding.
//!
//! The signed payload of every license is the canonical byte form of a
//! [`LicenseEntitlement`]: compact JSON with a fixed field order, modules sorted
//! and de-duplicated, dates as `YYYY-MM-DD` and the issue timestamp as RFC 3339
//! with whole seconds. One logical entitlement has exactly one encoding.

use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::HardwareId;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Sentinel value of `maxUsers` meaning no seat limit.
pub const UNLIMITED_USERS: i64 = -1;

/// Module identifiers a license may be issued for.
pub const KNOWN_MODULES: &[&str] = &[
    "LAB",
    "PHARMACY",
    "RADIOLOGY",
    "BILLING",
    "INVENTORY",
    "CLINICAL",
    "EMERGENCY",
    "REPORTS",
];

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    /// Time-limited evaluation.
    Trial,
    /// Standard subscription.
    Standard,
    /// Enterprise subscription.
    Enterprise,
}

impl Plan {
    /// Returns the wire name of the plan.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "TRIAL",
            Self::Standard => "STANDARD",
            Self::Enterprise => "ENTERPRISE",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRIAL" => Ok(Self::Trial),
            "STANDARD" => Ok(Self::Standard),
            "ENTERPRISE" => Ok(Self::Enterprise),
            other => Err(LicenseError::InvalidEntitlement(format!(
                "unknown plan {other:?}"
            ))),
        }
    }
}

/// Identifier of a gated feature module, e.g. `PHARMACY`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wraps a module identifier without checking it against the vocabulary.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is part of [`KNOWN_MODULES`].
    #[must_use]
    pub fn is_known(&self) -> bool {
        KNOWN_MODULES.contains(&self.0.as_str())
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maximum number of concurrently active users.
///
/// Encoded on the wire as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SeatLimit {
    /// At most this many active users.
    Limited(u32),
    /// No limit.
    Unlimited,
}

impl SeatLimit {
    /// Returns true if `active_users` fits within the limit.
    #[must_use]
    pub fn permits(&self, active_users: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(max) => active_users <= u64::from(*max),
        }
    }
}

impl TryFrom<i64> for SeatLimit {
    type Error = LicenseError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == UNLIMITED_USERS {
            return Ok(Self::Unlimited);
        }
        match u32::try_from(value) {
            Ok(n) if n > 0 => Ok(Self::Limited(n)),
            _ => Err(LicenseError::InvalidEntitlement(format!(
                "maxUsers must be a positive integer or {UNLIMITED_USERS}, got {value}"
            ))),
        }
    }
}

impl From<SeatLimit> for i64 {
    fn from(limit: SeatLimit) -> Self {
        match limit {
            SeatLimit::Unlimited => UNLIMITED_USERS,
            SeatLimit::Limited(n) => i64::from(n),
        }
    }
}

impl fmt::Display for SeatLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Limited(n) => write!(f, "{n}"),
        }
    }
}

/// The signed payload of a license.
///
/// Field declaration order is the canonical field order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LicenseEntitlement {
    /// Host this license is bound to.
    pub hardware_id: HardwareId,
    /// Customer name, informational.
    pub licensee_name: String,
    /// Last day (inclusive) on which the license is valid.
    pub expiry_date: NaiveDate,
    /// Subscription tier.
    pub plan: Plan,
    /// Seat limit.
    pub max_users: SeatLimit,
    /// Enabled modules.
    pub modules: BTreeSet<ModuleId>,
    /// When the issuer signed this entitlement (audit only).
    #[serde(with = "rfc3339_seconds")]
    pub issued_at: DateTime<Utc>,
}

impl LicenseEntitlement {
    /// Returns true if `module` is enabled by this entitlement.
    #[must_use]
    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    /// Encodes the entitlement into its canonical byte form.
    pub fn to_canonical_bytes(&self) -> LicenseResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an entitlement, rejecting any payload that is not byte-for-byte
    /// the canonical encoding of the value it decodes to.
    pub fn from_canonical_bytes(bytes: &[u8]) -> LicenseResult<Self> {
        let entitlement: Self = serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::Malformed(format!("invalid entitlement payload: {e}")))?;
        if entitlement.to_canonical_bytes()? != bytes {
            return Err(LicenseError::Malformed(
                "entitlement payload is not canonically encoded".to_string(),
            ));
        }
        Ok(entitlement)
    }
}

/// Operator-supplied entitlement, before validation and signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseDraft {
    pub hardware_id: String,
    pub licensee_name: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub expiry_date: String,
    pub plan: Plan,
    /// Positive seat count, or `-1` for unlimited.
    pub max_users: i64,
    pub modules: Vec<String>,
}

impl LicenseDraft {
    /// Validates the draft and stamps it with `issued_at`, truncated to whole
    /// seconds.
    pub fn into_entitlement(self, issued_at: DateTime<Utc>) -> LicenseResult<LicenseEntitlement> {
        let hardware_id = self.hardware_id.trim();
        if hardware_id.is_empty() {
            return Err(LicenseError::InvalidEntitlement(
                "hardwareId must not be empty".to_string(),
            ));
        }

        let licensee_name = self.licensee_name.trim();
        if licensee_name.is_empty() {
            return Err(LicenseError::InvalidEntitlement(
                "licenseeName must not be empty".to_string(),
            ));
        }

        let expiry_date = NaiveDate::parse_from_str(self.expiry_date.trim(), "%Y-%m-%d")
            .map_err(|e| {
                LicenseError::InvalidEntitlement(format!(
                    "expiryDate {:?} is not a valid YYYY-MM-DD date: {e}",
                    self.expiry_date
                ))
            })?;

        let max_users = SeatLimit::try_from(self.max_users)?;

        if self.modules.is_empty() {
            return Err(LicenseError::InvalidEntitlement(
                "at least one module must be enabled".to_string(),
            ));
        }
        let mut modules = BTreeSet::new();
        for raw in &self.modules {
            let module = ModuleId::new(raw.trim().to_ascii_uppercase());
            if !module.is_known() {
                return Err(LicenseError::InvalidEntitlement(format!(
                    "unknown module {raw:?} (known: {})",
                    KNOWN_MODULES.join(", ")
                )));
            }
            modules.insert(module);
        }

        Ok(LicenseEntitlement {
            hardware_id: HardwareId::new(hardware_id),
            licensee_name: licensee_name.to_string(),
            expiry_date,
            plan: self.plan,
            max_users,
            modules,
            issued_at: issued_at.trunc_subsecs(0),
        })
    }
}

/// RFC 3339 timestamps with a `Z` suffix and no fractional seconds.
mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
