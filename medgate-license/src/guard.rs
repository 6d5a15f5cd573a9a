//! Runtime license enforcement.
//!
//! [`LicenseGuard`] owns the process-wide license state. It starts out
//! [`EnforcementState::Unchecked`], which denies everything, and moves only
//! when [`LicenseGuard::refresh`] publishes a new snapshot. A snapshot pairs the
//! enforcement state with the verdict it was derived from and is replaced as a
//! whole, so readers never see one without the other.

use crate::clock::{Clock, SystemClock};
use crate::config::LicenseConfig;
use crate::error::LicenseResult;
use crate::fingerprint::{HardwareProbe, SystemProbe};
use crate::keys::TrustedKeys;
use crate::verifier::{verify_with_fingerprint, FailureReason, VerificationVerdict};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{info, warn};

/// Enforcement state derived from the latest verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EnforcementState {
    /// No verification has completed.
    Unchecked,
    /// The license verified.
    Valid,
    /// The license expired but is inside the configured grace window.
    Grace {
        /// Last day of the grace window.
        until: NaiveDate,
    },
    /// The license is unusable.
    Invalid {
        reason: FailureReason,
    },
}

impl EnforcementState {
    /// Returns true if gated features may be served (Valid or Grace).
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Valid | Self::Grace { .. })
    }
}

/// Optional grace window after expiry. Absent unless configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GracePolicy {
    days: Option<u32>,
}

impl GracePolicy {
    /// No grace: expiry denies immediately.
    #[must_use]
    pub fn none() -> Self {
        Self { days: None }
    }

    /// Grants `days` extra days after the expiry date.
    #[must_use]
    pub fn days(days: u32) -> Self {
        Self { days: Some(days) }
    }

    /// Derives the enforcement state for `verdict` on `today`.
    #[must_use]
    pub fn evaluate(&self, verdict: &VerificationVerdict, today: NaiveDate) -> EnforcementState {
        if verdict.valid {
            return EnforcementState::Valid;
        }
        let reason = verdict.reason.unwrap_or(FailureReason::Malformed);

        if let (FailureReason::Expired, Some(entitlement), Some(days)) =
            (reason, &verdict.entitlement, self.days)
        {
            if let Some(until) = entitlement
                .expiry_date
                .checked_add_days(Days::new(u64::from(days)))
            {
                if today <= until {
                    return EnforcementState::Grace { until };
                }
            }
        }

        EnforcementState::Invalid { reason }
    }
}

/// A consistent view of the license: state and the verdict behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseSnapshot {
    pub state: EnforcementState,
    pub verdict: VerificationVerdict,
}

impl LicenseSnapshot {
    fn unchecked() -> Self {
        Self {
            state: EnforcementState::Unchecked,
            verdict: VerificationVerdict::unchecked(Utc::now()),
        }
    }

    /// Returns true if `module` may be served.
    #[must_use]
    pub fn is_module_enabled(&self, module: &str) -> bool {
        self.state.is_usable()
            && self
                .verdict
                .entitlement
                .as_ref()
                .is_some_and(|e| e.has_module(module))
    }

    /// Returns true if `active_users` concurrent users may be served.
    #[must_use]
    pub fn check_seat_limit(&self, active_users: u64) -> bool {
        self.state.is_usable()
            && self
                .verdict
                .entitlement
                .as_ref()
                .is_some_and(|e| e.max_users.permits(active_users))
    }
}

/// Process-wide license gate consulted by the host application.
pub struct LicenseGuard {
    token_path: PathBuf,
    keys: TrustedKeys,
    grace: GracePolicy,
    probe: Arc<dyn HardwareProbe>,
    clock: Arc<dyn Clock>,
    current: RwLock<Arc<LicenseSnapshot>>,
    /// Serializes refreshes; holds the latest date seen so a clock moved
    /// backwards cannot revive an expired license.
    refresh_lock: Mutex<Option<NaiveDate>>,
}

impl LicenseGuard {
    /// Creates a guard for the token at `token_path`, using the system clock
    /// and hardware probe and no grace window.
    pub fn new(token_path: impl Into<PathBuf>, keys: TrustedKeys) -> Self {
        Self {
            token_path: token_path.into(),
            keys,
            grace: GracePolicy::none(),
            probe: Arc::new(SystemProbe::default()),
            clock: Arc::new(SystemClock),
            current: RwLock::new(Arc::new(LicenseSnapshot::unchecked())),
            refresh_lock: Mutex::new(None),
        }
    }

    /// Creates a guard from configuration, loading the trusted public keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured public key cannot be loaded.
    pub fn from_config(config: &LicenseConfig) -> LicenseResult<Self> {
        let keys = TrustedKeys::load(&config.public_keys)?;
        info!(
            "license guard using {} trusted key(s), token {}",
            keys.len(),
            config.token_path.display()
        );
        let grace = config.grace_days.map_or_else(GracePolicy::none, GracePolicy::days);
        Ok(Self::new(&config.token_path, keys)
            .with_grace(grace)
            .with_probe(Arc::new(SystemProbe::new(config.fingerprint_timeout()))))
    }

    /// Sets the grace policy.
    #[must_use]
    pub fn with_grace(mut self, grace: GracePolicy) -> Self {
        self.grace = grace;
        self
    }

    /// Sets the hardware probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HardwareProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the token path this guard verifies.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Returns the current snapshot without blocking on verification.
    pub fn snapshot(&self) -> Arc<LicenseSnapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// Returns the cached verdict.
    pub fn verdict(&self) -> VerificationVerdict {
        self.snapshot().verdict.clone()
    }

    /// Returns the current enforcement state.
    pub fn state(&self) -> EnforcementState {
        self.snapshot().state
    }

    /// Returns true only if the license is usable and enables `module`.
    pub fn is_module_enabled(&self, module: &str) -> bool {
        self.snapshot().is_module_enabled(module)
    }

    /// Returns true only if the license is usable and admits `active_users`.
    pub fn check_seat_limit(&self, active_users: u64) -> bool {
        self.snapshot().check_seat_limit(active_users)
    }

    /// Re-reads and re-verifies the token, publishes the result and returns
    /// the new verdict.
    pub fn refresh(&self) -> VerificationVerdict {
        let mut high_water = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut now = self.clock.now();
        if let Some(latest) = *high_water {
            if now.date < latest {
                warn!(
                    "system date {} is before previously observed {}; using {}",
                    now.date, latest, latest
                );
                now = now.not_before(latest);
            }
        }
        *high_water = Some(now.date);

        let verdict = match std::fs::read_to_string(&self.token_path) {
            Ok(text) => {
                let hardware_id = self.probe.hardware_id();
                verify_with_fingerprint(&text, &self.keys, &hardware_id, now)
            }
            Err(e) => {
                warn!("cannot read license {}: {e}", self.token_path.display());
                VerificationVerdict::failure(FailureReason::Missing, None, now.at)
            }
        };

        let state = self.grace.evaluate(&verdict, now.date);
        let next = Arc::new(LicenseSnapshot {
            state,
            verdict: verdict.clone(),
        });

        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, next)
        };

        if previous.state != state {
            match state {
                EnforcementState::Valid => info!("license valid: {}", verdict.message()),
                EnforcementState::Grace { until } => warn!(
                    "license in grace period until {until}: {}",
                    verdict.message()
                ),
                EnforcementState::Invalid { .. } => warn!("license invalid: {}", verdict.message()),
                EnforcementState::Unchecked => {}
            }
        }

        verdict
    }
}

impl std::fmt::Debug for LicenseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseGuard")
            .field("token_path", &self.token_path)
            .field("keys", &self.keys)
            .field("grace", &self.grace)
            .field("state", &self.state())
            .finish()
    }
}
