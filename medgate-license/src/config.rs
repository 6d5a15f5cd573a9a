//! Site configuration, read from `/etc/medgate/license.toml`.
//!
//! ```toml
//! [license]
//! token_path = "/etc/medgate/license.mgl"
//!
//! [keys]
//! 1 = "/opt/medgate/keys/license-epoch1.pub.pem"
//! 2 = "/opt/medgate/keys/license-epoch2.pub.pem"
//!
//! [policy]
//! grace_days = 14
//! refresh_interval_secs = 86400
//! fingerprint_timeout_ms = 5000
//! ```
//!
//! Every section is optional. A missing file yields the documented defaults;
//! a file that exists but cannot be read or parsed is an error, so a broken
//! deployment never silently changes policy.

use crate::error::{LicenseError, LicenseResult};
use crate::token::KeyEpoch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default location of the site configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/medgate/license.toml";

/// Default location of the installed license token.
pub const DEFAULT_TOKEN_PATH: &str = "/etc/medgate/license.mgl";

/// Default location of the epoch 1 public key shipped with the application.
pub const DEFAULT_PUBLIC_KEY_PATH: &str = "/opt/medgate/keys/license-epoch1.pub.pem";

/// Default interval between background re-verifications (one day).
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Default bound on hardware fingerprint collection.
pub const DEFAULT_FINGERPRINT_TIMEOUT_MS: u64 = 5_000;

/// Runtime licensing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseConfig {
    pub token_path: PathBuf,
    /// Public key file per trusted key epoch.
    pub public_keys: BTreeMap<KeyEpoch, PathBuf>,
    /// Days of grace after expiry; `None` disables grace.
    pub grace_days: Option<u32>,
    pub refresh_interval_secs: u64,
    pub fingerprint_timeout_ms: u64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            public_keys: BTreeMap::from([(
                KeyEpoch::new(1),
                PathBuf::from(DEFAULT_PUBLIC_KEY_PATH),
            )]),
            grace_days: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            fingerprint_timeout_ms: DEFAULT_FINGERPRINT_TIMEOUT_MS,
        }
    }
}

impl LicenseConfig {
    /// Loads configuration from [`DEFAULT_CONFIG_PATH`].
    pub fn load() -> LicenseResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No license config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| LicenseError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml(&contents)
            .map_err(|e| LicenseError::Config(format!("{}: {e}", path.display())))?;
        info!("Loaded license config from {:?}", path);
        Ok(config)
    }

    /// Parses configuration text.
    pub fn from_toml(contents: &str) -> LicenseResult<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| LicenseError::Config(e.to_string()))?;
        file.into_config()
    }

    /// Interval between background re-verifications.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Bound on hardware fingerprint collection.
    pub fn fingerprint_timeout(&self) -> Duration {
        Duration::from_millis(self.fingerprint_timeout_ms)
    }
}

/// Raw TOML structure matching the license.toml format.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    license: LicenseSection,
    #[serde(default)]
    keys: BTreeMap<String, PathBuf>,
    #[serde(default)]
    policy: PolicySection,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LicenseSection {
    #[serde(default = "default_token_path")]
    token_path: PathBuf,
}

impl Default for LicenseSection {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicySection {
    #[serde(default)]
    grace_days: Option<u32>,
    #[serde(default = "default_refresh_interval_secs")]
    refresh_interval_secs: u64,
    #[serde(default = "default_fingerprint_timeout_ms")]
    fingerprint_timeout_ms: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            grace_days: None,
            refresh_interval_secs: default_refresh_interval_secs(),
            fingerprint_timeout_ms: default_fingerprint_timeout_ms(),
        }
    }
}

fn default_token_path() -> PathBuf {
    PathBuf::from(DEFAULT_TOKEN_PATH)
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_fingerprint_timeout_ms() -> u64 {
    DEFAULT_FINGERPRINT_TIMEOUT_MS
}

impl ConfigFile {
    fn into_config(self) -> LicenseResult<LicenseConfig> {
        let public_keys = if self.keys.is_empty() {
            LicenseConfig::default().public_keys
        } else {
            self.keys
                .into_iter()
                .map(|(epoch, path)| {
                    let epoch = epoch.parse::<KeyEpoch>().map_err(|_| {
                        LicenseError::Config(format!("[keys] entry {epoch:?} is not a key epoch"))
                    })?;
                    Ok((epoch, path))
                })
                .collect::<LicenseResult<BTreeMap<_, _>>>()?
        };

        if self.policy.refresh_interval_secs == 0 {
            return Err(LicenseError::Config(
                "refresh_interval_secs must be positive".to_string(),
            ));
        }
        if self.policy.fingerprint_timeout_ms == 0 {
            return Err(LicenseError::Config(
                "fingerprint_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(LicenseConfig {
            token_path: self.license.token_path,
            public_keys,
            grace_days: self.policy.grace_days,
            refresh_interval_secs: self.policy.refresh_interval_secs,
            fingerprint_timeout_ms: self.policy.fingerprint_timeout_ms,
        })
    }
}
