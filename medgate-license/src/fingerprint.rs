//! Hardware fingerprinting for license binding.
//!
//! The hardware id is the MAC address of the primary physical network adapter,
//! rendered as 12 lowercase hex digits (`468067510a6c`). Hosts without a
//! readable adapter fall back to a digest of the OS machine id in the same
//! shape. Both sources survive reboots and process restarts.
//!
//! The primary adapter is chosen from properties that do not change with link
//! state:
//! - Linux: built-in adapters before USB ones, then the lowest interface name.
//! - Windows: the lowest address among non-virtual adapters, connected or not.
//! - macOS: `en0`.
//!
//! Adding a new built-in adapter, or on Windows any adapter with a lower
//! address, can still change the id; the vendor reissues in that case.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::fmt;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Default bound on fingerprint collection.
pub const DEFAULT_FINGERPRINT_TIMEOUT: Duration = Duration::from_secs(5);

/// Install-specific host identifier a license is bound to.
///
/// Compared by exact, case-sensitive string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareId(String);

impl HardwareId {
    /// Wraps an identifier as-is.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the current host's hardware id.
pub trait HardwareProbe: Send + Sync {
    /// Computes the hardware id of the running host.
    fn hardware_id(&self) -> LicenseResult<HardwareId>;
}

/// Reads the hardware id from the operating system, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    timeout: Duration,
}

impl SystemProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new(DEFAULT_FINGERPRINT_TIMEOUT)
    }
}

impl HardwareProbe for SystemProbe {
    fn hardware_id(&self) -> LicenseResult<HardwareId> {
        compute_hardware_id_with_timeout(self.timeout)
    }
}

/// Reports a fixed hardware id.
#[derive(Debug, Clone)]
pub struct FixedProbe(HardwareId);

impl FixedProbe {
    pub fn new(id: impl Into<String>) -> Self {
        Self(HardwareId::new(id))
    }
}

impl HardwareProbe for FixedProbe {
    fn hardware_id(&self) -> LicenseResult<HardwareId> {
        Ok(self.0.clone())
    }
}

/// Computes the hardware id of the running host.
///
/// # Errors
///
/// Returns [`LicenseError::FingerprintUnavailable`] if neither a network
/// adapter address nor a machine id can be read.
pub fn compute_hardware_id() -> LicenseResult<HardwareId> {
    if let Some(mac) = primary_mac_address() {
        debug!("hardware id derived from primary network adapter");
        return Ok(HardwareId(mac));
    }

    if let Some(machine_id) = get_machine_id() {
        debug!("hardware id derived from machine id");
        return Ok(HardwareId(machine_id_digest(&machine_id)));
    }

    Err(LicenseError::FingerprintUnavailable(
        "no network adapter address or machine id readable".to_string(),
    ))
}

/// Like [`compute_hardware_id`], but gives up after `timeout`.
///
/// Collection runs on a helper thread; a hung system call leaves that thread
/// behind and reports [`LicenseError::FingerprintUnavailable`].
pub fn compute_hardware_id_with_timeout(timeout: Duration) -> LicenseResult<HardwareId> {
    collect_with_timeout(timeout, compute_hardware_id)
}

fn collect_with_timeout<F>(timeout: Duration, collect: F) -> LicenseResult<HardwareId>
where
    F: FnOnce() -> LicenseResult<HardwareId> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("medgate-fingerprint".to_string())
        .spawn(move || {
            let _ = tx.send(collect());
        })
        .map_err(|e| {
            LicenseError::FingerprintUnavailable(format!("failed to start collector: {e}"))
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(LicenseError::FingerprintUnavailable(format!(
            "collection timed out after {timeout:?}"
        ))),
        Err(RecvTimeoutError::Disconnected) => Err(LicenseError::FingerprintUnavailable(
            "collector exited without a result".to_string(),
        )),
    }
}

/// Normalizes a MAC address to 12 lowercase hex digits.
///
/// Accepts `:`, `-` and `.` separators. Returns `None` for anything that is
/// not 6 bytes of hex, and for the all-zero and broadcast addresses.
#[must_use]
pub fn normalize_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect::<String>()
        .to_ascii_lowercase();

    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    if hex == "000000000000" || hex == "ffffffffffff" {
        return None;
    }
    Some(hex)
}

/// Hashes a machine id into the 12-hex-digit hardware id shape.
#[must_use]
pub fn machine_id_digest(machine_id: &str) -> String {
    let hash = Sha256::digest(machine_id.trim().as_bytes());
    hex::encode(&hash[..6])
}

/// Information about the current host, for support diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    /// Operating system name.
    pub os_name: String,
    /// Operating system version.
    pub os_version: String,
    /// Hostname.
    pub hostname: String,
    /// CPU architecture.
    pub arch: String,
}

impl HostInfo {
    /// Collects information about the current host.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os_name: env::consts::OS.to_string(),
            os_version: get_os_version(),
            hostname: get_hostname(),
            arch: env::consts::ARCH.to_string(),
        }
    }
}

/// Picks the primary adapter: the candidate with the lowest key that has a
/// usable MAC.
fn select_primary<K: Ord>(mut candidates: Vec<(K, String)>) -> Option<String> {
    candidates.sort();
    candidates
        .into_iter()
        .find_map(|(_, mac)| normalize_mac(&mac))
}

/// Returns true if a resolved `/sys/class/net/*/device` path sits on a USB bus.
#[cfg_attr(not(any(target_os = "linux", test)), allow(dead_code))]
fn is_usb_device_path(device: &Path) -> bool {
    device
        .components()
        .any(|c| c.as_os_str().to_str().is_some_and(|s| s.starts_with("usb")))
}

/// Gets the MAC address of the primary physical network adapter.
fn primary_mac_address() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        // Physical adapters expose a `device` link; loopback, bridges, veths
        // and tunnels do not. Built-in adapters sort ahead of USB ones.
        let entries = std::fs::read_dir("/sys/class/net").ok()?;
        let candidates = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let device = std::fs::canonicalize(entry.path().join("device")).ok()?;
                let name = entry.file_name().into_string().ok()?;
                let mac = std::fs::read_to_string(entry.path().join("address")).ok()?;
                Some(((is_usb_device_path(&device), name), mac))
            })
            .collect();
        select_primary(candidates)
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ifconfig")
            .arg("en0")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| parse_ifconfig_ether(&output))
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("getmac")
            .args(["/v", "/fo", "csv", "/nh"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| parse_getmac_csv(&output))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

/// Extracts the `ether` address from `ifconfig` output.
#[cfg_attr(not(any(target_os = "macos", test)), allow(dead_code))]
fn parse_ifconfig_ether(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("ether "))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(normalize_mac)
}

/// Adapter descriptions that mark virtual or tunnel interfaces.
const VIRTUAL_ADAPTER_MARKERS: &[&str] = &[
    "virtual",
    "vpn",
    "tap-",
    "tunnel",
    "loopback",
    "hyper-v",
    "bluetooth",
    "wan miniport",
];

/// Collects `getmac /v /fo csv /nh` rows and picks the primary adapter.
///
/// Rows are `connection, adapter, address, transport`. Virtual adapters are
/// skipped and the rest are ordered by address, so link state (the transport
/// column) never affects the choice.
#[cfg_attr(not(any(target_os = "windows", test)), allow(dead_code))]
fn parse_getmac_csv(output: &str) -> Option<String> {
    let candidates = output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line
                .split("\",\"")
                .map(|f| f.trim().trim_matches('"'))
                .collect();
            let [_, adapter, address, _] = fields.as_slice() else {
                return None;
            };
            let adapter = adapter.to_ascii_lowercase();
            if VIRTUAL_ADAPTER_MARKERS.iter().any(|m| adapter.contains(m)) {
                return None;
            }
            let mac = normalize_mac(address)?;
            Some((mac.clone(), mac))
        })
        .collect();
    select_primary(candidates)
}

/// Gets the machine hostname.
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Gets the OS version string.
fn get_os_version() -> String {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(target_os = "windows")]
    {
        "windows".to_string()
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("VERSION_ID="))
                    .map(|l| {
                        l.trim_start_matches("VERSION_ID=")
                            .trim_matches('"')
                            .to_string()
                    })
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        "unknown".to_string()
    }
}

/// Gets the machine ID (platform-specific unique identifier).
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("MachineGuid"))
                    .and_then(|l| l.split_whitespace().last())
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}
