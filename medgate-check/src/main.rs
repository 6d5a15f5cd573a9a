//! MedGate license diagnostics.
//!
//! Runs on the customer's server and only ever holds public keys:
//!   medgate-check hardware-id          # id to send to the vendor
//!   medgate-check verify               # check the installed license
//!
//! `verify` exits 0 when the license is usable and 2 otherwise.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medgate_license::{
    compute_hardware_id_with_timeout, HardwareId, HostInfo, LicenseConfig, LicenseGuard,
    DEFAULT_CONFIG_PATH,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

const EXIT_UNUSABLE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "medgate-check")]
#[command(about = "Inspect this host and its MedGate license")]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// License configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the hardware id of this host
    HardwareId {
        /// Print as JSON with host details
        #[arg(long)]
        json: bool,
    },
    /// Verify the installed license and print the result as JSON
    Verify {
        /// License file, overriding the configured path
        #[arg(long)]
        token: Option<PathBuf>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostReport {
    hardware_id: HardwareId,
    host: HostInfo,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = LicenseConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Command::HardwareId { json } => hardware_id(&config, json),
        Command::Verify { token } => verify(config, token),
    }
}

fn hardware_id(config: &LicenseConfig, json: bool) -> Result<ExitCode> {
    let hardware_id = compute_hardware_id_with_timeout(config.fingerprint_timeout())
        .context("could not determine hardware id")?;

    if json {
        let report = HostReport {
            hardware_id,
            host: HostInfo::collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{hardware_id}");
    }
    Ok(ExitCode::SUCCESS)
}

fn verify(mut config: LicenseConfig, token: Option<PathBuf>) -> Result<ExitCode> {
    if let Some(path) = token {
        config.token_path = path;
    }

    let guard = LicenseGuard::from_config(&config).context("failed to load trusted keys")?;
    let verdict = guard.refresh();
    let snapshot = guard.snapshot();
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);

    if snapshot.state.is_usable() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("{}", verdict.message());
        Ok(ExitCode::from(EXIT_UNUSABLE))
    }
}
