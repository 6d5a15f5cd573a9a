//! MedGate license issuance tool.
//!
//! Runs on the vendor's offline signing machine:
//!   medgate-issuer keygen --epoch 1 --out-dir ./keys
//!   medgate-issuer issue --key ./keys/license-epoch1.key.pem --draft st-mary.toml --out license.mgl
//!   medgate-issuer inspect license.mgl
//!
//! The inspect command decodes a token without verifying it.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use medgate_issuer::{issue, load_signing_key, write_key_pair, write_token, KeyPair};
use medgate_license::{KeyEpoch, LicenseDraft, LicenseToken, Plan};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "medgate-issuer")]
#[command(about = "Generate vendor keys and issue MedGate licenses")]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new RSA key pair for a key epoch
    Keygen {
        /// Key epoch the pair is tagged with
        #[arg(long)]
        epoch: u16,

        /// Directory the PEM files are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Sign a license for a customer host
    Issue(IssueArgs),
    /// Decode a license file without verifying it
    Inspect {
        /// License token file
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct IssueArgs {
    /// PKCS#8 PEM private key
    #[arg(long)]
    key: PathBuf,

    /// Key epoch of the private key; read from a license-epoch<N>.key.pem name when omitted
    #[arg(long)]
    epoch: Option<u16>,

    /// TOML file holding the license draft
    #[arg(long, conflicts_with_all = ["hardware_id", "licensee", "expiry", "plan", "max_users", "modules"])]
    draft: Option<PathBuf>,

    /// Hardware id reported by `medgate-check hardware-id`
    #[arg(long)]
    hardware_id: Option<String>,

    /// Customer name
    #[arg(long)]
    licensee: Option<String>,

    /// Last valid day, YYYY-MM-DD
    #[arg(long)]
    expiry: Option<String>,

    /// TRIAL, STANDARD or ENTERPRISE
    #[arg(long)]
    plan: Option<String>,

    /// Seat limit, -1 for unlimited
    #[arg(long, allow_negative_numbers = true)]
    max_users: Option<i64>,

    /// Enabled module, repeatable
    #[arg(long = "module")]
    modules: Vec<String>,

    /// Output license file
    #[arg(long, default_value = "license.mgl")]
    out: PathBuf,
}

impl IssueArgs {
    fn draft(&self) -> Result<LicenseDraft> {
        if let Some(path) = &self.draft {
            return read_draft(path);
        }

        let (Some(hardware_id), Some(licensee), Some(expiry), Some(plan), Some(max_users)) = (
            &self.hardware_id,
            &self.licensee,
            &self.expiry,
            &self.plan,
            self.max_users,
        ) else {
            bail!(
                "either --draft or all of --hardware-id, --licensee, --expiry, --plan, --max-users are required"
            );
        };

        Ok(LicenseDraft {
            hardware_id: hardware_id.clone(),
            licensee_name: licensee.clone(),
            expiry_date: expiry.clone(),
            plan: plan.parse::<Plan>()?,
            max_users,
            modules: self.modules.clone(),
        })
    }
}

fn read_draft(path: &Path) -> Result<LicenseDraft> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read draft {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse draft {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Command::Keygen { epoch, out_dir } => keygen(KeyEpoch::new(epoch), &out_dir),
        Command::Issue(args) => issue_license(&args),
        Command::Inspect { file } => inspect(&file),
    }
}

fn keygen(epoch: KeyEpoch, out_dir: &Path) -> Result<()> {
    let pair = KeyPair::generate(epoch).context("key generation failed")?;
    let files = write_key_pair(out_dir, &pair).context("failed to store key pair")?;
    info!("private key: {}", files.private_key.display());
    info!("public key:  {}", files.public_key.display());
    Ok(())
}

fn issue_license(args: &IssueArgs) -> Result<()> {
    let draft = args.draft()?;
    let key = load_signing_key(&args.key, args.epoch.map(KeyEpoch::new))
        .with_context(|| format!("failed to load signing key {}", args.key.display()))?;
    let license = issue(draft, &key).context("license rejected")?;
    write_token(&args.out, &license)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("{}", license.text());
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let token = LicenseToken::parse(&text).context("not a license token")?;
    let entitlement = token
        .decode_unverified()
        .context("payload is not a valid entitlement")?;

    println!("epoch: {}", token.epoch());
    println!("signature: {} bytes (not verified)", token.signature().len());
    println!("{}", serde_json::to_string_pretty(&entitlement)?);
    Ok(())
}
