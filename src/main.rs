//! brief - sign and verify compact expiring tokens from the command line

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use brief_token::{encode, Mint, TokenError};
use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{resolve_mint, BriefConfig, ConfigManager, SecretSource};

/// brief - Tamper-evident tokens with a built-in expiry
#[derive(Parser, Debug)]
#[command(name = "brief")]
#[command(about = "brief - Tamper-evident tokens with a built-in expiry")]
#[command(version)]
#[command(long_version = concat!(env!("CARGO_PKG_VERSION"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// HMAC secret (overrides the config file)
    #[arg(long, global = true, env = "BRIEF_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Config file (default: ~/.brief/config.json)
    #[arg(long, global = true, env = "BRIEF_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the base64url encoding of TEXT
    Encode {
        text: String,
    },

    /// Sign data into a token
    #[command(long_about = r#"
Sign data into a token of the form <data>.<YYYYMMDDHHMMSS>.<signature>.
The timestamp is in UTC.

EXAMPLES:
  brief --secret "$SECRET" sign --data "user:42" --ttl-secs 900

ENVIRONMENT VARIABLES:
  BRIEF_SECRET  HMAC secret
  BRIEF_CONFIG  Config file path
    "#)]
    Sign {
        /// Data to sign
        #[arg(long)]
        data: String,

        /// Token lifetime in seconds (default: config file, else 3600)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Sign a token with random data
    Generate {
        /// Number of random bytes
        #[arg(long, default_value = "32")]
        len: usize,

        /// Token lifetime in seconds (default: config file, else 3600)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Verify a serialized token
    Verify {
        token: String,
    },
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn ttl(flag: Option<u64>, config: &BriefConfig) -> Result<Duration> {
    let secs = flag.unwrap_or_else(|| config.ttl_secs());
    let secs = i64::try_from(secs).context("Token lifetime too large")?;
    Duration::try_seconds(secs).context("Token lifetime too large")
}

/// Short reason shown when a token is rejected
fn rejection(err: &TokenError) -> &'static str {
    if err.is_expired() {
        "Token has expired"
    } else if err.is_parse_error() {
        "Token is malformed"
    } else {
        "Token rejected"
    }
}

fn load_mint(cli: &Cli) -> Result<(Mint, BriefConfig)> {
    let config = ConfigManager::load(cli.config.as_deref())?;
    let (mint, source) = resolve_mint(cli.secret.as_deref(), &config)?;

    match source {
        SecretSource::Argument => debug!("Using secret from arguments"),
        SecretSource::ConfigFile => debug!("Using secret from config file"),
        SecretSource::Generated => {
            warn!("No secret configured; tokens from this run cannot be verified by another process")
        }
    }

    Ok((mint, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Encode { text } => {
            println!("{}", encode(text.as_bytes()));
        }
        Commands::Sign { data, ttl_secs } => {
            let (mint, config) = load_mint(&cli)?;
            let token = mint
                .sign_for(data.as_bytes(), ttl(*ttl_secs, &config)?)
                .context("Failed to sign token")?;

            info!("Token expires at {}", token.expiry());
            println!("{}", token);
        }
        Commands::Generate { len, ttl_secs } => {
            let (mint, config) = load_mint(&cli)?;
            let token = mint
                .generate_for(*len, ttl(*ttl_secs, &config)?)
                .context("Failed to generate token")?;

            info!("Generated {} random bytes, expires at {}", len, token.expiry());
            println!("{}", token);
        }
        Commands::Verify { token } => {
            let (mint, _) = load_mint(&cli)?;
            let token = mint
                .verify_string(token.trim())
                .map_err(|e| {
                    let reason = rejection(&e);
                    anyhow::Error::new(e).context(reason)
                })?;

            info!("Token valid until {}", token.expiry());
            let expiry = token.expiry();
            println!("data:   {}", encode(&token.into_payload()));
            println!("expiry: {}", expiry.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }

    Ok(())
}
