//! CLI configuration
//!
//! Optional JSON file at ~/.brief/config.json (or the path given with --config)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use brief_token::Mint;
use serde::Deserialize;

/// Token lifetime when neither the flag nor the config file sets one
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Settings read from the config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BriefConfig {
    /// Mint secret, base64url without padding
    #[serde(default)]
    pub secret: Option<String>,

    /// Default token lifetime in seconds
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
}

impl BriefConfig {
    /// Decoded secret bytes, if one is configured
    pub fn secret_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.secret
            .as_deref()
            .map(|s| {
                URL_SAFE_NO_PAD
                    .decode(s)
                    .context("Config secret is not valid base64url")
            })
            .transpose()
    }

    pub fn ttl_secs(&self) -> u64 {
        self.default_ttl_secs.unwrap_or(DEFAULT_TTL_SECS)
    }
}

/// Where the mint's secret came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    /// --secret flag or BRIEF_SECRET
    Argument,
    ConfigFile,
    /// Random secret, private to this process
    Generated,
}

/// Configuration loader
pub struct ConfigManager;

impl ConfigManager {
    fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".brief").join("config.json"))
    }

    /// Load the config file.
    ///
    /// An explicit path must exist; a missing default file yields the default config.
    pub fn load(path: Option<&Path>) -> Result<BriefConfig> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path()?;
                if !path.exists() {
                    return Ok(BriefConfig::default());
                }
                Self::load_from(&path)
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<BriefConfig> {
        let json =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;

        serde_json::from_str(&json).context(format!("Failed to parse config file: {:?}", path))
    }
}

/// Build the mint: the argument secret wins over the config file, and with
/// neither a random secret is generated on first use.
pub fn resolve_mint(
    secret_arg: Option<&str>,
    config: &BriefConfig,
) -> Result<(Mint, SecretSource)> {
    if let Some(secret) = secret_arg {
        return Ok((Mint::new(secret.as_bytes().to_vec()), SecretSource::Argument));
    }

    match config.secret_bytes()? {
        Some(secret) => Ok((Mint::new(secret), SecretSource::ConfigFile)),
        None => Ok((Mint::lazy(), SecretSource::Generated)),
    }
}
