//! Simulator configuration, read from TOML.
//!
//! Accounts are referred to by development identity name (see
//! [`crate::identity::Identity::dev`]) rather than by raw address.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ledger::Amount;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimulatorConfig {
    pub log_level: String,
    pub genesis: GenesisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenesisConfig {
    /// Deploys the bank and the bank token.
    pub owner: String,
    pub authorized: Vec<String>,
    pub faucet_amount: Amount,
    /// Faucet caller; the owner when absent.
    pub faucet_operator: Option<String>,
    /// Native currency the bank starts with.
    pub bank_reserve: Amount,
    /// Native currency per account.
    pub native: BTreeMap<String, Amount>,
    pub token: Option<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub supply: Amount,
    /// Transferred from the owner to the bank right after deployment.
    #[serde(default)]
    pub pool_funding: Amount,
    /// Transferred from the owner to each named account.
    #[serde(default)]
    pub allocations: BTreeMap<String, Amount>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            genesis: GenesisConfig::default(),
        }
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            owner: "owner".to_string(),
            authorized: Vec::new(),
            faucet_amount: 0,
            faucet_operator: None,
            bank_reserve: 0,
            native: BTreeMap::new(),
            token: Some(TokenConfig::default()),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Bank Token".to_string(),
            symbol: "BNK".to_string(),
            supply: 1_000_000,
            pool_funding: 0,
            allocations: BTreeMap::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&input)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Like [`SimulatorConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}
