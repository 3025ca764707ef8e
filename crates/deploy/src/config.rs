//! Layered configuration for the deployment toolkit.
//!
//! Values are read from the built-in defaults, then the TOML config file, then
//! `SPARKBLOX_`-prefixed environment variables (nested keys separated by `__`).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{AddressBook, Network};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Sparkblox.toml";

/// Prefix of the environment variables overriding the config file.
pub const ENV_PREFIX: &str = "SPARKBLOX_";

/// Default directory containing the Hardhat compilation output.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Settings of the JSON-RPC client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Timeout of a single HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum time to wait for a transaction to be mined, in seconds.
    pub receipt_timeout_secs: u64,
    /// Interval between two receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            receipt_timeout_secs: 300,
            poll_interval_ms: 2_000,
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Retry settings of the explorer verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// How many times a submission is retried while the explorer has not indexed the contract.
    pub submit_retries: usize,
    /// Delay between two submissions, in seconds.
    pub submit_delay_secs: u64,
    /// How many times the verification status is polled while pending.
    pub status_retries: usize,
    /// Delay between two status polls, in seconds.
    pub status_delay_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            submit_retries: 5,
            submit_delay_secs: 10,
            status_retries: 20,
            status_delay_secs: 3,
        }
    }
}

/// Per-network endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_api_url: Option<String>,
}

/// The deployment toolkit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Path to the Hardhat artifacts directory.
    pub artifacts: PathBuf,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    /// Endpoint overrides, keyed by network name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkOverrides>,
    /// Addresses of already deployed contracts, keyed by network name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub addresses: BTreeMap<String, AddressBook>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            artifacts: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            rpc: RpcConfig::default(),
            verification: VerificationConfig::default(),
            networks: BTreeMap::new(),
            addresses: BTreeMap::new(),
        }
    }
}

impl DeployConfig {
    /// Build the figment used to extract the configuration.
    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(DeployConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the configuration from `path`.
    ///
    /// When `required` is false a missing file is not an error and the defaults are used.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if required && !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let config: Self = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn network_overrides(&self, network: Network) -> Option<&NetworkOverrides> {
        self.networks.get(&network.to_string())
    }

    /// The address book of `network`, empty if none is configured.
    pub fn address_book(&self, network: Network) -> AddressBook {
        self.addresses
            .get(&network.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Merge `book` into the address book of `network`. Unset entries of `book` keep their
    /// current value.
    pub fn update_address_book(&mut self, network: Network, book: &AddressBook) {
        self.addresses
            .entry(network.to_string())
            .or_default()
            .merge(book);
    }
}
