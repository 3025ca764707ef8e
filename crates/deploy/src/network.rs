//! Network catalog and per-run network selection.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::NetworkOverrides;

/// RPC endpoint of a local Hardhat node.
pub const HARDHAT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Unified Etherscan API endpoint. The chain is selected with the `chainid` query parameter.
pub const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

/// The networks the contracts can be deployed to.
///
/// Names follow the Hardhat network names so existing `.env` files and scripts keep working.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Network {
    Mainnet,
    Rinkeby,
    Goerli,
    Polygon,
    Mumbai,
    Binance,
    BinanceTestnet,
    Hardhat,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Rinkeby => 4,
            Network::Goerli => 5,
            Network::Polygon => 137,
            Network::Mumbai => 80001,
            Network::Binance => 56,
            Network::BinanceTestnet => 97,
            Network::Hardhat => 1337,
        }
    }

    /// The default RPC endpoint for this network.
    pub fn rpc_url(&self, alchemy_key: Option<&str>) -> Result<String> {
        let alchemy_key = || {
            alchemy_key
                .filter(|key| !key.is_empty())
                .context("Missing ALCHEMY_KEY")
        };

        let url = match self {
            Network::Polygon => format!(
                "https://polygon-mainnet.g.alchemy.com/v2/{}",
                alchemy_key()?
            ),
            Network::Mumbai => format!(
                "https://polygon-mumbai.g.alchemy.com/v2/{}",
                alchemy_key()?
            ),
            Network::Mainnet | Network::Rinkeby | Network::Goerli => format!(
                "https://eth-{}.alchemyapi.io/v2/{}",
                self,
                alchemy_key()?
            ),
            Network::Binance => "https://bsc-dataseed1.binance.org/".to_string(),
            Network::BinanceTestnet => {
                "https://data-seed-prebsc-1-s1.binance.org:8545/".to_string()
            }
            Network::Hardhat => HARDHAT_RPC_URL.to_string(),
        };

        Ok(url)
    }

    /// The explorer verification API for this network, if it has one.
    pub fn explorer_api_url(&self) -> Option<&'static str> {
        match self {
            Network::Hardhat => None,
            _ => Some(ETHERSCAN_API_URL),
        }
    }
}

/// Block explorer endpoint for a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    pub api_url: String,
    pub chain_id: u64,
}

/// The network selected for a run. Resolved once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: Network,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer: Option<ExplorerConfig>,
}

impl NetworkConfig {
    /// Resolve the endpoints of `network`.
    ///
    /// An explicit `rpc_url` wins over the config file override, which wins over the catalog
    /// default. The Alchemy key is only required when the catalog default is used.
    pub fn resolve(
        network: Network,
        rpc_url: Option<&str>,
        alchemy_key: Option<&str>,
        overrides: Option<&NetworkOverrides>,
    ) -> Result<Self> {
        let rpc_url = match rpc_url.or(overrides.and_then(|o| o.rpc_url.as_deref())) {
            Some(url) => url.to_string(),
            None => network
                .rpc_url(alchemy_key)
                .with_context(|| format!("Failed to build RPC URL for network {network}"))?,
        };
        Url::parse(&rpc_url).with_context(|| format!("Invalid RPC URL for network {network}"))?;

        let explorer_api_url = overrides
            .and_then(|o| o.explorer_api_url.as_deref())
            .or(network.explorer_api_url());

        let explorer = explorer_api_url
            .map(|api_url| -> Result<ExplorerConfig> {
                Url::parse(api_url)
                    .with_context(|| format!("Invalid explorer API URL for network {network}"))?;
                Ok(ExplorerConfig {
                    api_url: api_url.to_string(),
                    chain_id: network.chain_id(),
                })
            })
            .transpose()?;

        Ok(Self {
            network,
            chain_id: network.chain_id(),
            rpc_url,
            explorer,
        })
    }
}
