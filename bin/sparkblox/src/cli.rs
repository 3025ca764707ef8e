use std::path::PathBuf;

use alloy_core::primitives::{Address, Bytes};
use clap::{Parser, Subcommand};
use sparkblox_deploy::{Network, QualifiedName, contracts::DEFAULT_UPGRADE_TARGET};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "sparkblox")]
#[command(author, version, about = "Deploy, wire and verify the Sparkblox contracts")]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SPARKBLOX_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// The network to deploy to.
    #[arg(short, long, env = "SPARKBLOX_NETWORK", default_value_t = Network::Hardhat, global = true)]
    pub network: Network,

    /// Private key of the deployer account.
    #[arg(long, env = "TEST_PRIVATE_KEY", hide_env_values = true, global = true)]
    pub private_key: Option<String>,

    /// Alchemy API key, used to build the RPC URL of Alchemy-hosted networks.
    #[arg(long, env = "ALCHEMY_KEY", hide_env_values = true, global = true)]
    pub alchemy_key: Option<String>,

    /// RPC endpoint overriding the network default and the config file.
    #[arg(long, env = "SPARKBLOX_RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// API key of the block explorer used for source verification.
    #[arg(long, env = "SCAN_API_KEY", hide_env_values = true, global = true)]
    pub scan_api_key: Option<String>,

    /// Path to the configuration file.
    ///
    /// If not provided, ./Sparkblox.toml is used when it exists.
    #[arg(long, alias = "conf", env = "SPARKBLOX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the full contract suite, grant the factory its role on the registry, register
    /// the logic contracts and verify everything on the block explorer.
    Deploy {
        /// Do not verify the deployed contracts.
        #[arg(long, env = "SPARKBLOX_SKIP_VERIFY")]
        skip_verify: bool,

        /// Write the deployed addresses to the address book of the config file.
        #[arg(long)]
        save_addresses: bool,
    },

    /// Deploy the Forwarder.
    DeployForwarder,

    /// Deploy the SparkbloxRegistry.
    DeployRegistry {
        /// Forwarder address. Defaults to the address book entry.
        #[arg(long)]
        forwarder: Option<Address>,
    },

    /// Deploy the SparkbloxFactory. The deployer must be admin on the registry.
    DeployFactory {
        /// Forwarder address. Defaults to the address book entry.
        #[arg(long)]
        forwarder: Option<Address>,

        /// Registry address. Defaults to the address book entry.
        #[arg(long)]
        registry: Option<Address>,
    },

    /// Upgrade a collection proxy to a new implementation.
    UpgradeDynamic {
        /// Address of the ERC-1967 proxy.
        #[arg(long)]
        proxy: Address,

        /// The new implementation.
        #[arg(long, default_value = DEFAULT_UPGRADE_TARGET)]
        contract: QualifiedName,

        /// Do not verify the new implementation.
        #[arg(long, env = "SPARKBLOX_SKIP_VERIFY")]
        skip_verify: bool,
    },

    /// Verify an already deployed contract.
    Verify {
        /// Fully qualified name, e.g. contracts/extensions/Forwarder.sol:Forwarder
        #[arg(long)]
        contract: QualifiedName,

        /// Address of the deployed contract.
        #[arg(long)]
        address: Address,

        /// ABI-encoded constructor arguments, hex encoded.
        #[arg(long, default_value = "0x")]
        constructor_args: Bytes,
    },
}
