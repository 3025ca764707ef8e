//! sparkblox-deploy - Deployment library for the Sparkblox contracts.
//!
//! This crate deploys the Sparkblox contract suite from Hardhat artifacts, wires the contracts
//! together, grants the roles they need and verifies their sources on the block explorer.

mod address_book;
pub use address_book::AddressBook;

pub mod artifacts;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod explorer;
pub mod network;
pub mod rpc;

mod deployer;
pub use deployer::{
    Deployer, DeploymentRecord, DeploymentSummary, ProxyUpgrade, RoleGrant, SignerReport,
};

pub use artifacts::{ArtifactStore, QualifiedName};
pub use chain::{ChainClient, Receipt, RpcChainClient, TransactionRequest};
pub use config::{CONFIG_FILENAME, DeployConfig};
pub use contracts::Deployed;
pub use explorer::{
    EtherscanClient, EtherscanVerifier, SourceVerifier, VerificationOutcome, VerificationRequest,
    verify_contract,
};
pub use network::{Network, NetworkConfig};
