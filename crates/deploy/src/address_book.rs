//! Static mapping from logical contract names to deployed addresses.

use alloy_core::primitives::Address;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Addresses of the core contracts on one network.
///
/// Later deployments read their dependencies from here when the dependency was deployed by
/// an earlier run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressBook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarder: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
}

impl AddressBook {
    pub fn is_empty(&self) -> bool {
        self.forwarder.is_none() && self.registry.is_none() && self.factory.is_none()
    }

    pub fn forwarder(&self) -> Result<Address> {
        Self::require(self.forwarder, "Forwarder")
    }

    pub fn registry(&self) -> Result<Address> {
        Self::require(self.registry, "Registry")
    }

    pub fn factory(&self) -> Result<Address> {
        Self::require(self.factory, "Factory")
    }

    /// Overwrite the entries that are set in `other`.
    pub fn merge(&mut self, other: &AddressBook) {
        if other.forwarder.is_some() {
            self.forwarder = other.forwarder;
        }
        if other.registry.is_some() {
            self.registry = other.registry;
        }
        if other.factory.is_some() {
            self.factory = other.factory;
        }
    }

    fn require(address: Option<Address>, name: &str) -> Result<Address> {
        address.ok_or_else(|| anyhow::anyhow!("{name} address is not set in the address book"))
    }
}
