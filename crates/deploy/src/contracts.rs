//! The Sparkblox contracts known to the deployment runner.
//!
//! Every contract is a marker type implementing [`Contract`]. A [`Deployed`] handle is only
//! produced by a mined deployment or by attaching to an address holding code, so a function
//! taking a `Deployed<Forwarder>` cannot run before the forwarder exists on chain.

use std::{fmt, marker::PhantomData};

use alloy_core::primitives::{Address, B256, Bytes, b256, keccak256};
use alloy_sol_types::{SolValue, sol};

use crate::artifacts::QualifiedName;

sol! {
    interface IAccessControl {
        function hasRole(bytes32 role, address account) external view returns (bool);
        function grantRole(bytes32 role, address account) external;
    }

    interface ISparkbloxFactory {
        function addImplementation(address implementation) external;
    }

    interface IProxyAdmin {
        function upgrade(address proxy, address implementation) external;
    }
}

/// Name of the role the factory needs on the registry.
pub const OPERATOR_ROLE_NAME: &str = "OPERATOR_ROLE";

/// The OpenZeppelin `AccessControl` admin role.
pub const DEFAULT_ADMIN_ROLE: B256 = B256::ZERO;

/// ERC-1967 slot holding the implementation of a proxy.
pub const ERC1967_IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// ERC-1967 slot holding the admin of a proxy.
pub const ERC1967_ADMIN_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// Default implementation an upgradeable collection is moved to.
pub const DEFAULT_UPGRADE_TARGET: &str =
    "contracts/prebuilts/DynamicCollection.sol:DynamicCollection";

/// Role identifier of `name`, as computed by `keccak256(abi.encodePacked(name))`.
pub fn role_id(name: &str) -> B256 {
    keccak256(name.as_bytes())
}

/// `keccak256("OPERATOR_ROLE")`.
pub fn operator_role() -> B256 {
    role_id(OPERATOR_ROLE_NAME)
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Forwarder {}
    impl Sealed for super::Registry {}
    impl Sealed for super::Factory {}
    impl Sealed for super::NftDrop {}
    impl Sealed for super::NftCollection {}
}

/// A contract of the Sparkblox suite.
pub trait Contract: sealed::Sealed + Send + Sync + 'static {
    /// Solidity contract name.
    const NAME: &'static str;

    /// Source file of the contract, relative to the project root.
    const SOURCE: &'static str;

    fn qualified_name() -> QualifiedName {
        QualifiedName::new(Self::SOURCE, Self::NAME)
    }
}

/// An implementation contract cloned by the factory. Deployed without constructor arguments.
pub trait LogicContract: Contract {}

/// Meta-transaction forwarder.
#[derive(Debug, Clone, Copy)]
pub struct Forwarder;

/// Registry of the deployed collections.
#[derive(Debug, Clone, Copy)]
pub struct Registry;

/// Factory cloning the logic contracts.
#[derive(Debug, Clone, Copy)]
pub struct Factory;

/// Lazy-minted drop logic contract.
#[derive(Debug, Clone, Copy)]
pub struct NftDrop;

/// Collection logic contract.
#[derive(Debug, Clone, Copy)]
pub struct NftCollection;

impl Contract for Forwarder {
    const NAME: &'static str = "Forwarder";
    const SOURCE: &'static str = "contracts/extensions/Forwarder.sol";
}

impl Contract for Registry {
    const NAME: &'static str = "SparkbloxRegistry";
    const SOURCE: &'static str = "contracts/SparkbloxRegistry.sol";
}

impl Contract for Factory {
    const NAME: &'static str = "SparkbloxFactory";
    const SOURCE: &'static str = "contracts/SparkbloxFactory.sol";
}

impl Contract for NftDrop {
    const NAME: &'static str = "NFTDrop";
    const SOURCE: &'static str = "contracts/prebuilts/NFTDrop.sol";
}

impl Contract for NftCollection {
    const NAME: &'static str = "NFTCollection";
    const SOURCE: &'static str = "contracts/prebuilts/NFTCollection.sol";
}

impl LogicContract for NftDrop {}
impl LogicContract for NftCollection {}

/// Constructor arguments of `SparkbloxRegistry(address forwarder)`.
pub fn registry_constructor_args(forwarder: Address) -> Bytes {
    (forwarder,).abi_encode_params().into()
}

/// Constructor arguments of `SparkbloxFactory(address forwarder, address registry)`.
pub fn factory_constructor_args(forwarder: Address, registry: Address) -> Bytes {
    (forwarder, registry).abi_encode_params().into()
}

/// Handle on a contract known to exist on chain.
pub struct Deployed<T: Contract> {
    address: Address,
    tx_hash: Option<B256>,
    _contract: PhantomData<T>,
}

impl<T: Contract> Deployed<T> {
    pub(crate) fn new(address: Address, tx_hash: Option<B256>) -> Self {
        Self {
            address,
            tx_hash,
            _contract: PhantomData,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Hash of the deployment transaction. `None` for attached contracts.
    pub fn tx_hash(&self) -> Option<B256> {
        self.tx_hash
    }
}

impl<T: Contract> Clone for Deployed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Contract> Copy for Deployed<T> {}

impl<T: Contract> fmt::Debug for Deployed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployed")
            .field("contract", &T::NAME)
            .field("address", &self.address)
            .field("tx_hash", &self.tx_hash)
            .finish()
    }
}
