//! Deployment sequence tests.
//!
//! These tests drive the deployer against an in-memory chain that records every transaction,
//! and a verifier that records every verification request.
//! Run with: cargo test --test deploy_sequence

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex},
};

use alloy_core::primitives::{Address, B256, Bytes, U256, address, keccak256};
use alloy_sol_types::{SolCall, SolValue};
use anyhow::Result;
use serde_json::json;
use sparkblox_deploy::{
    AddressBook, ArtifactStore, ChainClient, Deployer, QualifiedName, Receipt, SourceVerifier,
    TransactionRequest, VerificationOutcome, VerificationRequest, verify_contract,
    contracts::{
        Contract, DEFAULT_ADMIN_ROLE, ERC1967_ADMIN_SLOT, ERC1967_IMPLEMENTATION_SLOT, Factory,
        Forwarder, IAccessControl, IProxyAdmin, ISparkbloxFactory, NftCollection, NftDrop,
        Registry, factory_constructor_args, operator_role, registry_constructor_args,
    },
};
use tempdir::TempDir;

/// Hardhat account #0.
const DEPLOYER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

const UPGRADE_TARGET: &str = "contracts/prebuilts/DynamicCollection.sol:DynamicCollection";

/// A transaction seen by the mock chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tx {
    Deploy { address: Address, input: Bytes },
    Call { to: Address, input: Bytes },
}

#[derive(Debug, Default)]
struct ChainState {
    nonce: u64,
    code: HashMap<Address, Bytes>,
    storage: HashMap<(Address, B256), B256>,
    roles: HashSet<(Address, B256, Address)>,
    transactions: Vec<Tx>,
    /// Index of the transaction that reverts.
    revert_at: Option<u64>,
    /// Proxies ignore upgrade calls.
    broken_proxy_admin: bool,
}

/// In-memory chain executing just enough of the Sparkblox contracts.
#[derive(Debug, Clone, Default)]
struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    fn transactions(&self) -> Vec<Tx> {
        self.state.lock().unwrap().transactions.clone()
    }

    fn revert_at(&self, index: u64) {
        self.state.lock().unwrap().revert_at = Some(index);
    }

    fn grant(&self, contract: Address, role: B256, account: Address) {
        self.state
            .lock()
            .unwrap()
            .roles
            .insert((contract, role, account));
    }

    fn set_code(&self, address: Address, code: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .code
            .insert(address, Bytes::copy_from_slice(code));
    }

    fn set_storage(&self, address: Address, slot: B256, value: B256) {
        self.state
            .lock()
            .unwrap()
            .storage
            .insert((address, slot), value);
    }
}

impl ChainClient for MockChain {
    fn sender(&self) -> Address {
        DEPLOYER
    }

    fn chain_id(&self) -> u64 {
        1337
    }

    async fn balance(&self, _address: Address) -> Result<U256> {
        Ok(U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18u64)))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        let state = self.state.lock().unwrap();
        let call = IAccessControl::hasRoleCall::abi_decode(&calldata)?;
        let has_role = state.roles.contains(&(to, call.role, call.account));
        Ok(has_role.abi_encode().into())
    }

    async fn send(&self, tx: TransactionRequest) -> Result<Receipt> {
        let mut state = self.state.lock().unwrap();
        let nonce = state.nonce;
        state.nonce += 1;

        if state.revert_at == Some(nonce) {
            anyhow::bail!("Transaction {nonce} reverted");
        }

        let tx_hash = keccak256(nonce.to_be_bytes());
        let contract_address = match tx.to {
            alloy_core::primitives::TxKind::Create => {
                let address = DEPLOYER.create(nonce);
                state.code.insert(address, tx.input.clone());
                state.roles.insert((address, DEFAULT_ADMIN_ROLE, DEPLOYER));
                state.transactions.push(Tx::Deploy {
                    address,
                    input: tx.input,
                });
                Some(address)
            }
            alloy_core::primitives::TxKind::Call(to) => {
                if !state.code.contains_key(&to) {
                    anyhow::bail!("Call to {to}, which has no code");
                }

                if let Ok(call) = IAccessControl::grantRoleCall::abi_decode(&tx.input) {
                    state.roles.insert((to, call.role, call.account));
                }
                if let Ok(call) = IProxyAdmin::upgradeCall::abi_decode(&tx.input) {
                    if !state.broken_proxy_admin {
                        state.storage.insert(
                            (call.proxy, ERC1967_IMPLEMENTATION_SLOT),
                            call.implementation.into_word(),
                        );
                    }
                }
                state.transactions.push(Tx::Call { to, input: tx.input });
                None
            }
        };

        Ok(Receipt {
            tx_hash,
            contract_address,
            block_number: nonce + 1,
            gas_used: 21_000,
            success: true,
        })
    }
}

/// Verifier recording the requests it receives.
#[derive(Debug, Clone, Default)]
struct RecordingVerifier {
    requests: Arc<Mutex<Vec<VerificationRequest>>>,
}

impl RecordingVerifier {
    fn requests(&self) -> Vec<VerificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl SourceVerifier for RecordingVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationOutcome> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(VerificationOutcome::Verified)
    }
}

/// Write a minimal Hardhat artifact for `name`.
fn write_artifact(root: &Path, name: &QualifiedName, bytecode: &str) {
    let dir = root.join(name.source());
    std::fs::create_dir_all(&dir).unwrap();
    let artifact = json!({
        "contractName": name.name(),
        "sourceName": name.source(),
        "bytecode": bytecode,
        "linkReferences": {}
    });
    std::fs::write(dir.join(format!("{}.json", name.name())), artifact.to_string()).unwrap();
}

/// Creation code of each contract. The last byte tells them apart.
fn creation_code(index: u8) -> Vec<u8> {
    vec![0x60, 0x80, 0x60, index]
}

struct TestContext {
    _artifacts_dir: TempDir,
    artifacts: ArtifactStore,
    chain: MockChain,
    verifier: RecordingVerifier,
}

/// Route the runner's logs to the test output, shown for failing tests.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

impl TestContext {
    fn new() -> Self {
        init_tracing();

        let artifacts_dir = TempDir::new("sparkblox-deploy").unwrap();
        let names = [
            Forwarder::qualified_name(),
            Registry::qualified_name(),
            Factory::qualified_name(),
            NftDrop::qualified_name(),
            NftCollection::qualified_name(),
            UPGRADE_TARGET.parse().unwrap(),
        ];
        for (index, name) in names.iter().enumerate() {
            let code = format!("0x{}", hex::encode(creation_code(index as u8)));
            write_artifact(artifacts_dir.path(), name, &code);
        }

        Self {
            artifacts: ArtifactStore::new(artifacts_dir.path()),
            _artifacts_dir: artifacts_dir,
            chain: MockChain::default(),
            verifier: RecordingVerifier::default(),
        }
    }

    fn deployer(&self) -> Deployer<MockChain, RecordingVerifier> {
        Deployer::new(
            self.chain.clone(),
            self.artifacts.clone(),
            Some(self.verifier.clone()),
        )
    }
}

fn deploy_input(index: u8, args: &[u8]) -> Bytes {
    [creation_code(index).as_slice(), args].concat().into()
}

#[tokio::test]
async fn test_full_run_deploys_in_dependency_order() {
    let ctx = TestContext::new();

    let summary = ctx.deployer().run().await.unwrap();

    let forwarder = DEPLOYER.create(0);
    let registry = DEPLOYER.create(1);
    let factory = DEPLOYER.create(2);
    let nft_drop = DEPLOYER.create(4);
    let nft_collection = DEPLOYER.create(6);

    let expected = vec![
        Tx::Deploy {
            address: forwarder,
            input: deploy_input(0, &[]),
        },
        Tx::Deploy {
            address: registry,
            input: deploy_input(1, &registry_constructor_args(forwarder)),
        },
        Tx::Deploy {
            address: factory,
            input: deploy_input(2, &factory_constructor_args(forwarder, registry)),
        },
        Tx::Call {
            to: registry,
            input: IAccessControl::grantRoleCall {
                role: operator_role(),
                account: factory,
            }
            .abi_encode()
            .into(),
        },
        Tx::Deploy {
            address: nft_drop,
            input: deploy_input(3, &[]),
        },
        Tx::Call {
            to: factory,
            input: ISparkbloxFactory::addImplementationCall {
                implementation: nft_drop,
            }
            .abi_encode()
            .into(),
        },
        Tx::Deploy {
            address: nft_collection,
            input: deploy_input(4, &[]),
        },
        Tx::Call {
            to: factory,
            input: ISparkbloxFactory::addImplementationCall {
                implementation: nft_collection,
            }
            .abi_encode()
            .into(),
        },
    ];
    assert_eq!(ctx.chain.transactions(), expected);

    assert_eq!(summary.signer.address, DEPLOYER);
    assert_eq!(summary.nft_drop.address(), nft_drop);
    assert_eq!(summary.nft_collection.address(), nft_collection);
    assert!(!summary.operator_grant.already_present);
    assert_eq!(summary.operator_grant.grantee, factory);
    assert_eq!(summary.operator_grant.tx_hash, Some(keccak256(3u64.to_be_bytes())));

    // Fresh hardhat node: the shipped address book.
    assert_eq!(
        summary.address_book(),
        AddressBook {
            forwarder: Some(address!("5FbDB2315678afecb367f032d93F642f64180aa3")),
            registry: Some(address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512")),
            factory: Some(address!("9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0")),
        }
    );
}

#[tokio::test]
async fn test_verification_uses_deployment_constructor_args() {
    let ctx = TestContext::new();

    let summary = ctx.deployer().run().await.unwrap();

    let requests = ctx.verifier.requests();
    let contracts: Vec<String> = requests.iter().map(|r| r.contract.to_string()).collect();
    assert_eq!(
        contracts,
        vec![
            "contracts/extensions/Forwarder.sol:Forwarder",
            "contracts/SparkbloxRegistry.sol:SparkbloxRegistry",
            "contracts/SparkbloxFactory.sol:SparkbloxFactory",
            "contracts/prebuilts/NFTDrop.sol:NFTDrop",
            "contracts/prebuilts/NFTCollection.sol:NFTCollection",
        ]
    );

    for (request, record) in requests.iter().zip(&summary.records) {
        assert_eq!(request.address, record.address);
        assert_eq!(request.constructor_args, record.constructor_args);
        assert_eq!(record.verification, Some(VerificationOutcome::Verified));
    }

    let forwarder = summary.forwarder.address();
    let registry = summary.registry.address();
    assert!(requests[0].constructor_args.is_empty());
    assert_eq!(requests[1].constructor_args, registry_constructor_args(forwarder));
    assert_eq!(
        requests[2].constructor_args,
        factory_constructor_args(forwarder, registry)
    );
    assert!(requests[3].constructor_args.is_empty());
    assert!(requests[4].constructor_args.is_empty());
}

#[tokio::test]
async fn test_verify_contract_forwards_request_unchanged() {
    let ctx = TestContext::new();
    let forwarder = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
    let request = VerificationRequest {
        address: address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512"),
        contract: Registry::qualified_name(),
        constructor_args: registry_constructor_args(forwarder),
    };

    let outcome = verify_contract(&ctx.verifier, &request).await.unwrap();

    assert_eq!(outcome, VerificationOutcome::Verified);
    assert_eq!(ctx.verifier.requests(), vec![request]);
}

#[tokio::test]
async fn test_existing_operator_role_is_not_granted_again() {
    let ctx = TestContext::new();
    ctx.chain
        .grant(DEPLOYER.create(1), operator_role(), DEPLOYER.create(2));

    let summary = ctx.deployer().run().await.unwrap();

    assert!(summary.operator_grant.already_present);
    assert_eq!(summary.operator_grant.tx_hash, None);

    let grants = ctx
        .chain
        .transactions()
        .into_iter()
        .filter(|tx| match tx {
            Tx::Call { input, .. } => input.starts_with(&IAccessControl::grantRoleCall::SELECTOR),
            Tx::Deploy { .. } => false,
        })
        .count();
    assert_eq!(grants, 0);

    // The logic contracts now take the nonces the grant would have used.
    assert_eq!(summary.nft_drop.address(), DEPLOYER.create(3));
}

#[tokio::test]
async fn test_failed_step_stops_the_run() {
    let ctx = TestContext::new();
    // The factory deployment is the third transaction.
    ctx.chain.revert_at(2);

    let err = ctx.deployer().run().await.unwrap_err();
    assert!(format!("{err:#}").contains("SparkbloxFactory"));

    let transactions = ctx.chain.transactions();
    assert_eq!(transactions.len(), 2);
    assert!(matches!(transactions[1], Tx::Deploy { address, .. } if address == DEPLOYER.create(1)));
    assert!(ctx.verifier.requests().is_empty());
}

#[tokio::test]
async fn test_run_without_verifier_skips_verification() {
    let ctx = TestContext::new();
    let deployer: Deployer<_, RecordingVerifier> =
        Deployer::new(ctx.chain.clone(), ctx.artifacts.clone(), None);

    let summary = deployer.run().await.unwrap();

    assert_eq!(summary.records.len(), 5);
    assert!(summary.records.iter().all(|r| r.verification.is_none()));
    assert!(ctx.verifier.requests().is_empty());
}

#[tokio::test]
async fn test_attach_requires_code() {
    let ctx = TestContext::new();
    let deployer = ctx.deployer();
    let forwarder = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

    let err = deployer.attach::<Forwarder>(forwarder).await.unwrap_err();
    assert!(err.to_string().contains("No Forwarder contract found"));

    ctx.chain.set_code(forwarder, &[0x60, 0x80]);
    let attached = deployer.attach::<Forwarder>(forwarder).await.unwrap();
    assert_eq!(attached.address(), forwarder);
    assert_eq!(attached.tx_hash(), None);
}

#[tokio::test]
async fn test_factory_requires_registry_admin() {
    let ctx = TestContext::new();
    let mut deployer = ctx.deployer();
    let forwarder = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
    let registry = address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");
    ctx.chain.set_code(forwarder, &[0x60, 0x80]);
    ctx.chain.set_code(registry, &[0x60, 0x80]);

    let forwarder = deployer.attach::<Forwarder>(forwarder).await.unwrap();
    let registry_handle = deployer.attach::<Registry>(registry).await.unwrap();

    let err = deployer.require_admin(&registry_handle).await.unwrap_err();
    assert_eq!(err.to_string(), "Account is not admin on registry");
    assert!(ctx.chain.transactions().is_empty());

    ctx.chain.grant(registry, DEFAULT_ADMIN_ROLE, DEPLOYER);
    deployer.require_admin(&registry_handle).await.unwrap();

    let factory = deployer
        .deploy_factory(&forwarder, &registry_handle)
        .await
        .unwrap();
    assert_eq!(
        ctx.chain.transactions(),
        vec![Tx::Deploy {
            address: factory.address(),
            input: deploy_input(2, &factory_constructor_args(forwarder.address(), registry)),
        }]
    );
}

#[tokio::test]
async fn test_upgrade_proxy() {
    let ctx = TestContext::new();
    let mut deployer = ctx.deployer();
    let proxy = address!("BB98a3269dab1898d4E1eECa34E7d51B09badd12");
    let admin = address!("Cf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9");
    let old_implementation = address!("Dc64a140Aa3E981100a9becA4E685f962f0cF6C9");

    ctx.chain.set_code(proxy, &[0x60, 0x80]);
    ctx.chain.set_code(admin, &[0x60, 0x80]);
    ctx.chain.set_storage(proxy, ERC1967_ADMIN_SLOT, admin.into_word());
    ctx.chain
        .set_storage(proxy, ERC1967_IMPLEMENTATION_SLOT, old_implementation.into_word());

    let target: QualifiedName = UPGRADE_TARGET.parse().unwrap();
    let upgrade = deployer.upgrade_proxy(proxy, &target).await.unwrap();

    assert_eq!(upgrade.proxy, proxy);
    assert_eq!(upgrade.admin, admin);
    assert_eq!(upgrade.implementation.contract, target);
    assert_eq!(upgrade.implementation.address, DEPLOYER.create(0));

    let transactions = ctx.chain.transactions();
    assert_eq!(
        transactions[1],
        Tx::Call {
            to: admin,
            input: IProxyAdmin::upgradeCall {
                proxy,
                implementation: DEPLOYER.create(0),
            }
            .abi_encode()
            .into(),
        }
    );
}

#[tokio::test]
async fn test_upgrade_proxy_detects_unchanged_implementation() {
    let ctx = TestContext::new();
    let mut deployer = ctx.deployer();
    let proxy = address!("BB98a3269dab1898d4E1eECa34E7d51B09badd12");
    let admin = address!("Cf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9");

    ctx.chain.set_code(proxy, &[0x60, 0x80]);
    ctx.chain.set_code(admin, &[0x60, 0x80]);
    ctx.chain.set_storage(proxy, ERC1967_ADMIN_SLOT, admin.into_word());
    ctx.chain.state.lock().unwrap().broken_proxy_admin = true;

    let err = deployer
        .upgrade_proxy(proxy, &UPGRADE_TARGET.parse().unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("after the upgrade"));
}

#[tokio::test]
async fn test_upgrade_proxy_requires_admin_slot() {
    let ctx = TestContext::new();
    let mut deployer = ctx.deployer();
    let proxy = address!("BB98a3269dab1898d4E1eECa34E7d51B09badd12");
    ctx.chain.set_code(proxy, &[0x60, 0x80]);

    let err = deployer
        .upgrade_proxy(proxy, &UPGRADE_TARGET.parse().unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no ERC-1967 admin"));
    assert!(ctx.chain.transactions().is_empty());
}
