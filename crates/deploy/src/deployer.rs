//! The deployment runner.

use alloy_core::primitives::{Address, B256, Bytes, U256, utils::format_ether};
use alloy_sol_types::SolCall;
use anyhow::{Context, Result};

use crate::{
    AddressBook,
    artifacts::{ArtifactStore, QualifiedName},
    chain::{ChainClient, Receipt, TransactionRequest},
    contracts::{
        Contract, DEFAULT_ADMIN_ROLE, Deployed, ERC1967_ADMIN_SLOT, ERC1967_IMPLEMENTATION_SLOT,
        Factory, Forwarder, IAccessControl, IProxyAdmin, ISparkbloxFactory, LogicContract,
        NftCollection, NftDrop, Registry, factory_constructor_args, operator_role,
        registry_constructor_args,
    },
    explorer::{SourceVerifier, VerificationOutcome, VerificationRequest, verify_contract},
};

/// A contract deployed during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub contract: QualifiedName,
    pub address: Address,
    pub tx_hash: B256,
    /// ABI-encoded constructor arguments appended to the creation code.
    pub constructor_args: Bytes,
    /// `None` until verification ran, or when it was skipped.
    pub verification: Option<VerificationOutcome>,
}

impl DeploymentRecord {
    pub fn verification_request(&self) -> VerificationRequest {
        VerificationRequest {
            address: self.address,
            contract: self.contract.clone(),
            constructor_args: self.constructor_args.clone(),
        }
    }
}

/// Outcome of an idempotent role grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: B256,
    pub grantee: Address,
    /// The grantee held the role before, no transaction was sent.
    pub already_present: bool,
    pub tx_hash: Option<B256>,
}

/// The account the transactions are sent from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerReport {
    pub address: Address,
    pub balance: U256,
}

/// Result of a full deployment run.
#[derive(Debug)]
pub struct DeploymentSummary {
    pub signer: SignerReport,
    pub forwarder: Deployed<Forwarder>,
    pub registry: Deployed<Registry>,
    pub factory: Deployed<Factory>,
    pub nft_drop: Deployed<NftDrop>,
    pub nft_collection: Deployed<NftCollection>,
    pub operator_grant: RoleGrant,
    /// Every deployment of the run, in order.
    pub records: Vec<DeploymentRecord>,
}

impl DeploymentSummary {
    pub fn address_book(&self) -> AddressBook {
        AddressBook {
            forwarder: Some(self.forwarder.address()),
            registry: Some(self.registry.address()),
            factory: Some(self.factory.address()),
        }
    }
}

/// Result of a proxy upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyUpgrade {
    pub proxy: Address,
    pub admin: Address,
    pub implementation: DeploymentRecord,
}

/// Deploys and wires the Sparkblox contracts.
///
/// Every operation waits for its transaction to be mined before returning, and every
/// operation of [`Deployer::run`] starts after the previous one completed.
pub struct Deployer<C, V> {
    chain: C,
    artifacts: ArtifactStore,
    /// `None` on networks without an explorer, verification is skipped.
    verifier: Option<V>,
    records: Vec<DeploymentRecord>,
}

impl<C: ChainClient, V: SourceVerifier> Deployer<C, V> {
    pub fn new(chain: C, artifacts: ArtifactStore, verifier: Option<V>) -> Self {
        Self {
            chain,
            artifacts,
            verifier,
            records: Vec::new(),
        }
    }

    /// Deployments made so far, in order.
    pub fn records(&self) -> &[DeploymentRecord] {
        &self.records
    }

    /// Log the signing account and its balance.
    pub async fn report_signer(&self) -> Result<SignerReport> {
        let address = self.chain.sender();
        let balance = self
            .chain
            .balance(address)
            .await
            .context("Failed to fetch the deployer balance")?;

        tracing::info!(
            %address,
            balance = %format_ether(balance),
            chain_id = self.chain.chain_id(),
            "Deployer account"
        );

        Ok(SignerReport { address, balance })
    }

    /// Get a handle on an already deployed contract.
    pub async fn attach<T: Contract>(&self, address: Address) -> Result<Deployed<T>> {
        let code = self
            .chain
            .code_at(address)
            .await
            .with_context(|| format!("Failed to fetch the code at {address}"))?;

        if code.is_empty() {
            anyhow::bail!("No {} contract found at {}: the address has no code", T::NAME, address);
        }

        tracing::debug!(contract = T::NAME, %address, "Attached to contract");
        Ok(Deployed::new(address, None))
    }

    /// Deploy the artifact `contract` with the given encoded constructor arguments.
    pub async fn deploy_artifact(
        &mut self,
        contract: &QualifiedName,
        constructor_args: Bytes,
    ) -> Result<DeploymentRecord> {
        let creation_code = self.artifacts.creation_code(contract)?;

        tracing::info!(contract = %contract.name(), "Deploying contract...");

        let receipt = self
            .chain
            .send(TransactionRequest::create(&creation_code, &constructor_args))
            .await
            .with_context(|| format!("Failed to deploy {contract}"))?;

        let address = receipt.contract_address.with_context(|| {
            format!(
                "Receipt of {} has no contract address for the {contract} deployment",
                receipt.tx_hash
            )
        })?;

        tracing::info!(
            contract = %contract.name(),
            %address,
            tx_hash = %receipt.tx_hash,
            "Contract deployed"
        );

        let record = DeploymentRecord {
            contract: contract.clone(),
            address,
            tx_hash: receipt.tx_hash,
            constructor_args,
            verification: None,
        };
        self.records.push(record.clone());

        Ok(record)
    }

    async fn deploy<T: Contract>(&mut self, constructor_args: Bytes) -> Result<Deployed<T>> {
        let record = self
            .deploy_artifact(&T::qualified_name(), constructor_args)
            .await?;
        Ok(Deployed::new(record.address, Some(record.tx_hash)))
    }

    pub async fn deploy_forwarder(&mut self) -> Result<Deployed<Forwarder>> {
        self.deploy(Bytes::new()).await
    }

    pub async fn deploy_registry(
        &mut self,
        forwarder: &Deployed<Forwarder>,
    ) -> Result<Deployed<Registry>> {
        self.deploy(registry_constructor_args(forwarder.address()))
            .await
    }

    pub async fn deploy_factory(
        &mut self,
        forwarder: &Deployed<Forwarder>,
        registry: &Deployed<Registry>,
    ) -> Result<Deployed<Factory>> {
        self.deploy(factory_constructor_args(
            forwarder.address(),
            registry.address(),
        ))
        .await
    }

    /// Deploy a logic contract. Logic contracts take no constructor arguments.
    pub async fn deploy_logic<L: LogicContract>(&mut self) -> Result<Deployed<L>> {
        self.deploy(Bytes::new()).await
    }

    /// Whether `account` holds `role` on the access-controlled contract at `contract`.
    pub async fn has_role(&self, contract: Address, role: B256, account: Address) -> Result<bool> {
        let calldata = IAccessControl::hasRoleCall { role, account }.abi_encode();
        let output = self
            .chain
            .call(contract, calldata.into())
            .await
            .with_context(|| format!("hasRole call on {contract} failed"))?;

        IAccessControl::hasRoleCall::abi_decode_returns(&output)
            .with_context(|| format!("Invalid hasRole output from {contract}"))
    }

    /// Grant `role` on the registry to `grantee` unless it already holds it.
    pub async fn ensure_role(
        &self,
        registry: &Deployed<Registry>,
        role: B256,
        grantee: Address,
    ) -> Result<RoleGrant> {
        if self.has_role(registry.address(), role, grantee).await? {
            tracing::info!(%role, %grantee, "Role already granted");
            return Ok(RoleGrant {
                role,
                grantee,
                already_present: true,
                tx_hash: None,
            });
        }

        let calldata = IAccessControl::grantRoleCall {
            role,
            account: grantee,
        }
        .abi_encode();
        let receipt = self
            .chain
            .send(TransactionRequest::call(registry.address(), calldata))
            .await
            .with_context(|| format!("Failed to grant role {role} to {grantee}"))?;

        tracing::info!(%role, %grantee, tx_hash = %receipt.tx_hash, "Role granted");

        Ok(RoleGrant {
            role,
            grantee,
            already_present: false,
            tx_hash: Some(receipt.tx_hash),
        })
    }

    /// Fail unless the signer holds the default admin role on the registry.
    pub async fn require_admin(&self, registry: &Deployed<Registry>) -> Result<()> {
        let sender = self.chain.sender();
        if !self
            .has_role(registry.address(), DEFAULT_ADMIN_ROLE, sender)
            .await?
        {
            anyhow::bail!("Account is not admin on registry");
        }
        Ok(())
    }

    /// Register a logic contract with the factory.
    pub async fn add_implementation<L: LogicContract>(
        &self,
        factory: &Deployed<Factory>,
        implementation: &Deployed<L>,
    ) -> Result<Receipt> {
        let calldata = ISparkbloxFactory::addImplementationCall {
            implementation: implementation.address(),
        }
        .abi_encode();

        let receipt = self
            .chain
            .send(TransactionRequest::call(factory.address(), calldata))
            .await
            .with_context(|| format!("Failed to add {} to the factory", L::NAME))?;

        tracing::info!(
            contract = L::NAME,
            implementation = %implementation.address(),
            tx_hash = %receipt.tx_hash,
            "Implementation added to factory"
        );

        Ok(receipt)
    }

    /// Verify every contract deployed by this deployer, in deployment order.
    pub async fn verify_deployments(&mut self) -> Result<()> {
        let Some(verifier) = &self.verifier else {
            tracing::warn!("No block explorer configured, skipping verification");
            return Ok(());
        };

        for record in &mut self.records {
            let outcome = verify_contract(verifier, &record.verification_request()).await?;
            record.verification = Some(outcome);
        }

        Ok(())
    }

    /// Deploy and wire the full contract suite, then verify every deployed contract.
    pub async fn run(mut self) -> Result<DeploymentSummary> {
        tracing::info!("Starting deployment...");

        let signer = self.report_signer().await?;

        let forwarder = self.deploy_forwarder().await?;
        let registry = self.deploy_registry(&forwarder).await?;
        let factory = self.deploy_factory(&forwarder, &registry).await?;

        let operator_grant = self
            .ensure_role(&registry, operator_role(), factory.address())
            .await?;

        let nft_drop = self.deploy_logic::<NftDrop>().await?;
        self.add_implementation(&factory, &nft_drop).await?;

        let nft_collection = self.deploy_logic::<NftCollection>().await?;
        self.add_implementation(&factory, &nft_collection).await?;

        self.verify_deployments().await?;

        tracing::info!("Deployment complete");

        Ok(DeploymentSummary {
            signer,
            forwarder,
            registry,
            factory,
            nft_drop,
            nft_collection,
            operator_grant,
            records: self.records,
        })
    }

    /// Point the ERC-1967 proxy at `proxy` to a freshly deployed `implementation`.
    ///
    /// The upgrade goes through the proxy admin read from the ERC-1967 admin slot.
    pub async fn upgrade_proxy(
        &mut self,
        proxy: Address,
        implementation: &QualifiedName,
    ) -> Result<ProxyUpgrade> {
        if self.chain.code_at(proxy).await?.is_empty() {
            anyhow::bail!("No proxy contract found at {proxy}");
        }

        let admin = Address::from_word(self.chain.storage_at(proxy, ERC1967_ADMIN_SLOT).await?);
        if admin.is_zero() {
            anyhow::bail!("Proxy {proxy} has no ERC-1967 admin");
        }
        let previous =
            Address::from_word(self.chain.storage_at(proxy, ERC1967_IMPLEMENTATION_SLOT).await?);

        tracing::info!(%proxy, %admin, %previous, "Upgrading proxy...");

        let record = self.deploy_artifact(implementation, Bytes::new()).await?;

        let calldata = IProxyAdmin::upgradeCall {
            proxy,
            implementation: record.address,
        }
        .abi_encode();
        let receipt = self
            .chain
            .send(TransactionRequest::call(admin, calldata))
            .await
            .with_context(|| format!("Failed to upgrade proxy {proxy}"))?;

        let current =
            Address::from_word(self.chain.storage_at(proxy, ERC1967_IMPLEMENTATION_SLOT).await?);
        let current_admin = Address::from_word(self.chain.storage_at(proxy, ERC1967_ADMIN_SLOT).await?);

        tracing::info!(
            %proxy,
            implementation = %current,
            admin = %current_admin,
            tx_hash = %receipt.tx_hash,
            "Proxy upgraded"
        );

        if current != record.address {
            anyhow::bail!(
                "Proxy {proxy} points to {current} after the upgrade, expected {}",
                record.address
            );
        }

        Ok(ProxyUpgrade {
            proxy,
            admin: current_admin,
            implementation: record,
        })
    }
}
