use std::{path::PathBuf, str::FromStr};

use alloy_core::primitives::{Address, Bytes};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use comfy_table::{Table, presets::UTF8_FULL};
use sparkblox_deploy::{
    AddressBook, ArtifactStore, CONFIG_FILENAME, DeployConfig, Deployer, DeploymentRecord,
    EtherscanClient, EtherscanVerifier, NetworkConfig, QualifiedName, RpcChainClient,
    VerificationRequest,
    contracts::{Forwarder, Registry},
    rpc::create_client,
    verify_contract,
};

use crate::cli::{Cli, Command};

/// Everything resolved once at startup and shared by the commands.
struct RunContext {
    network: NetworkConfig,
    config: DeployConfig,
    config_path: PathBuf,
    private_key: Option<String>,
    scan_api_key: Option<String>,
}

impl RunContext {
    fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(&self.config.artifacts)
    }

    fn address_book(&self) -> AddressBook {
        self.config.address_book(self.network.network)
    }

    fn signer(&self) -> Result<PrivateKeySigner> {
        let key = self
            .private_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .context("Missing TEST_PRIVATE_KEY: a deployer key is required to send transactions")?;

        PrivateKeySigner::from_str(key).context("TEST_PRIVATE_KEY is not a valid private key")
    }

    async fn connect(&self) -> Result<RpcChainClient> {
        RpcChainClient::connect(&self.network, self.signer()?, &self.config.rpc).await
    }

    /// The verifier of the selected network.
    ///
    /// `None` when verification is skipped or the network has no explorer. Fails when the
    /// network has an explorer but no API key is set, so a run never deploys contracts it
    /// cannot verify.
    fn verifier(&self, skip: bool) -> Result<Option<EtherscanVerifier>> {
        if skip {
            tracing::info!("Source verification disabled");
            return Ok(None);
        }

        let Some(explorer) = &self.network.explorer else {
            tracing::warn!(
                network = %self.network.network,
                "Network has no block explorer, contracts will not be verified"
            );
            return Ok(None);
        };

        let api_key = self
            .scan_api_key
            .clone()
            .filter(|key| !key.is_empty())
            .with_context(|| {
                format!(
                    "Missing SCAN_API_KEY: required to verify contracts on {}. Use --skip-verify to deploy without verification",
                    self.network.network
                )
            })?;

        let client = EtherscanClient::new(
            create_client(self.config.rpc.request_timeout())?,
            explorer.api_url.clone(),
            api_key,
            explorer.chain_id,
        );

        Ok(Some(EtherscanVerifier::new(
            client,
            self.artifacts(),
            self.config.verification.clone(),
        )))
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let (config_path, required) = match cli.config {
        Some(path) => (path, true),
        None => (PathBuf::from(CONFIG_FILENAME), false),
    };
    let config = DeployConfig::load(&config_path, required)?;

    let network = NetworkConfig::resolve(
        cli.network,
        cli.rpc_url.as_deref(),
        cli.alchemy_key.as_deref(),
        config.network_overrides(cli.network),
    )?;

    tracing::info!(
        network = %network.network,
        chain_id = network.chain_id,
        explorer = network.explorer.is_some(),
        "Network selected"
    );

    let ctx = RunContext {
        network,
        config,
        config_path,
        private_key: cli.private_key,
        scan_api_key: cli.scan_api_key,
    };

    match cli.command {
        Command::Deploy {
            skip_verify,
            save_addresses,
        } => deploy(ctx, skip_verify, save_addresses).await,
        Command::DeployForwarder => deploy_forwarder(&ctx).await,
        Command::DeployRegistry { forwarder } => deploy_registry(&ctx, forwarder).await,
        Command::DeployFactory {
            forwarder,
            registry,
        } => deploy_factory(&ctx, forwarder, registry).await,
        Command::UpgradeDynamic {
            proxy,
            contract,
            skip_verify,
        } => upgrade_dynamic(&ctx, proxy, &contract, skip_verify).await,
        Command::Verify {
            contract,
            address,
            constructor_args,
        } => verify(&ctx, contract, address, constructor_args).await,
    }
}

async fn deploy(ctx: RunContext, skip_verify: bool, save_addresses: bool) -> Result<()> {
    let verifier = ctx.verifier(skip_verify)?;
    let chain = ctx.connect().await?;

    let summary = Deployer::new(chain, ctx.artifacts(), verifier).run().await?;

    let grant = &summary.operator_grant;
    tracing::info!(
        role = %grant.role,
        factory = %grant.grantee,
        already_present = grant.already_present,
        "OPERATOR_ROLE held by the factory on the registry"
    );

    print_records(&summary.records);

    if save_addresses {
        let mut config = ctx.config;
        config.update_address_book(ctx.network.network, &summary.address_book());
        config.save_to_file(&ctx.config_path)?;
    }

    Ok(())
}

/// A deployer for the single-step commands, which do not verify.
async fn single_step_deployer(ctx: &RunContext) -> Result<Deployer<RpcChainClient, EtherscanVerifier>> {
    let deployer = Deployer::new(ctx.connect().await?, ctx.artifacts(), None);
    deployer.report_signer().await?;
    Ok(deployer)
}

async fn deploy_forwarder(ctx: &RunContext) -> Result<()> {
    let mut deployer = single_step_deployer(ctx).await?;

    deployer.deploy_forwarder().await?;

    print_records(deployer.records());
    Ok(())
}

async fn deploy_registry(ctx: &RunContext, forwarder: Option<Address>) -> Result<()> {
    let forwarder = match forwarder {
        Some(address) => address,
        None => ctx.address_book().forwarder()?,
    };

    let mut deployer = single_step_deployer(ctx).await?;
    let forwarder = deployer.attach::<Forwarder>(forwarder).await?;

    deployer.deploy_registry(&forwarder).await?;

    print_records(deployer.records());
    Ok(())
}

async fn deploy_factory(
    ctx: &RunContext,
    forwarder: Option<Address>,
    registry: Option<Address>,
) -> Result<()> {
    let book = ctx.address_book();
    let forwarder = match forwarder {
        Some(address) => address,
        None => book.forwarder()?,
    };
    let registry = match registry {
        Some(address) => address,
        None => book.registry()?,
    };

    let mut deployer = single_step_deployer(ctx).await?;
    let forwarder = deployer.attach::<Forwarder>(forwarder).await?;
    let registry = deployer.attach::<Registry>(registry).await?;

    deployer.require_admin(&registry).await?;
    deployer.deploy_factory(&forwarder, &registry).await?;

    print_records(deployer.records());
    Ok(())
}

async fn upgrade_dynamic(
    ctx: &RunContext,
    proxy: Address,
    contract: &QualifiedName,
    skip_verify: bool,
) -> Result<()> {
    let verifier = ctx.verifier(skip_verify)?;
    let mut deployer = Deployer::new(ctx.connect().await?, ctx.artifacts(), verifier);
    deployer.report_signer().await?;

    let upgrade = deployer.upgrade_proxy(proxy, contract).await?;
    tracing::info!(
        proxy = %upgrade.proxy,
        implementation = %upgrade.implementation.address,
        admin = %upgrade.admin,
        "Proxy now points to the new implementation"
    );

    deployer.verify_deployments().await?;

    print_records(deployer.records());
    Ok(())
}

async fn verify(
    ctx: &RunContext,
    contract: QualifiedName,
    address: Address,
    constructor_args: Bytes,
) -> Result<()> {
    let verifier = ctx.verifier(false)?.with_context(|| {
        format!(
            "Network {} has no block explorer to verify on",
            ctx.network.network
        )
    })?;

    verify_contract(
        &verifier,
        &VerificationRequest {
            address,
            contract,
            constructor_args,
        },
    )
    .await?;

    Ok(())
}

fn print_records(records: &[DeploymentRecord]) {
    if records.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Address", "Transaction", "Verification"]);

    for record in records {
        table.add_row(vec![
            record.contract.name().to_string(),
            record.address.to_string(),
            record.tx_hash.to_string(),
            record
                .verification
                .map(|outcome| outcome.to_string())
                .unwrap_or_else(|| "skipped".to_string()),
        ]);
    }

    println!("{table}");
}
