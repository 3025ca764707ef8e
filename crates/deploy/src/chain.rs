//! Chain access for the deployment runner.
//!
//! [`ChainClient`] is the seam the runner is generic over. [`RpcChainClient`] implements it on
//! top of a JSON-RPC endpoint, signing transactions locally with the deployer key.

use std::{future::Future, time::Duration};

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U64, U256, keccak256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    config::RpcConfig,
    network::NetworkConfig,
    rpc::{create_client, json_rpc_call, poll_until},
};

/// Priority fee used when the node does not implement `eth_maxPriorityFeePerGas`.
pub const FALLBACK_PRIORITY_FEE: u128 = 1_500_000_000;

/// Gas estimates are increased by this percentage before sending.
const GAS_LIMIT_MARGIN_PERCENT: u64 = 20;

/// A transaction to be signed and sent by the chain client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// `TxKind::Create` deploys `input` as creation code.
    pub to: TxKind,
    pub input: Bytes,
    pub value: U256,
}

impl TransactionRequest {
    /// A contract creation with the given creation code and encoded constructor arguments.
    pub fn create(creation_code: &[u8], constructor_args: &[u8]) -> Self {
        let mut input = Vec::with_capacity(creation_code.len() + constructor_args.len());
        input.extend_from_slice(creation_code);
        input.extend_from_slice(constructor_args);

        Self {
            to: TxKind::Create,
            input: input.into(),
            value: U256::ZERO,
        }
    }

    /// A call to `to` with the given calldata.
    pub fn call(to: Address, calldata: impl Into<Bytes>) -> Self {
        Self {
            to: TxKind::Call(to),
            input: calldata.into(),
            value: U256::ZERO,
        }
    }
}

/// The receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    /// Address of the created contract, for contract creations.
    pub contract_address: Option<Address>,
    pub block_number: u64,
    pub gas_used: u64,
    pub success: bool,
}

/// Everything the deployment runner needs from a chain.
///
/// Calls are sequential: every method completes before the runner issues the next one.
pub trait ChainClient: Send + Sync {
    /// The address transactions are sent from.
    fn sender(&self) -> Address;

    /// The chain id of the connected chain.
    fn chain_id(&self) -> u64;

    fn balance(&self, address: Address) -> impl Future<Output = Result<U256>> + Send;

    /// The runtime code stored at `address`. Empty if no contract lives there.
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;

    fn storage_at(&self, address: Address, slot: B256)
    -> impl Future<Output = Result<B256>> + Send;

    /// Execute a read-only call against the latest block.
    fn call(&self, to: Address, calldata: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Sign and submit a transaction, then wait for it to be mined.
    ///
    /// A transaction that is mined but reverted is an error.
    fn send(&self, tx: TransactionRequest) -> impl Future<Output = Result<Receipt>> + Send;
}

/// Fee parameters of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeParams {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

impl FeeParams {
    /// EIP-1559 fees leaving room for the base fee to double before the transaction is mined.
    pub fn eip1559(base_fee: u128, priority_fee: u128) -> Self {
        Self::Eip1559 {
            max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority_fee),
            max_priority_fee_per_gas: priority_fee,
        }
    }
}

/// Fully determined parameters of a transaction, ready to be signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fees: FeeParams,
}

/// Sign `request` with `signer` and return the EIP-2718 encoded transaction.
pub fn sign_transaction(
    signer: &PrivateKeySigner,
    request: &TransactionRequest,
    params: TxParams,
) -> Result<Bytes> {
    let envelope: TxEnvelope = match params.fees {
        FeeParams::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let tx = TxEip1559 {
                chain_id: params.chain_id,
                nonce: params.nonce,
                gas_limit: params.gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to: request.to,
                value: request.value,
                access_list: Default::default(),
                input: request.input.clone(),
            };
            let signature = signer
                .sign_hash_sync(&tx.signature_hash())
                .context("Failed to sign transaction")?;
            tx.into_signed(signature).into()
        }
        FeeParams::Legacy { gas_price } => {
            let tx = TxLegacy {
                chain_id: Some(params.chain_id),
                nonce: params.nonce,
                gas_price,
                gas_limit: params.gas_limit,
                to: request.to,
                value: request.value,
                input: request.input.clone(),
            };
            let signature = signer
                .sign_hash_sync(&tx.signature_hash())
                .context("Failed to sign transaction")?;
            tx.into_signed(signature).into()
        }
    };

    Ok(envelope.encoded_2718().into())
}

/// Add the safety margin to a gas estimate.
fn with_gas_margin(estimate: u64) -> u64 {
    estimate.saturating_add(estimate.saturating_mul(GAS_LIMIT_MARGIN_PERCENT) / 100)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    contract_address: Option<Address>,
    block_number: U64,
    gas_used: U64,
    /// Missing on pre-Byzantium chains, which we treat as success.
    #[serde(default)]
    status: Option<U64>,
}

impl From<RpcReceipt> for Receipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            block_number: receipt.block_number.to(),
            gas_used: receipt.gas_used.to(),
            success: receipt.status.is_none_or(|status| status == U64::from(1)),
        }
    }
}

fn u128_from_quantity(value: U256, what: &str) -> Result<u128> {
    u128::try_from(value)
        .ok()
        .with_context(|| format!("{what} does not fit in 128 bits: {value}"))
}

/// [`ChainClient`] backed by a JSON-RPC endpoint and a local private key.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: reqwest::Client,
    url: String,
    signer: PrivateKeySigner,
    chain_id: u64,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl RpcChainClient {
    /// Connect to the RPC endpoint of `network`.
    ///
    /// Fails if the node reports a chain id different from the one of the selected network.
    pub async fn connect(
        network: &NetworkConfig,
        signer: PrivateKeySigner,
        config: &RpcConfig,
    ) -> Result<Self> {
        let client = create_client(config.request_timeout())?;

        let chain_id: U64 = json_rpc_call(&client, &network.rpc_url, "eth_chainId", vec![])
            .await
            .with_context(|| format!("Failed to reach the RPC endpoint of {}", network.network))?;
        let chain_id: u64 = chain_id.to();

        if chain_id != network.chain_id {
            anyhow::bail!(
                "RPC endpoint of {} reports chain id {}, expected {}",
                network.network,
                chain_id,
                network.chain_id
            );
        }

        tracing::debug!(network = %network.network, chain_id, "Connected to RPC endpoint");

        Ok(Self {
            client,
            url: network.rpc_url.clone(),
            signer,
            chain_id,
            receipt_timeout: config.receipt_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    /// Call object for `eth_call` and `eth_estimateGas`.
    ///
    /// Some nodes only read `data`, newer ones prefer `input`. Both carry the same bytes.
    fn tx_object(&self, tx: &TransactionRequest) -> Value {
        let mut object = json!({
            "from": self.sender(),
            "data": tx.input,
            "input": tx.input,
            "value": tx.value,
        });
        if let TxKind::Call(to) = tx.to {
            object["to"] = json!(to);
        }
        object
    }

    async fn fee_params(&self) -> Result<FeeParams> {
        let block: RpcBlock = self
            .request("eth_getBlockByNumber", vec![json!("latest"), json!(false)])
            .await?;

        match block.base_fee_per_gas {
            Some(base_fee) => {
                let base_fee = u128_from_quantity(base_fee, "Base fee")?;
                let priority_fee = match self
                    .request::<U256>("eth_maxPriorityFeePerGas", vec![])
                    .await
                {
                    Ok(fee) => u128_from_quantity(fee, "Priority fee")?,
                    Err(e) => {
                        tracing::debug!(error = %e, "eth_maxPriorityFeePerGas unavailable, using fallback");
                        FALLBACK_PRIORITY_FEE
                    }
                };
                Ok(FeeParams::eip1559(base_fee, priority_fee))
            }
            None => {
                let gas_price: U256 = self.request("eth_gasPrice", vec![]).await?;
                Ok(FeeParams::Legacy {
                    gas_price: u128_from_quantity(gas_price, "Gas price")?,
                })
            }
        }
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt> {
        let receipt: RpcReceipt = poll_until(
            &format!("receipt of {tx_hash}"),
            self.receipt_timeout,
            self.poll_interval,
            || async move {
                self.request::<Option<RpcReceipt>>("eth_getTransactionReceipt", vec![json!(tx_hash)])
                    .await
            },
        )
        .await?;

        Ok(receipt.into())
    }
}

impl ChainClient for RpcChainClient {
    fn sender(&self) -> Address {
        self.signer.address()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.request("eth_getBalance", vec![json!(address), json!("latest")])
            .await
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.request("eth_getCode", vec![json!(address), json!("latest")])
            .await
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256> {
        self.request(
            "eth_getStorageAt",
            vec![json!(address), json!(slot), json!("latest")],
        )
        .await
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::call(to, calldata);
        self.request("eth_call", vec![self.tx_object(&tx), json!("latest")])
            .await
    }

    async fn send(&self, tx: TransactionRequest) -> Result<Receipt> {
        let nonce: U64 = self
            .request(
                "eth_getTransactionCount",
                vec![json!(self.sender()), json!("pending")],
            )
            .await?;
        let estimate: U64 = self
            .request("eth_estimateGas", vec![self.tx_object(&tx)])
            .await
            .context("Gas estimation failed, the transaction would revert")?;
        let fees = self.fee_params().await?;

        let params = TxParams {
            chain_id: self.chain_id,
            nonce: nonce.to(),
            gas_limit: with_gas_margin(estimate.to()),
            fees,
        };
        let raw = sign_transaction(&self.signer, &tx, params)?;
        let local_hash = keccak256(&raw);

        let tx_hash: B256 = self
            .request("eth_sendRawTransaction", vec![json!(raw)])
            .await?;
        if tx_hash != local_hash {
            tracing::warn!(%tx_hash, %local_hash, "Node returned an unexpected transaction hash");
        }

        tracing::debug!(%tx_hash, nonce = params.nonce, gas_limit = params.gas_limit, "Transaction submitted");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            anyhow::bail!(
                "Transaction {} reverted in block {}",
                receipt.tx_hash,
                receipt.block_number
            );
        }

        Ok(receipt)
    }
}
