//! Source verification on block explorers.

mod client;
mod errors;
mod types;

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, Bytes};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};

pub use client::EtherscanClient;
pub use errors::ApiError;
pub use types::{CodeFormat, EtherscanVerificationRequest};

use crate::{
    artifacts::{ArtifactStore, QualifiedName},
    config::VerificationConfig,
};

/// A contract to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub address: Address,
    pub contract: QualifiedName,
    /// ABI-encoded constructor arguments, exactly as appended to the creation code.
    pub constructor_args: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VerificationOutcome {
    #[strum(serialize = "verified")]
    Verified,
    #[strum(serialize = "already verified")]
    AlreadyVerified,
}

/// Submits contract sources for verification.
pub trait SourceVerifier: Send + Sync {
    fn verify(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<VerificationOutcome>> + Send;
}

/// Verify `request` with `verifier` and log the outcome.
pub async fn verify_contract<V: SourceVerifier>(
    verifier: &V,
    request: &VerificationRequest,
) -> Result<VerificationOutcome> {
    let outcome = verifier.verify(request).await?;
    tracing::info!(
        contract = %request.contract,
        address = %request.address,
        %outcome,
        "Contract source verification"
    );

    Ok(outcome)
}

/// [`SourceVerifier`] submitting the standard-JSON input of the Hardhat build to an
/// Etherscan-compatible API.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: EtherscanClient,
    artifacts: ArtifactStore,
    config: VerificationConfig,
}

impl EtherscanVerifier {
    pub fn new(client: EtherscanClient, artifacts: ArtifactStore, config: VerificationConfig) -> Self {
        Self {
            client,
            artifacts,
            config,
        }
    }

    fn submission(&self, request: &VerificationRequest) -> Result<EtherscanVerificationRequest> {
        let build_info = self.artifacts.build_info(&request.contract)?;
        let source_code = serde_json::to_string(&build_info.input)
            .context("Failed to serialize the compiler input")?;

        Ok(EtherscanVerificationRequest {
            contract_address: request.address,
            source_code,
            code_format: CodeFormat::StandardJsonInput,
            contract_name: request.contract.to_string(),
            compiler_version: build_info.explorer_compiler_version(),
            constructor_arguments: hex::encode(&request.constructor_args),
        })
    }

    async fn submit(&self, submission: &EtherscanVerificationRequest) -> Result<String, ApiError> {
        (|| async { self.client.verify(submission).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(Duration::from_secs(self.config.submit_delay_secs))
                    .with_max_times(self.config.submit_retries),
            )
            .when(ApiError::is_retriable_submission)
            .notify(|err, delay| {
                tracing::info!(
                    contract = %submission.contract_name,
                    error = %err,
                    "Explorer is not ready for the submission, retrying in {delay:?}"
                );
            })
            .await
    }

    async fn wait_for_status(&self, guid: &str) -> Result<String, ApiError> {
        (|| async { self.client.get_verification_status(guid).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(Duration::from_secs(self.config.status_delay_secs))
                    .with_max_times(self.config.status_retries),
            )
            .when(ApiError::is_pending)
            .notify(|_, delay| {
                tracing::debug!(guid, "Verification pending, checking again in {delay:?}");
            })
            .await
    }
}

impl SourceVerifier for EtherscanVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationOutcome> {
        let contract = &request.contract;

        if self
            .client
            .is_contract_verified(request.address)
            .await
            .with_context(|| format!("Failed to query the verification state of {contract}"))?
        {
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        let submission = self.submission(request)?;

        let guid = match self.submit(&submission).await {
            Ok(guid) => guid,
            Err(ApiError::ContractAlreadyVerified) => {
                return Ok(VerificationOutcome::AlreadyVerified);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to submit {contract} for verification"));
            }
        };

        tracing::debug!(%contract, guid = %guid, "Verification submitted");

        match self.wait_for_status(&guid).await {
            Ok(_) => Ok(VerificationOutcome::Verified),
            Err(ApiError::ContractAlreadyVerified) => Ok(VerificationOutcome::AlreadyVerified),
            Err(err) => Err(err).with_context(|| format!("Verification of {contract} failed")),
        }
    }
}
