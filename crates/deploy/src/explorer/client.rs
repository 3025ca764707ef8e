use std::collections::HashMap;

use alloy_core::primitives::Address;
use reqwest::Client;
use serde::Serialize;

use super::{
    errors::ApiError,
    types::{ApiAction, ApiModule, ApiRequest, ApiResponseRaw, EtherscanVerificationRequest},
};

/// Client of an Etherscan-compatible verification API.
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    api_url: String,
    api_key: String,
    chain_id: u64,
    http_client: Client,
}

pub(super) fn process_api_call_result(
    result: Result<impl AsRef<str>, reqwest::Error>,
) -> Result<String, ApiError> {
    let result = result?;
    let result = result.as_ref();

    let raw_response: ApiResponseRaw =
        serde_json::from_str(result).map_err(|error| ApiError::Serde {
            error,
            content: result.to_string(),
        })?;

    match raw_response.status.as_str() {
        "0" => {
            let result = raw_response.result;
            let result_lower = result.to_lowercase();

            if result == "Contract source code not verified" {
                return Err(ApiError::ContractNotVerified);
            }
            if result == "Contract source code already verified" || result == "Already Verified" {
                return Err(ApiError::ContractAlreadyVerified);
            }
            if result == "Pending in queue" {
                return Err(ApiError::VerificationPending);
            }
            if result_lower.starts_with("unable to locate contractcode") {
                return Err(ApiError::ContractNotIndexed);
            }
            if result.starts_with("Daily limit") && result.ends_with("source code submissions reached")
            {
                return Err(ApiError::DailyVerificationRequestsLimitExceeded);
            }
            if result_lower.contains("rate limit reached") {
                return Err(ApiError::RateLimitExceeded);
            }
            // "Invalid API Key" or "Missing/Invalid API Key"
            if result_lower.contains("invalid api key") {
                return Err(ApiError::InvalidApiKey);
            }
            if let Some(reason) = result.strip_prefix("Fail - ") {
                return Err(ApiError::VerificationFailed(reason.to_string()));
            }
            Err(ApiError::ErrorResponse {
                message: raw_response.message,
                result,
            })
        }
        "1" => Ok(raw_response.result),
        _ => Err(ApiError::UnexpectedResponse {
            message: raw_response.message,
            result: raw_response.result,
        }),
    }
}

impl EtherscanClient {
    /// Creates a new client for the explorer of `chain_id`.
    ///
    /// # Arguments
    /// - `http_client` - HTTP client, carrying the request timeout.
    /// - `api_url` - URL of the Etherscan API.
    /// - `api_key` - API key for the Etherscan API.
    /// - `chain_id` - Chain the contracts live on, sent as the `chainid` query parameter.
    pub fn new(http_client: Client, api_url: String, api_key: String, chain_id: u64) -> Self {
        Self {
            api_url,
            api_key,
            chain_id,
            http_client,
        }
    }

    async fn post<T>(&self, module: ApiModule, action: ApiAction, form: T) -> Result<String, ApiError>
    where
        T: Serialize,
    {
        let payload = ApiRequest::new(&self.api_key, module, action, form);
        let response_result = self
            .http_client
            .post(&self.api_url)
            .query(&[("chainid", self.chain_id)])
            .form(&payload)
            .send()
            .await?
            .text()
            .await;
        process_api_call_result(response_result)
    }

    async fn get<T>(&self, module: ApiModule, action: ApiAction, query: T) -> Result<String, ApiError>
    where
        T: Serialize,
    {
        let query = ApiRequest::new(&self.api_key, module, action, query);
        let response_result = self
            .http_client
            .get(&self.api_url)
            .query(&[("chainid", self.chain_id)])
            .query(&query)
            .send()
            .await?
            .text()
            .await;
        process_api_call_result(response_result)
    }

    pub async fn is_contract_verified(&self, contract_address: Address) -> Result<bool, ApiError> {
        let response = self
            .get(
                ApiModule::Contract,
                ApiAction::GetAbi,
                HashMap::from([("address", contract_address)]),
            )
            .await;

        match response {
            Ok(_) => Ok(true),
            Err(ApiError::ContractNotVerified) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn get_verification_status(&self, guid: &str) -> Result<String, ApiError> {
        self.get(
            ApiModule::Contract,
            ApiAction::GetVerificationStatus,
            HashMap::from([("guid", guid)]),
        )
        .await
    }

    /// Submit a source verification. Returns the guid to poll the status with.
    pub async fn verify(&self, request: &EtherscanVerificationRequest) -> Result<String, ApiError> {
        self.post(ApiModule::Contract, ApiAction::VerifySourceCode, request)
            .await
    }
}
