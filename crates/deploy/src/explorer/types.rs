use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum ApiModule {
    Contract,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(super) enum ApiAction {
    #[serde(rename = "getabi")]
    GetAbi,
    #[serde(rename = "verifysourcecode")]
    VerifySourceCode,
    #[serde(rename = "checkverifystatus")]
    GetVerificationStatus,
}

/// Common fields of every API call, followed by the action payload.
#[derive(Debug, Serialize)]
pub(super) struct ApiRequest<'a, T> {
    #[serde(rename = "apikey")]
    api_key: &'a str,
    module: ApiModule,
    action: ApiAction,
    #[serde(flatten)]
    payload: T,
}

impl<'a, T> ApiRequest<'a, T> {
    pub(super) fn new(api_key: &'a str, module: ApiModule, action: ApiAction, payload: T) -> Self {
        Self {
            api_key,
            module,
            action,
            payload,
        }
    }
}

/// Response envelope of every API call. The result is a plain string for the supported actions.
#[derive(Debug, Deserialize)]
pub(super) struct ApiResponseRaw {
    pub status: String,
    pub message: String,
    pub result: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodeFormat {
    #[serde(rename = "solidity-standard-json-input")]
    StandardJsonInput,
}

/// Form fields of a `verifysourcecode` submission.
///
/// Sent url-encoded, so every field is renamed individually.
#[derive(Debug, Clone, Serialize)]
pub struct EtherscanVerificationRequest {
    #[serde(rename = "contractaddress")]
    pub contract_address: Address,
    #[serde(rename = "sourceCode")]
    pub source_code: String,
    #[serde(rename = "codeformat")]
    pub code_format: CodeFormat,
    /// Fully qualified name, `<source>:<contract>`.
    #[serde(rename = "contractname")]
    pub contract_name: String,
    #[serde(rename = "compilerversion")]
    pub compiler_version: String,
    /// Hex without the `0x` prefix. The misspelling is the one the API expects.
    #[serde(rename = "constructorArguements")]
    pub constructor_arguments: String,
}
