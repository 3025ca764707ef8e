/// Errors returned by an Etherscan-compatible explorer API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Contract source code is not verified")]
    ContractNotVerified,
    #[error("Contract source code is already verified")]
    ContractAlreadyVerified,
    #[error("Verification is pending in the explorer queue")]
    VerificationPending,
    #[error("The explorer has not indexed the contract bytecode yet")]
    ContractNotIndexed,
    #[error("Explorer rate limit reached")]
    RateLimitExceeded,
    #[error("Daily limit of source code submissions reached")]
    DailyVerificationRequestsLimitExceeded,
    #[error("Invalid explorer API key")]
    InvalidApiKey,
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
    #[error("Explorer returned an error response: {message}, {result}")]
    ErrorResponse { message: String, result: String },
    #[error("Unexpected explorer response: {message}, {result}")]
    UnexpectedResponse { message: String, result: String },
    #[error("Failed to deserialize explorer response {content}: {error}")]
    Serde {
        #[source]
        error: serde_json::Error,
        content: String,
    },
    #[error("Explorer request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl ApiError {
    /// Whether a source submission failing with this error may succeed later.
    pub fn is_retriable_submission(&self) -> bool {
        matches!(self, Self::ContractNotIndexed | Self::RateLimitExceeded)
    }

    /// Whether polling the verification status should continue.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::VerificationPending | Self::RateLimitExceeded)
    }
}
