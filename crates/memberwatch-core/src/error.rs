use thiserror::Error;

/// All the ways things can go wrong in memberwatch
#[derive(Error, Debug)]
pub enum Error {
    #[error("API error: {0}")]
    Api(#[from] memberwatch_api::ApiError),

    #[error("Storage error: {0}")]
    Store(#[from] memberwatch_store::StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True when the fix is "open settings and fill in credentials"
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::Api(memberwatch_api::ApiError::Configuration)
        )
    }
}
