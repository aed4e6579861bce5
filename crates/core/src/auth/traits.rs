use async_trait::async_trait;
use thiserror::Error;

use super::types::{Credential, TokenCacheKey};

#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider rejected or could not complete the exchange.
    #[error("Failed to authenticate: {0}")]
    Authentication(String),

    /// Anything else that went wrong while preparing the request.
    #[error("Unexpected error during authentication: {0}")]
    Unexpected(String),
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a bearer credential for the configured scope
    async fn acquire(&self) -> Result<Credential, AuthError>;

    /// Identity of the credential this provider hands out
    fn cache_key(&self) -> TokenCacheKey;
}
