mod cache;
mod client_credentials;
mod traits;
mod types;

pub use cache::*;
pub use client_credentials::*;
pub use traits::*;
pub use types::{Credential, TokenCacheKey};

use std::sync::Arc;

use crate::config::PowerBiConfig;

/// Factory function to create the token provider from config.
///
/// When token caching is enabled the provider stores credentials in `cache`,
/// or in a fresh cache if none is given.
pub fn create_token_provider(
    config: &PowerBiConfig,
    cache: Option<Arc<TokenCache>>,
) -> Result<Arc<dyn TokenProvider>, AuthError> {
    let provider: Arc<dyn TokenProvider> = Arc::new(ClientCredentialsProvider::new(config)?);

    if !config.cache_tokens {
        return Ok(provider);
    }

    let cache = cache.unwrap_or_else(|| Arc::new(TokenCache::new()));
    Ok(Arc::new(CachedTokenProvider::new(provider, cache)))
}
