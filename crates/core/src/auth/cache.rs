//! In-memory access token cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::metrics::TOKEN_REQUESTS;

use super::types::{Credential, TokenCacheKey};
use super::{AuthError, TokenProvider};

/// Default margin before expiry at which a cached token is refreshed.
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 60;

/// Credentials keyed by (client id, scope), shareable across runs.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: Mutex<HashMap<TokenCacheKey, Credential>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached credential for a key, expired or not.
    pub async fn get(&self, key: &TokenCacheKey) -> Option<Credential> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Token provider that reuses credentials until they are about to expire.
///
/// The cache lock is held while the inner provider is asked for a fresh
/// token, so concurrent callers sharing a cache trigger a single refresh.
pub struct CachedTokenProvider {
    inner: Arc<dyn TokenProvider>,
    cache: Arc<TokenCache>,
    refresh_skew: Duration,
}

impl CachedTokenProvider {
    pub fn new(inner: Arc<dyn TokenProvider>, cache: Arc<TokenCache>) -> Self {
        Self {
            inner,
            cache,
            refresh_skew: Duration::seconds(DEFAULT_REFRESH_SKEW_SECS),
        }
    }

    /// Override how long before expiry a token is considered stale.
    pub fn with_refresh_skew(mut self, refresh_skew: Duration) -> Self {
        self.refresh_skew = refresh_skew;
        self
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn acquire(&self) -> Result<Credential, AuthError> {
        let key = self.inner.cache_key();
        let mut entries = self.cache.entries.lock().await;

        if let Some(credential) = entries.get(&key) {
            if !credential.is_expired(self.refresh_skew) {
                TOKEN_REQUESTS.with_label_values(&["cache"]).inc();
                debug!(client_id = %key.client_id, "Using cached access token");
                return Ok(credential.clone());
            }
            debug!(client_id = %key.client_id, "Cached access token expired, refreshing");
        }

        let credential = self.inner.acquire().await?;
        if credential.expires_at().is_some() {
            entries.insert(key, credential.clone());
        } else {
            entries.remove(&key);
        }
        Ok(credential)
    }

    fn cache_key(&self) -> TokenCacheKey {
        self.inner.cache_key()
    }
}
