//! Mock token provider for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::auth::{AuthError, Credential, TokenCacheKey, TokenProvider};

/// Mock implementation of the TokenProvider trait.
///
/// Every successful acquisition hands out a new token, `mock-token-1`,
/// `mock-token-2` and so on, so tests can tell which call used which token.
#[derive(Debug)]
pub struct MockTokenProvider {
    /// Number of `acquire` calls, failed ones included.
    acquired: AtomicUsize,
    /// Lifetime of issued tokens; `None` issues tokens without expiry.
    lifetime: Arc<RwLock<Option<Duration>>>,
    /// If set, the next acquisition fails with this error.
    next_error: Arc<RwLock<Option<AuthError>>>,
}

impl Default for MockTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTokenProvider {
    /// Create a provider issuing tokens valid for one hour.
    pub fn new() -> Self {
        Self {
            acquired: AtomicUsize::new(0),
            lifetime: Arc::new(RwLock::new(Some(Duration::hours(1)))),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_lifetime(&self, lifetime: Option<Duration>) {
        *self.lifetime.write().await = lifetime;
    }

    /// Make the next acquisition fail.
    pub async fn set_next_error(&self, error: AuthError) {
        *self.next_error.write().await = Some(error);
    }

    pub fn acquire_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn acquire(&self) -> Result<Credential, AuthError> {
        let n = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        let expires_at = self.lifetime.read().await.map(|lifetime| Utc::now() + lifetime);
        Ok(Credential::new(format!("mock-token-{}", n), expires_at))
    }

    fn cache_key(&self) -> TokenCacheKey {
        TokenCacheKey::new("mock-client", "mock-scope")
    }
}
