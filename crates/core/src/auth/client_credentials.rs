//! OAuth2 client-credentials token provider.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use tracing::{debug, error, info};

use crate::config::PowerBiConfig;
use crate::metrics::TOKEN_REQUESTS;

use super::types::{Credential, TokenCacheKey, TokenErrorResponse, TokenResponse};
use super::{AuthError, TokenProvider};

/// Confidential client that exchanges a client id/secret for an access token.
pub struct ClientCredentialsProvider {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientCredentialsProvider {
    /// Create a provider with its own HTTP client.
    pub fn new(config: &PowerBiConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AuthError::Unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a provider that shares an existing HTTP client.
    pub fn with_client(client: Client, config: &PowerBiConfig) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            config.authority_host.trim_end_matches('/'),
            config.tenant_id
        );

        Self {
            client,
            token_url,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
        }
    }

    /// Token endpoint this provider posts to.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn acquire(&self) -> Result<Credential, AuthError> {
        info!("Acquiring access token for Power BI API");
        TOKEN_REQUESTS.with_label_values(&["identity_provider"]).inc();

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("Token request to identity provider failed: {}", e);
                AuthError::Authentication(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Authentication(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.message())
                .unwrap_or(body);
            error!(
                "Failed to acquire access token (HTTP {}): {}",
                status.as_u16(),
                message
            );
            return Err(AuthError::Authentication(message));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::Authentication(format!("invalid token response: {}", e))
        })?;

        if token.access_token.is_empty() {
            return Err(AuthError::Authentication(
                "token response did not contain an access token".to_string(),
            ));
        }

        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        debug!(
            token_type = ?token.token_type,
            expires_at = ?expires_at,
            "Token response received"
        );
        info!("Successfully acquired access token");

        Ok(Credential::new(token.access_token, expires_at))
    }

    fn cache_key(&self) -> TokenCacheKey {
        TokenCacheKey::new(&self.client_id, &self.scope)
    }
}
