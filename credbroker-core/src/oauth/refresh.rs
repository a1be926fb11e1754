//! Refresh-token grant.

use async_trait::async_trait;
use chrono::Utc;
use oauth2::{RefreshToken, TokenResponse, basic::BasicTokenType, reqwest::async_http_client};

use super::create_oauth_client;
use crate::model::GcrAuth;
use crate::token::{AccessToken, TokenError, TokenSource};

/// Token source that redeems a refresh token on every call.
pub struct RefreshTokenSource {
    auth: GcrAuth,
}

impl RefreshTokenSource {
    pub fn new(auth: GcrAuth) -> Self {
        Self { auth }
    }
}

impl std::fmt::Debug for RefreshTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenSource")
            .field("client_id", &self.auth.client_id)
            .field("token_url", &self.auth.token_url)
            .finish()
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn token(&self) -> Result<AccessToken, TokenError> {
        let client = create_oauth_client(
            &self.auth.token_url,
            self.auth.client_id.clone(),
            self.auth.client_secret.as_ref().map(|s| s.expose().to_string()),
        )?;

        tracing::debug!("Redeeming refresh token at {}", self.auth.token_url);

        let token_response = client
            .exchange_refresh_token(&RefreshToken::new(
                self.auth.refresh_token.expose().to_string(),
            ))
            .request_async(async_http_client)
            .await
            .map_err(|e| TokenError::RefreshFailed {
                message: e.to_string(),
            })?;

        let token_type = match token_response.token_type() {
            BasicTokenType::Bearer => "Bearer".to_string(),
            BasicTokenType::Mac => "MAC".to_string(),
            BasicTokenType::Extension(other) => other.clone(),
        };

        let mut token = AccessToken::new(token_response.access_token().secret().to_string())
            .with_token_type(token_type);

        if let Some(duration) = token_response.expires_in() {
            let expires_at = Utc::now()
                + chrono::Duration::from_std(duration).map_err(|e| TokenError::RefreshFailed {
                    message: format!("invalid expiration duration: {}", e),
                })?;
            token = token.with_expiry(expires_at);
        }

        Ok(token)
    }
}

/// Turns stored auth material into a token source.
pub trait TokenExchange: Send + Sync {
    fn token_source(&self, auth: GcrAuth) -> Box<dyn TokenSource>;
}

/// [`TokenExchange`] backed by [`RefreshTokenSource`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RefreshTokenExchange;

impl TokenExchange for RefreshTokenExchange {
    fn token_source(&self, auth: GcrAuth) -> Box<dyn TokenSource> {
        Box::new(RefreshTokenSource::new(auth))
    }
}
