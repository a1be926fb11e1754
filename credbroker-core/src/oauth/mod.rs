//! OAuth 2.0 token sources.
//!
//! The helper never implements a token exchange itself; it delegates to the
//! `oauth2` and `reqwest` crates through these adapters:
//! - [`refresh`] - Refresh-token grant against a token endpoint
//! - [`metadata`] - GCE metadata server tokens
//! - [`service_account`] - JWT-bearer grant for service account keys
//! - [`adc`] - Application default credentials discovery

pub mod adc;
pub mod metadata;
pub mod refresh;
pub mod service_account;

pub use adc::{ApplicationDefaultCredentials, CredentialDiscovery};
pub use metadata::MetadataTokenSource;
pub use refresh::{RefreshTokenExchange, RefreshTokenSource, TokenExchange};
pub use service_account::{ServiceAccountKey, ServiceAccountTokenSource};

use oauth2::{AuthUrl, ClientId, ClientSecret, TokenUrl, basic::BasicClient};

use crate::token::TokenError;

/// Google's OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested for registry access.
pub const GCR_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// GCR scopes as owned strings.
pub fn gcr_scopes() -> Vec<String> {
    GCR_SCOPES.iter().map(|s| s.to_string()).collect()
}

/// Create an OAuth2 client for a token endpoint.
///
/// # Arguments
///
/// * `token_url` - Endpoint refresh tokens are redeemed at
/// * `client_id` - OAuth client ID
/// * `client_secret` - Optional OAuth client secret (required for confidential clients)
pub fn create_oauth_client(
    token_url: &str,
    client_id: impl Into<String>,
    client_secret: Option<impl Into<String>>,
) -> Result<BasicClient, TokenError> {
    let auth_url = AuthUrl::new(GOOGLE_AUTH_URL.to_string()).map_err(|e| TokenError::OAuthError {
        message: format!("invalid auth URL: {}", e),
    })?;

    let token_url = TokenUrl::new(token_url.to_string()).map_err(|e| TokenError::OAuthError {
        message: format!("invalid token URL: {}", e),
    })?;

    Ok(BasicClient::new(
        ClientId::new(client_id.into()),
        client_secret.map(|s| ClientSecret::new(s.into())),
        auth_url,
        Some(token_url),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_oauth_client() {
        let client = create_oauth_client(GOOGLE_TOKEN_URL, "test-client-id", Some("test-secret"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_create_oauth_client_invalid_token_url() {
        let client = create_oauth_client("not a valid url", "test-client-id", None::<String>);
        assert!(matches!(client, Err(TokenError::OAuthError { .. })));
    }
}
