//! Service account key exchange.
//!
//! A service account key file carries an RSA private key. Each token request
//! signs a short-lived JWT assertion with that key and redeems it at the
//! key's token endpoint using the JWT-bearer grant (RFC 7523).

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::GOOGLE_TOKEN_URL;
use crate::store::Secret;
use crate::token::{AccessToken, TokenError, TokenSource};

/// Grant type for redeeming a signed assertion.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion, in seconds.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The fields of a `service_account` key file needed for the exchange.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account identity, used as the assertion issuer.
    pub client_email: String,

    /// PEM-encoded RSA private key.
    pub private_key: Secret,

    /// Key identifier, sent as the JWT `kid` header when present.
    #[serde(default)]
    pub private_key_id: Option<String>,

    /// Token endpoint the assertion is redeemed at.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token source minting tokens from a service account key.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl ServiceAccountTokenSource {
    /// Create a source for `key`.
    ///
    /// Fails with [`TokenError::OAuthError`] if the private key is not a
    /// valid RSA PEM.
    pub fn new(key: ServiceAccountKey, scopes: Vec<String>) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.expose().as_bytes())
            .map_err(|e| TokenError::OAuthError {
                message: format!("invalid service account private key: {}", e),
            })?;

        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Ok(Self {
            key,
            encoding_key,
            scopes,
            http_client,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn assertion(&self) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        encode(&header, &claims, &self.encoding_key).map_err(|e| TokenError::OAuthError {
            message: format!("failed to sign assertion: {}", e),
        })
    }
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("key", &self.key)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn token(&self) -> Result<AccessToken, TokenError> {
        let assertion = self.assertion()?;

        tracing::debug!(
            "Exchanging assertion for {} at {}",
            self.key.client_email,
            self.key.token_uri
        );

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| TokenError::NetworkError {
                message: format!("token request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::RefreshFailed {
                message: format!("token endpoint returned {}: {}", status, body.trim()),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| TokenError::NetworkError {
            message: format!("invalid token response: {}", e),
        })?;

        let mut token = AccessToken::new(body.access_token).with_token_type(&body.token_type);
        if let Some(seconds) = body.expires_in {
            token = token.expires_in(seconds);
        }

        Ok(token)
    }
}
