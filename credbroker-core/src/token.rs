//! Access tokens and the token source abstraction.
//!
//! This module provides:
//! - [`AccessToken`] - A short-lived bearer token with validity metadata
//! - [`TokenSource`] - Trait for anything that can mint an [`AccessToken`]
//! - [`TokenError`] - Failures of the underlying OAuth capability

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::store::Secret;

/// Tokens expiring within this window are treated as already expired.
const EXPIRY_SKEW_SECONDS: i64 = 10;

/// Error type for token acquisition.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Token refresh was rejected by the token endpoint.
    #[error("token refresh failed: {message}")]
    RefreshFailed { message: String },

    /// OAuth client configuration is invalid.
    #[error("OAuth configuration error: {message}")]
    OAuthError { message: String },

    /// Network error talking to a token endpoint.
    #[error("network error: {message}")]
    NetworkError { message: String },

    /// A credentials file could not be read or parsed.
    #[error("invalid credentials file {path}: {message}")]
    InvalidCredentialsFile { path: String, message: String },

    /// A credentials file has a type this helper cannot exchange.
    #[error("unsupported credentials type: {kind}")]
    UnsupportedCredentialType { kind: String },

    /// Default credential discovery found nothing usable.
    #[error("could not find default credentials: {message}")]
    NoDefaultCredentials { message: String },
}

/// A short-lived access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The token value.
    pub access_token: Secret,

    /// Token type as reported by the issuer (usually "Bearer").
    pub token_type: String,

    /// When this token expires (None if unknown or non-expiring).
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Create a new bearer token with no expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }

    /// Set the expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the expiration relative to now.
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_expiry(Utc::now() + Duration::seconds(seconds))
    }

    /// Set the token type.
    ///
    /// The case-insensitive spellings of "bearer", "mac" and "basic" are
    /// normalized; anything else is kept verbatim.
    pub fn with_token_type(mut self, token_type: impl AsRef<str>) -> Self {
        self.token_type = normalize_token_type(token_type.as_ref());
        self
    }

    /// Check if this token has expired or is about to.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| exp - Duration::seconds(EXPIRY_SKEW_SECONDS) < Utc::now())
            .unwrap_or(false)
    }

    /// A token is valid when it is non-empty and not expired.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    pub fn is_bearer(&self) -> bool {
        self.token_type == "Bearer"
    }
}

fn normalize_token_type(token_type: &str) -> String {
    if token_type.is_empty() || token_type.eq_ignore_ascii_case("bearer") {
        "Bearer".to_string()
    } else if token_type.eq_ignore_ascii_case("mac") {
        "MAC".to_string()
    } else if token_type.eq_ignore_ascii_case("basic") {
        "Basic".to_string()
    } else {
        token_type.to_string()
    }
}

/// Something that can produce access tokens.
///
/// Implementations wrap an external OAuth capability: a refresh-token
/// exchange, the GCE metadata server, or a fixed token in tests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a token. Each call may hit the network.
    async fn token(&self) -> Result<AccessToken, TokenError>;
}
