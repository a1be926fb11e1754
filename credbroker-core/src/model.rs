//! Domain model types for credbroker.
//!
//! This module defines the core types used throughout the helper:
//! - [`Credentials`] - Third-party registry login material
//! - [`GcrAuth`] - Stored auth material for the private-store token source
//! - [`TokenSourceKind`] - The recognized token source identifiers
//! - [`GCR_OAUTH2_USERNAME`] - Sentinel username for privileged registries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::oauth::GOOGLE_TOKEN_URL;
use crate::store::Secret;

/// Username reported for every privileged registry.
///
/// Signals to docker that the paired secret is a bearer token rather than
/// a password.
pub const GCR_OAUTH2_USERNAME: &str = "oauth2accesstoken";

/// Token source order used when the user has not configured one.
pub const DEFAULT_TOKEN_SOURCES: &[&str] = &["store", "gcloud_sdk"];

/// Login material for a third-party registry.
///
/// Field names serialize the way docker's credential-helper protocol spells
/// them (`ServerURL`, `Username`, `Secret`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "ServerURL")]
    pub server_url: String,

    #[serde(rename = "Username")]
    pub username: String,

    #[serde(rename = "Secret")]
    pub secret: Secret,
}

impl Credentials {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            secret: Secret::new(secret),
        }
    }
}

/// Auth material persisted for the private-store token source.
///
/// Holds an OAuth2 client registration and a long-lived refresh token that
/// is exchanged for a short-lived access token on every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcrAuth {
    /// OAuth client ID the refresh token was issued to.
    pub client_id: String,

    /// OAuth client secret, absent for public clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<Secret>,

    /// Long-lived refresh token.
    pub refresh_token: Secret,

    /// Token endpoint the refresh token is redeemed at.
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl GcrAuth {
    /// Create auth material for Google's token endpoint.
    pub fn new(client_id: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            refresh_token: Secret::new(refresh_token),
            token_url: default_token_url(),
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(Secret::new(client_secret));
        self
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

/// A recognized token source identifier.
///
/// Configuration carries plain strings; they are parsed at resolution time
/// so that an unknown identifier surfaces as an error on the request that
/// hits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSourceKind {
    /// Application default credentials from the ambient environment.
    Env,
    /// `gcloud auth print-access-token`.
    GcloudSdk,
    /// Refresh token held in the credential store.
    Store,
}

impl TokenSourceKind {
    /// Get the configuration identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::GcloudSdk => "gcloud_sdk",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for TokenSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TokenSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "env" => Ok(Self::Env),
            "gcloud_sdk" => Ok(Self::GcloudSdk),
            "store" => Ok(Self::Store),
            _ => Err(s.to_string()),
        }
    }
}

/// The default token source list as owned strings.
pub fn default_token_sources() -> Vec<String> {
    DEFAULT_TOKEN_SOURCES.iter().map(|s| s.to_string()).collect()
}
