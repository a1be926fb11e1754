//! Application default credentials discovery.
//!
//! Looks for credentials in the following places, preferring the first
//! location found:
//!
//! 1. A JSON file named by the `GOOGLE_APPLICATION_CREDENTIALS` environment
//!    variable.
//! 2. The file gcloud writes on `gcloud auth application-default login`:
//!    `%APPDATA%\gcloud\application_default_credentials.json` on Windows,
//!    `$HOME/.config/gcloud/application_default_credentials.json` elsewhere.
//! 3. The GCE metadata server.
//!
//! Credentials files of type `authorized_user` are redeemed with the
//! refresh-token grant; `service_account` key files with the JWT-bearer
//! grant.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{
    GOOGLE_TOKEN_URL, MetadataTokenSource, RefreshTokenSource, ServiceAccountKey,
    ServiceAccountTokenSource,
};
use crate::model::GcrAuth;
use crate::store::Secret;
use crate::token::{TokenError, TokenSource};

/// Environment variable naming an explicit credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

/// Finds a token source from the ambient environment.
#[async_trait]
pub trait CredentialDiscovery: Send + Sync {
    async fn discover(&self, scopes: &[String]) -> Result<Box<dyn TokenSource>, TokenError>;
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// The standard discovery chain.
#[derive(Debug, Clone)]
pub struct ApplicationDefaultCredentials {
    explicit_file: Option<PathBuf>,
    well_known_file: Option<PathBuf>,
    metadata_base_url: Option<String>,
}

impl ApplicationDefaultCredentials {
    /// Discovery configured from the process environment.
    pub fn from_env() -> Self {
        Self {
            explicit_file: std::env::var_os(CREDENTIALS_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            well_known_file: well_known_file(),
            metadata_base_url: None,
        }
    }

    /// Discovery with explicit locations.
    ///
    /// `metadata_base_url` of `None` uses `GCE_METADATA_HOST` or the default
    /// metadata address.
    pub fn new(
        explicit_file: Option<PathBuf>,
        well_known_file: Option<PathBuf>,
        metadata_base_url: Option<String>,
    ) -> Self {
        Self {
            explicit_file,
            well_known_file,
            metadata_base_url,
        }
    }

    fn metadata_source(&self, scopes: &[String]) -> MetadataTokenSource {
        match &self.metadata_base_url {
            Some(base) => MetadataTokenSource::new(base.clone(), scopes.to_vec()),
            None => MetadataTokenSource::from_env(scopes.to_vec()),
        }
    }
}

impl Default for ApplicationDefaultCredentials {
    fn default() -> Self {
        Self::from_env()
    }
}

#[async_trait]
impl CredentialDiscovery for ApplicationDefaultCredentials {
    async fn discover(&self, scopes: &[String]) -> Result<Box<dyn TokenSource>, TokenError> {
        if let Some(path) = &self.explicit_file {
            tracing::debug!("Using credentials from {} ({:?})", CREDENTIALS_ENV, path);
            return token_source_from_file(path, scopes);
        }

        if let Some(path) = self.well_known_file.as_ref().filter(|p| p.exists()) {
            tracing::debug!("Using gcloud application default credentials {:?}", path);
            return token_source_from_file(path, scopes);
        }

        let metadata = self.metadata_source(scopes);
        if metadata.is_available().await {
            tracing::debug!("Using metadata server at {}", metadata.base_url());
            return Ok(Box::new(metadata));
        }

        Err(TokenError::NoDefaultCredentials {
            message: format!(
                "set {} or run `gcloud auth application-default login`",
                CREDENTIALS_ENV
            ),
        })
    }
}

/// Location of the gcloud application default credentials file.
pub fn well_known_file() -> Option<PathBuf> {
    let dirs = directories::BaseDirs::new()?;
    let gcloud_dir = if cfg!(windows) {
        dirs.config_dir().join("gcloud")
    } else {
        dirs.home_dir().join(".config").join("gcloud")
    };
    Some(gcloud_dir.join(WELL_KNOWN_FILE))
}

fn token_source_from_file(
    path: &Path,
    scopes: &[String],
) -> Result<Box<dyn TokenSource>, TokenError> {
    let invalid = |message: String| TokenError::InvalidCredentialsFile {
        path: path.display().to_string(),
        message,
    };

    let contents = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let file: CredentialsFile =
        serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;

    match file.kind.as_str() {
        "authorized_user" => {
            let client_id = file
                .client_id
                .ok_or_else(|| invalid("missing client_id".to_string()))?;
            let refresh_token = file
                .refresh_token
                .ok_or_else(|| invalid("missing refresh_token".to_string()))?;

            let auth = GcrAuth {
                client_id,
                client_secret: file.client_secret.map(Secret::new),
                refresh_token: Secret::new(refresh_token),
                token_url: file
                    .token_uri
                    .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            };
            Ok(Box::new(RefreshTokenSource::new(auth)))
        }
        "service_account" => {
            let key: ServiceAccountKey =
                serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
            let source = ServiceAccountTokenSource::new(key, scopes.to_vec())
                .map_err(|e| invalid(e.to_string()))?;
            Ok(Box::new(source))
        }
        other => Err(TokenError::UnsupportedCredentialType {
            kind: other.to_string(),
        }),
    }
}
