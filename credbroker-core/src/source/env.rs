//! Ambient environment token source.

use async_trait::async_trait;
use std::sync::Arc;

use super::TokenStrategy;
use crate::error::HelperError;
use crate::oauth::{ApplicationDefaultCredentials, CredentialDiscovery, gcr_scopes};

/// Obtains a token through application default credentials.
///
/// The token must be valid and of type `Bearer`.
pub struct EnvToken {
    discovery: Arc<dyn CredentialDiscovery>,
    scopes: Vec<String>,
}

impl EnvToken {
    pub fn new(discovery: Arc<dyn CredentialDiscovery>) -> Self {
        Self {
            discovery,
            scopes: gcr_scopes(),
        }
    }

    /// Discovery from the process environment with the GCR scopes.
    pub fn from_env() -> Self {
        Self::new(Arc::new(ApplicationDefaultCredentials::from_env()))
    }
}

#[async_trait]
impl TokenStrategy for EnvToken {
    async fn access_token(&self) -> Result<String, HelperError> {
        let source = self.discovery.discover(&self.scopes).await?;
        let token = source.token().await?;

        if !token.is_valid() {
            return Err(HelperError::invalid_token("token was invalid"));
        }

        if !token.is_bearer() {
            return Err(HelperError::invalid_token(format!(
                "expected token type \"Bearer\" but got \"{}\"",
                token.token_type
            )));
        }

        Ok(token.access_token.into_inner())
    }
}
