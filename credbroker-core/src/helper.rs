//! The credential helper façade.
//!
//! [`CredentialHelper`] implements the four docker credential-helper verbs.
//! Privileged registry hosts are answered with a freshly resolved access
//! token under the [`GCR_OAUTH2_USERNAME`] sentinel; everything else goes to
//! the injected [`CredStore`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HelperError;
use crate::model::{Credentials, GCR_OAUTH2_USERNAME};
use crate::registry::RegistrySet;
use crate::resolve::TokenResolver;
use crate::store::{CredStore, Secret};

const GCR_ADD_UNSUPPORTED: &str = "this operation is unsupported for GCR, \
    use `gcloud auth login` or `gcloud auth application-default login` instead \
    of storing credentials for GCR registries";

/// Credential helper for GCR and third-party registries.
pub struct CredentialHelper {
    store: Arc<dyn CredStore>,
    registries: RegistrySet,
    resolver: TokenResolver,
}

impl CredentialHelper {
    pub fn new(store: Arc<dyn CredStore>, registries: RegistrySet, resolver: TokenResolver) -> Self {
        Self {
            store,
            registries,
            resolver,
        }
    }

    /// Helper with the standard strategies and the given source order.
    pub fn with_sources(
        store: Arc<dyn CredStore>,
        registries: RegistrySet,
        sources: Vec<String>,
    ) -> Self {
        let resolver = TokenResolver::from_env(store.clone(), sources);
        Self::new(store, registries, resolver)
    }

    pub fn registries(&self) -> &RegistrySet {
        &self.registries
    }

    pub fn resolver(&self) -> &TokenResolver {
        &self.resolver
    }

    pub fn is_privileged(&self, server_url: &str) -> bool {
        self.registries.is_privileged(server_url)
    }

    /// Map every known server URL to its username.
    ///
    /// Stored third-party entries are merged with one sentinel entry per
    /// privileged registry.
    pub async fn list(&self) -> Result<HashMap<String, String>, HelperError> {
        let third_party = self
            .store
            .all_third_party_creds()
            .await
            .map_err(|e| HelperError::context("could not retrieve 3p credentials", e))?;

        let mut listing: HashMap<String, String> = third_party
            .into_iter()
            .map(|(server_url, creds)| (server_url, creds.username))
            .collect();

        for registry in self.registries.iter() {
            listing.insert(registry.to_string(), GCR_OAUTH2_USERNAME.to_string());
        }

        Ok(listing)
    }

    /// Store third-party credentials.
    ///
    /// Refused for privileged registries without touching the store.
    pub async fn add(&self, creds: &Credentials) -> Result<(), HelperError> {
        let server_url = &creds.server_url;
        if self.is_privileged(server_url) {
            return Err(HelperError::unsupported(GCR_ADD_UNSUPPORTED));
        }

        self.store
            .set_other_creds(creds)
            .await
            .map_err(|e| {
                HelperError::context(format!("could not store 3p credentials for {}", server_url), e)
            })?;

        tracing::debug!("Stored credentials for {}", server_url);
        Ok(())
    }

    /// Remove third-party credentials.
    ///
    /// Refused for privileged registries without touching the store.
    pub async fn delete(&self, server_url: &str) -> Result<(), HelperError> {
        if self.is_privileged(server_url) {
            return Err(HelperError::unsupported(format!(
                "delete is unimplemented for GCR: {}",
                server_url
            )));
        }

        self.store
            .delete_other_creds(server_url)
            .await
            .map_err(|e| {
                HelperError::context(
                    format!("could not delete 3p credentials for {}", server_url),
                    e,
                )
            })?;

        tracing::debug!("Deleted credentials for {}", server_url);
        Ok(())
    }

    /// Username and secret for a registry.
    ///
    /// For a privileged registry the secret is a freshly resolved access
    /// token. Otherwise the store is consulted; its not-found error is
    /// returned unwrapped so that [`HelperError::is_not_found`] holds.
    pub async fn get(&self, server_url: &str) -> Result<(String, Secret), HelperError> {
        if self.is_privileged(server_url) {
            let token = self.resolver.resolve_access_token().await.map_err(|e| {
                HelperError::context(format!("could not retrieve {}'s access token", server_url), e)
            })?;
            return Ok((GCR_OAUTH2_USERNAME.to_string(), Secret::new(token)));
        }

        match self.store.get_other_creds(server_url).await {
            Ok(creds) => Ok((creds.username, creds.secret)),
            Err(e) if e.is_not_found() => Err(HelperError::Store(e)),
            Err(e) => Err(HelperError::context(
                format!("could not retrieve 3p credentials for {}", server_url),
                e,
            )),
        }
    }
}

impl std::fmt::Debug for CredentialHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHelper")
            .field("registries", &self.registries.len())
            .field("resolver", &self.resolver)
            .finish()
    }
}
