//! Ordered token resolution.
//!
//! [`TokenResolver`] walks a token source list and returns the token of the
//! first strategy that succeeds. Strategies run one at a time in list order;
//! once one succeeds the rest are never attempted.
//!
//! When every attempted strategy fails, only the last error is returned.
//! Earlier failures are logged at `debug` level.
//!
//! # Example
//!
//! ```rust,ignore
//! use credbroker_core::{TokenResolver, MemoryCredStore};
//! use std::sync::Arc;
//!
//! let resolver = TokenResolver::from_env(Arc::new(MemoryCredStore::new()), vec![
//!     "env".to_string(),
//!     "gcloud_sdk".to_string(),
//! ]);
//! let token = resolver.resolve_access_token().await?;
//! ```

use std::sync::Arc;

use crate::error::HelperError;
use crate::model::TokenSourceKind;
use crate::source::{EnvToken, GcloudSdkToken, StoreToken, TokenStrategy};
use crate::store::CredStore;

/// Runs token strategies in a configured order.
pub struct TokenResolver {
    sources: Vec<String>,
    env: Box<dyn TokenStrategy>,
    gcloud_sdk: Box<dyn TokenStrategy>,
    store: Box<dyn TokenStrategy>,
}

impl TokenResolver {
    /// Create a resolver with explicit strategies.
    pub fn new(
        sources: Vec<String>,
        env: Box<dyn TokenStrategy>,
        gcloud_sdk: Box<dyn TokenStrategy>,
        store: Box<dyn TokenStrategy>,
    ) -> Self {
        Self {
            sources,
            env,
            gcloud_sdk,
            store,
        }
    }

    /// Create a resolver with the standard strategies.
    pub fn from_env(cred_store: Arc<dyn CredStore>, sources: Vec<String>) -> Self {
        Self::new(
            sources,
            Box::new(EnvToken::from_env()),
            Box::new(GcloudSdkToken::new()),
            Box::new(StoreToken::with_refresh_exchange(cred_store)),
        )
    }

    /// Replace the gcloud strategy, e.g. to wrap it in a timeout.
    pub fn with_gcloud_sdk(mut self, strategy: Box<dyn TokenStrategy>) -> Self {
        self.gcloud_sdk = strategy;
        self
    }

    /// The configured source order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Resolve a token using the configured source order.
    pub async fn resolve_access_token(&self) -> Result<String, HelperError> {
        self.resolve(&self.sources).await
    }

    /// Resolve a token trying `sources` in order.
    ///
    /// An unrecognized identifier fails immediately, even if an earlier
    /// source failed. An empty list fails with
    /// [`HelperError::NoTokenSources`].
    pub async fn resolve(&self, sources: &[String]) -> Result<String, HelperError> {
        let mut last_error = HelperError::NoTokenSources;

        for source in sources {
            let kind: TokenSourceKind =
                source
                    .parse()
                    .map_err(|source_id| HelperError::UnknownTokenSource { source_id })?;

            match self.strategy(kind).access_token().await {
                Ok(token) => {
                    tracing::info!("Obtained access token from {} source", kind);
                    return Ok(token);
                }
                Err(e) => {
                    tracing::debug!("Token source {} failed: {}", kind, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn strategy(&self, kind: TokenSourceKind) -> &dyn TokenStrategy {
        match kind {
            TokenSourceKind::Env => self.env.as_ref(),
            TokenSourceKind::GcloudSdk => self.gcloud_sdk.as_ref(),
            TokenSourceKind::Store => self.store.as_ref(),
        }
    }
}

impl std::fmt::Debug for TokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResolver")
            .field("sources", &self.sources)
            .finish()
    }
}
