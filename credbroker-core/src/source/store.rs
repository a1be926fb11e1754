//! Private credential store token source.

use async_trait::async_trait;
use std::sync::Arc;

use super::TokenStrategy;
use crate::error::HelperError;
use crate::oauth::{RefreshTokenExchange, TokenExchange};
use crate::store::CredStore;

/// Exchanges the GCR auth material held in the credential store for an
/// access token.
///
/// Only validity is checked; the token type is not.
pub struct StoreToken {
    store: Arc<dyn CredStore>,
    exchange: Arc<dyn TokenExchange>,
}

impl StoreToken {
    pub fn new(store: Arc<dyn CredStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self { store, exchange }
    }

    /// Use the OAuth2 refresh-token grant.
    pub fn with_refresh_exchange(store: Arc<dyn CredStore>) -> Self {
        Self::new(store, Arc::new(RefreshTokenExchange))
    }
}

#[async_trait]
impl TokenStrategy for StoreToken {
    async fn access_token(&self) -> Result<String, HelperError> {
        let auth = self.store.get_gcr_auth().await?;
        let token = self.exchange.token_source(auth).token().await?;

        if !token.is_valid() {
            return Err(HelperError::invalid_token("token was invalid"));
        }

        Ok(token.access_token.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GcrAuth;
    use crate::store::{MemoryCredStore, StoreError};
    use crate::token::{AccessToken, TokenError, TokenSource};

    struct FixedSource(AccessToken);

    #[async_trait]
    impl TokenSource for FixedSource {
        async fn token(&self) -> Result<AccessToken, TokenError> {
            Ok(self.0.clone())
        }
    }

    /// Hands out a fixed token, checking it was given the stored material.
    struct FixedExchange(AccessToken);

    impl TokenExchange for FixedExchange {
        fn token_source(&self, auth: GcrAuth) -> Box<dyn TokenSource> {
            assert_eq!(auth.refresh_token.expose(), "stored-refresh");
            Box::new(FixedSource(self.0.clone()))
        }
    }

    fn store_with_auth() -> Arc<MemoryCredStore> {
        let store = Arc::new(MemoryCredStore::new());
        store
            .set_gcr_auth(GcrAuth::new("client", "stored-refresh"))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_exchanges_stored_auth() {
        let strategy = StoreToken::new(
            store_with_auth(),
            Arc::new(FixedExchange(AccessToken::new("ya29.store").expires_in(600))),
        );

        assert_eq!(strategy.access_token().await.unwrap(), "ya29.store");
    }

    #[tokio::test]
    async fn test_token_type_not_checked() {
        let strategy = StoreToken::new(
            store_with_auth(),
            Arc::new(FixedExchange(AccessToken::new("ya29.mac").with_token_type("MAC"))),
        );

        assert_eq!(strategy.access_token().await.unwrap(), "ya29.mac");
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let strategy = StoreToken::new(
            store_with_auth(),
            Arc::new(FixedExchange(AccessToken::new(""))),
        );

        let err = strategy.access_token().await.unwrap_err();
        assert!(matches!(err, HelperError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_missing_auth_passes_through() {
        let strategy = StoreToken::new(
            Arc::new(MemoryCredStore::new()),
            Arc::new(FixedExchange(AccessToken::new("unused"))),
        );

        let err = strategy.access_token().await.unwrap_err();
        assert!(matches!(err, HelperError::Store(StoreError::NoGcrAuth)));
    }
}
