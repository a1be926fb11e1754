//! # credbroker core
//!
//! Core library for a docker credential helper specialised for Google
//! Container Registry and Artifact Registry.
//!
//! This crate provides:
//! - [`RegistrySet`] - Classifies server URLs as privileged registries
//! - [`TokenResolver`] - Ordered fallback across token sources
//! - [`source`] - The `env`, `gcloud_sdk` and `store` token strategies
//! - [`CredentialHelper`] - The list/add/delete/get façade
//! - [`CredStore`] - Trait for the credential persistence layer, with a
//!   keyring-backed default plus in-memory and plaintext file implementations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use credbroker_core::{CredentialHelper, KeyringCredStore, RegistrySet, default_token_sources};
//! use std::sync::Arc;
//!
//! async fn docker_get(server_url: &str) -> Result<(String, String), credbroker_core::HelperError> {
//!     let store = Arc::new(KeyringCredStore::load()?);
//!     let helper = CredentialHelper::with_sources(
//!         store,
//!         RegistrySet::gcr_defaults(),
//!         default_token_sources(),
//!     );
//!     let (username, secret) = helper.get(server_url).await?;
//!     Ok((username, secret.into_inner()))
//! }
//! ```

pub mod error;
pub mod helper;
pub mod model;
pub mod oauth;
pub mod registry;
pub mod resolve;
pub mod source;
pub mod store;
pub mod token;

// Re-export commonly used types at crate root
pub use model::{
    Credentials,
    DEFAULT_TOKEN_SOURCES,
    GCR_OAUTH2_USERNAME,
    GcrAuth,
    TokenSourceKind,
    default_token_sources,
};

pub use store::{
    CredStore,
    FileCredStore,
    KeyringCredStore,
    KeyringSecretStore,
    MemoryCredStore,
    MemorySecretStore,
    Secret,
    SecretStore,
    StoreError,
};

pub use token::{
    AccessToken,
    TokenError,
    TokenSource,
};

pub use source::{
    EnvToken,
    GcloudSdkToken,
    StoreToken,
    Timeout,
    TokenStrategy,
};

pub use error::HelperError;
pub use helper::CredentialHelper;
pub use registry::RegistrySet;
pub use resolve::TokenResolver;
