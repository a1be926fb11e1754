//! Credential store abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredStore`] - Trait for the persistence layer behind the helper
//! - [`SecretStore`] - Trait for key/value secret backends
//! - [`KeyringCredStore`] - JSON index with secrets in a [`SecretStore`]
//!   (the OS keyring by default)
//! - [`KeyringSecretStore`] - OS keyring-backed [`SecretStore`]
//! - [`MemoryCredStore`] / [`MemorySecretStore`] - In-memory implementations
//!   for testing
//! - [`FileCredStore`] - Plaintext JSON file implementation (opt-in)
//!
//! The store holds two kinds of material: third-party registry logins
//! ([`Credentials`]) keyed by server URL, and the single [`GcrAuth`] record
//! used by the private-store token source.
//!
//! # Example
//!
//! ```rust,ignore
//! use credbroker_core::store::{CredStore, MemoryCredStore};
//! use credbroker_core::Credentials;
//!
//! let store = MemoryCredStore::new();
//! store.set_other_creds(&Credentials::new("https://ghcr.io", "octocat", "hunter2")).await?;
//!
//! let creds = store.get_other_creds("https://ghcr.io").await?;
//! assert_eq!(creds.secret.expose(), "hunter2");
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::{Credentials, GcrAuth};

mod file;
mod index;
mod os_keyring;
mod memory;

pub use file::FileCredStore;
pub use index::KeyringCredStore;
pub use os_keyring::KeyringSecretStore;
pub use memory::{MemoryCredStore, MemorySecretStore};

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }

    /// Whether the secret holds an empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No credentials are stored for the requested server.
    ///
    /// Callers special-case this variant, so it must reach them unwrapped.
    #[error("credentials not found in native keychain")]
    NotFound { server_url: String },

    /// No GCR auth material has been stored.
    #[error("no GCR auth material stored")]
    NoGcrAuth,

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// I/O error reading or writing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Platform data directory not available.
    #[error("data directory not available")]
    DataDirUnavailable,

    /// The OS keyring backend is not available.
    #[error("keyring unavailable: {message}")]
    KeyringUnavailable { message: String },
}

impl StoreError {
    /// Whether this is the "no record for this server" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Persistence layer consulted by the credential helper.
///
/// Implementations provide their own interior synchronisation; the helper
/// calls them from one task at a time.
#[async_trait]
pub trait CredStore: Send + Sync {
    /// All stored third-party credentials, keyed by server URL.
    async fn all_third_party_creds(&self) -> Result<HashMap<String, Credentials>, StoreError>;

    /// Store third-party credentials, replacing any previous entry for the server.
    async fn set_other_creds(&self, creds: &Credentials) -> Result<(), StoreError>;

    /// Retrieve third-party credentials for a server.
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored.
    async fn get_other_creds(&self, server_url: &str) -> Result<Credentials, StoreError>;

    /// Remove third-party credentials for a server.
    async fn delete_other_creds(&self, server_url: &str) -> Result<(), StoreError>;

    /// Retrieve the stored GCR auth material.
    async fn get_gcr_auth(&self) -> Result<GcrAuth, StoreError>;
}

/// Key/value storage for secret material.
///
/// Keys are plain strings such as `registry/https://ghcr.io`. Backends need
/// not support enumeration; callers keep their own index of keys.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieve a secret, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a secret, replacing any previous value.
    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    /// Delete a secret. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
