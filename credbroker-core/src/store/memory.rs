//! In-memory store implementations.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{CredStore, Secret, SecretStore, StoreError};
use crate::model::{Credentials, GcrAuth};

/// In-memory credential store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryCredStore {
    other: RwLock<HashMap<String, Credentials>>,
    gcr_auth: RwLock<Option<GcrAuth>>,
}

impl MemoryCredStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            other: RwLock::new(HashMap::new()),
            gcr_auth: RwLock::new(None),
        }
    }

    /// Create a memory store with initial third-party credentials.
    pub fn with_creds(creds: impl IntoIterator<Item = Credentials>) -> Self {
        let other = creds
            .into_iter()
            .map(|c| (c.server_url.clone(), c))
            .collect();
        Self {
            other: RwLock::new(other),
            gcr_auth: RwLock::new(None),
        }
    }

    /// Set the GCR auth material returned by [`CredStore::get_gcr_auth`].
    pub fn set_gcr_auth(&self, auth: GcrAuth) -> Result<(), StoreError> {
        let mut slot = self.gcr_auth.write().map_err(lock_error)?;
        *slot = Some(auth);
        Ok(())
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::BackendError {
        message: format!("lock poisoned: {}", e),
    }
}

impl Default for MemoryCredStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.other.read().map(|d| d.len()).unwrap_or(0);
        let has_gcr_auth = self.gcr_auth.read().map(|a| a.is_some()).unwrap_or(false);
        f.debug_struct("MemoryCredStore")
            .field("third_party_count", &count)
            .field("has_gcr_auth", &has_gcr_auth)
            .finish()
    }
}

#[async_trait]
impl CredStore for MemoryCredStore {
    async fn all_third_party_creds(&self) -> Result<HashMap<String, Credentials>, StoreError> {
        let data = self.other.read().map_err(lock_error)?;
        Ok(data.clone())
    }

    async fn set_other_creds(&self, creds: &Credentials) -> Result<(), StoreError> {
        let mut data = self.other.write().map_err(lock_error)?;
        data.insert(creds.server_url.clone(), creds.clone());
        Ok(())
    }

    async fn get_other_creds(&self, server_url: &str) -> Result<Credentials, StoreError> {
        let data = self.other.read().map_err(lock_error)?;
        data.get(server_url)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                server_url: server_url.to_string(),
            })
    }

    async fn delete_other_creds(&self, server_url: &str) -> Result<(), StoreError> {
        let mut data = self.other.write().map_err(lock_error)?;
        data.remove(server_url);
        Ok(())
    }

    async fn get_gcr_auth(&self) -> Result<GcrAuth, StoreError> {
        let slot = self.gcr_auth.read().map_err(lock_error)?;
        slot.clone().ok_or(StoreError::NoGcrAuth)
    }
}

/// In-memory [`SecretStore`] for testing.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .secrets
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("count", &self.keys().len())
            .finish()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        let secrets = self.secrets.read().map_err(lock_error)?;
        Ok(secrets.get(key).cloned())
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        let mut secrets = self.secrets.write().map_err(lock_error)?;
        secrets.insert(key.to_string(), secret.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut secrets = self.secrets.write().map_err(lock_error)?;
        secrets.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get() {
        let store = MemoryCredStore::new();
        let creds = Credentials::new("https://ghcr.io", "octocat", "hunter2");

        store.set_other_creds(&creds).await.unwrap();
        let retrieved = store.get_other_creds("https://ghcr.io").await.unwrap();

        assert_eq!(retrieved.username, "octocat");
        assert_eq!(retrieved.secret.expose(), "hunter2");
    }

    #[tokio::test]
    async fn test_memory_store_get_nonexistent() {
        let store = MemoryCredStore::new();
        let result = store.get_other_creds("nonexistent").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryCredStore::with_creds([Credentials::new("quay.io", "robot", "pw")]);

        store.delete_other_creds("quay.io").await.unwrap();

        let result = store.get_other_creds("quay.io").await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_memory_store_all_third_party_creds() {
        let store = MemoryCredStore::with_creds([
            Credentials::new("quay.io", "robot", "pw"),
            Credentials::new("https://ghcr.io", "octocat", "hunter2"),
        ]);

        let all = store.all_third_party_creds().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["quay.io"].username, "robot");
    }

    #[tokio::test]
    async fn test_memory_store_gcr_auth() {
        let store = MemoryCredStore::new();
        assert!(matches!(
            store.get_gcr_auth().await,
            Err(StoreError::NoGcrAuth)
        ));

        store.set_gcr_auth(GcrAuth::new("client", "refresh")).unwrap();
        let auth = store.get_gcr_auth().await.unwrap();
        assert_eq!(auth.client_id, "client");
    }

    #[tokio::test]
    async fn test_memory_secret_store() {
        let store = MemorySecretStore::new();
        assert!(store.get("registry/quay.io").await.unwrap().is_none());

        store
            .set("registry/quay.io", &Secret::new("pw"))
            .await
            .unwrap();
        assert_eq!(
            store.get("registry/quay.io").await.unwrap().unwrap().expose(),
            "pw"
        );
        assert_eq!(store.keys(), vec!["registry/quay.io"]);

        store.delete("registry/quay.io").await.unwrap();
        store.delete("registry/quay.io").await.unwrap();
        assert!(store.keys().is_empty());
    }
}
