//! Credential store keeping an index on disk and secrets in a [`SecretStore`].
//!
//! The index (`index.json` in the platform data directory) records which
//! server URLs have credentials, their usernames, and the non-secret half of
//! the GCR auth record. Passwords, the refresh token and the client secret
//! live in the secret store under these keys:
//!
//! - `registry/{server_url}` - third-party registry secret
//! - `gcr/refresh_token` - GCR refresh token
//! - `gcr/client_secret` - GCR OAuth client secret, if any
//!
//! Keyring backends cannot enumerate their entries, so the index is what
//! `all_third_party_creds` walks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::file::write_owner_only;
use super::{CredStore, KeyringSecretStore, Secret, SecretStore, StoreError};
use crate::model::{Credentials, GcrAuth};

const REFRESH_TOKEN_KEY: &str = "gcr/refresh_token";
const CLIENT_SECRET_KEY: &str = "gcr/client_secret";

fn registry_key(server_url: &str) -> String {
    format!("registry/{}", server_url)
}

/// Non-secret half of a [`GcrAuth`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GcrAuthEntry {
    client_id: String,
    token_url: String,
    #[serde(default)]
    has_client_secret: bool,
}

/// On-disk index format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredIndex {
    version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    gcr_auth: Option<GcrAuthEntry>,

    /// Server URL to username.
    #[serde(default)]
    registries: BTreeMap<String, String>,
}

impl Default for CredIndex {
    fn default() -> Self {
        Self {
            version: 1,
            gcr_auth: None,
            registries: BTreeMap::new(),
        }
    }
}

/// Default credential store: JSON index plus OS keyring.
///
/// Secrets are written to the secret store before the index records them
/// and dropped from the index before the secret store forgets them, so the
/// index never names a secret that was never written.
pub struct KeyringCredStore {
    path: PathBuf,
    index: RwLock<CredIndex>,
    secrets: Arc<dyn SecretStore>,
}

impl KeyringCredStore {
    /// Get the default index path.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("com", "credbroker", "credbroker")
            .ok_or(StoreError::DataDirUnavailable)?;

        Ok(dirs.data_dir().join("index.json"))
    }

    /// Load the index from the default location with secrets in the OS
    /// keyring.
    pub fn load() -> Result<Self, StoreError> {
        Self::load_from_path(
            Self::default_path()?,
            Arc::new(KeyringSecretStore::try_default()?),
        )
    }

    /// Load the index from `path`, keeping secrets in `secrets`.
    ///
    /// Creates parent directories if they don't exist. A missing index is an
    /// empty store.
    pub fn load_from_path(
        path: impl Into<PathBuf>,
        secrets: Arc<dyn SecretStore>,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let index = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            CredIndex::default()
        };

        tracing::debug!("Loaded credential index from {:?}", path);

        Ok(Self {
            path,
            index: RwLock::new(index),
            secrets,
        })
    }

    /// Get the index path for this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist GCR auth material for the private-store token source.
    pub async fn set_gcr_auth(&self, auth: GcrAuth) -> Result<(), StoreError> {
        self.secrets
            .set(REFRESH_TOKEN_KEY, &auth.refresh_token)
            .await?;
        match &auth.client_secret {
            Some(secret) => self.secrets.set(CLIENT_SECRET_KEY, secret).await?,
            None => self.secrets.delete(CLIENT_SECRET_KEY).await?,
        }

        let entry = GcrAuthEntry {
            has_client_secret: auth.client_secret.is_some(),
            client_id: auth.client_id,
            token_url: auth.token_url,
        };
        self.update(|index| {
            index.gcr_auth = Some(entry);
            true
        })
    }

    /// Remove any stored GCR auth material.
    pub async fn clear_gcr_auth(&self) -> Result<(), StoreError> {
        self.update(|index| index.gcr_auth.take().is_some())?;
        self.secrets.delete(REFRESH_TOKEN_KEY).await?;
        self.secrets.delete(CLIENT_SECRET_KEY).await
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, CredIndex>, StoreError> {
        self.index.read().map_err(|e| StoreError::BackendError {
            message: format!("read lock poisoned: {}", e),
        })
    }

    /// Apply `change` to a copy of the index and persist it; the cached
    /// index is only replaced once the write succeeds.
    fn update(&self, change: impl FnOnce(&mut CredIndex) -> bool) -> Result<(), StoreError> {
        let mut guard = self.index.write().map_err(|e| StoreError::BackendError {
            message: format!("write lock poisoned: {}", e),
        })?;

        let mut next = guard.clone();
        if !change(&mut next) {
            return Ok(());
        }

        write_owner_only(&self.path, &serde_json::to_string_pretty(&next)?)?;
        *guard = next;
        Ok(())
    }

    async fn required_secret(&self, key: &str) -> Result<Secret, StoreError> {
        self.secrets
            .get(key)
            .await?
            .ok_or_else(|| StoreError::BackendError {
                message: format!("secret {} is indexed but missing from the secret store", key),
            })
    }
}

impl std::fmt::Debug for KeyringCredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringCredStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl CredStore for KeyringCredStore {
    async fn all_third_party_creds(&self) -> Result<HashMap<String, Credentials>, StoreError> {
        let registries = self.read()?.registries.clone();

        let mut all = HashMap::with_capacity(registries.len());
        for (server_url, username) in registries {
            let secret = self.required_secret(&registry_key(&server_url)).await?;
            all.insert(
                server_url.clone(),
                Credentials {
                    server_url,
                    username,
                    secret,
                },
            );
        }
        Ok(all)
    }

    async fn set_other_creds(&self, creds: &Credentials) -> Result<(), StoreError> {
        self.secrets
            .set(&registry_key(&creds.server_url), &creds.secret)
            .await?;

        self.update(|index| {
            index
                .registries
                .insert(creds.server_url.clone(), creds.username.clone());
            true
        })
    }

    async fn get_other_creds(&self, server_url: &str) -> Result<Credentials, StoreError> {
        let username = self.read()?.registries.get(server_url).cloned();
        let username = username.ok_or_else(|| StoreError::NotFound {
            server_url: server_url.to_string(),
        })?;

        let secret = self.required_secret(&registry_key(server_url)).await?;
        Ok(Credentials {
            server_url: server_url.to_string(),
            username,
            secret,
        })
    }

    async fn delete_other_creds(&self, server_url: &str) -> Result<(), StoreError> {
        self.update(|index| index.registries.remove(server_url).is_some())?;
        self.secrets.delete(&registry_key(server_url)).await
    }

    async fn get_gcr_auth(&self) -> Result<GcrAuth, StoreError> {
        let entry = self.read()?.gcr_auth.clone().ok_or(StoreError::NoGcrAuth)?;

        let refresh_token = self.required_secret(REFRESH_TOKEN_KEY).await?;
        let client_secret = if entry.has_client_secret {
            Some(self.required_secret(CLIENT_SECRET_KEY).await?)
        } else {
            None
        };

        Ok(GcrAuth {
            client_id: entry.client_id,
            client_secret,
            refresh_token,
            token_url: entry.token_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySecretStore;
    use tempfile::TempDir;

    fn test_store() -> (KeyringCredStore, Arc<MemorySecretStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let secrets = Arc::new(MemorySecretStore::new());
        let store =
            KeyringCredStore::load_from_path(temp_dir.path().join("index.json"), secrets.clone())
                .unwrap();
        (store, secrets, temp_dir)
    }

    /// Secret store whose writes always fail.
    struct ReadOnlySecrets;

    #[async_trait]
    impl SecretStore for ReadOnlySecrets {
        async fn get(&self, _key: &str) -> Result<Option<Secret>, StoreError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _secret: &Secret) -> Result<(), StoreError> {
            Err(StoreError::BackendError {
                message: "keyring locked".to_string(),
            })
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_secret_never_reaches_index_file() {
        let (store, secrets, _temp) = test_store();
        store
            .set_other_creds(&Credentials::new("quay.io", "robot", "hunter2"))
            .await
            .unwrap();

        let on_disk = fs::read_to_string(store.path()).unwrap();
        assert!(on_disk.contains("robot"));
        assert!(!on_disk.contains("hunter2"));

        assert_eq!(secrets.keys(), vec!["registry/quay.io"]);
        let creds = store.get_other_creds("quay.io").await.unwrap();
        assert_eq!(creds.username, "robot");
        assert_eq!(creds.secret.expose(), "hunter2");
    }

    #[tokio::test]
    async fn test_index_persists_across_loads() {
        let (store, secrets, _temp) = test_store();
        store
            .set_other_creds(&Credentials::new("https://ghcr.io", "octocat", "pw"))
            .await
            .unwrap();

        let reloaded = KeyringCredStore::load_from_path(store.path(), secrets).unwrap();
        let all = reloaded.all_third_party_creds().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all["https://ghcr.io"].username, "octocat");
        assert_eq!(all["https://ghcr.io"].secret.expose(), "pw");
    }

    #[tokio::test]
    async fn test_get_unindexed_is_not_found() {
        let (store, _secrets, _temp) = test_store();
        let err = store.get_other_creds("quay.io").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_index_entry_and_secret() {
        let (store, secrets, _temp) = test_store();
        store
            .set_other_creds(&Credentials::new("quay.io", "robot", "pw"))
            .await
            .unwrap();

        store.delete_other_creds("quay.io").await.unwrap();
        store.delete_other_creds("quay.io").await.unwrap();

        assert!(secrets.keys().is_empty());
        assert!(store.get_other_creds("quay.io").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_missing_secret_is_backend_error() {
        let (store, secrets, _temp) = test_store();
        store
            .set_other_creds(&Credentials::new("quay.io", "robot", "pw"))
            .await
            .unwrap();
        secrets.delete("registry/quay.io").await.unwrap();

        let err = store.get_other_creds("quay.io").await.unwrap_err();
        assert!(matches!(err, StoreError::BackendError { .. }));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_failed_secret_write_leaves_index_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        let store = KeyringCredStore::load_from_path(&path, Arc::new(ReadOnlySecrets)).unwrap();

        let result = store
            .set_other_creds(&Credentials::new("quay.io", "robot", "pw"))
            .await;

        assert!(matches!(result, Err(StoreError::BackendError { .. })));
        assert!(!path.exists());
        assert!(store.get_other_creds("quay.io").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_gcr_auth_split_between_index_and_secrets() {
        let (store, secrets, _temp) = test_store();
        store
            .set_gcr_auth(
                GcrAuth::new("client-id", "refresh-value")
                    .with_client_secret("client-secret-value")
                    .with_token_url("https://example.test/token"),
            )
            .await
            .unwrap();

        let on_disk = fs::read_to_string(store.path()).unwrap();
        assert!(on_disk.contains("client-id"));
        assert!(!on_disk.contains("refresh-value"));
        assert!(!on_disk.contains("client-secret-value"));
        assert_eq!(secrets.keys(), vec!["gcr/client_secret", "gcr/refresh_token"]);

        let auth = store.get_gcr_auth().await.unwrap();
        assert_eq!(auth.refresh_token.expose(), "refresh-value");
        assert_eq!(auth.client_secret.unwrap().expose(), "client-secret-value");
        assert_eq!(auth.token_url, "https://example.test/token");

        store.clear_gcr_auth().await.unwrap();
        assert!(matches!(store.get_gcr_auth().await, Err(StoreError::NoGcrAuth)));
        assert!(secrets.keys().is_empty());
    }

    #[tokio::test]
    async fn test_gcr_auth_without_client_secret() {
        let (store, _secrets, _temp) = test_store();
        store
            .set_gcr_auth(GcrAuth::new("public-client", "refresh"))
            .await
            .unwrap();

        let auth = store.get_gcr_auth().await.unwrap();
        assert!(auth.client_secret.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_index_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _secrets, _temp) = test_store();
        store
            .set_other_creds(&Credentials::new("quay.io", "robot", "pw"))
            .await
            .unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
