//! Plaintext JSON file credential store.
//!
//! Credentials, secrets included, are stored at `credentials.json` in the
//! platform data directory (`~/.local/share/credbroker/` on Linux). The file
//! is written with owner-only permissions on Unix but is not encrypted; the
//! keyring-backed [`KeyringCredStore`](super::KeyringCredStore) is the
//! default and this store is an explicit opt-in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::{CredStore, StoreError};
use crate::model::{Credentials, GcrAuth};

/// On-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredStoreData {
    /// Version of the store format (for future migrations).
    version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    gcr_auth: Option<GcrAuth>,

    #[serde(default)]
    other_credentials: HashMap<String, Credentials>,
}

impl Default for CredStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            gcr_auth: None,
            other_credentials: HashMap::new(),
        }
    }
}

/// Disk-backed credential store.
///
/// The whole file is cached in memory on load and rewritten after every
/// mutation. A mutation only reaches the cache once the file write has
/// succeeded.
pub struct FileCredStore {
    path: PathBuf,
    data: Arc<RwLock<CredStoreData>>,
}

impl FileCredStore {
    /// Get the default storage path.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("com", "credbroker", "credbroker")
            .ok_or(StoreError::DataDirUnavailable)?;

        Ok(dirs.data_dir().join("credentials.json"))
    }

    /// Load the store from the default location.
    pub fn load() -> Result<Self, StoreError> {
        let path = Self::default_path()?;
        Self::load_from_path(path)
    }

    /// Load the store from a specific path.
    ///
    /// Creates parent directories if they don't exist. A missing file is an
    /// empty store; it is only written on the first mutation.
    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            CredStoreData::default()
        };

        tracing::debug!("Loaded credential store from {:?}", path);

        Ok(Self {
            path,
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Get the storage path for this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist GCR auth material for the private-store token source.
    pub fn set_gcr_auth(&self, auth: GcrAuth) -> Result<(), StoreError> {
        self.update(|data| {
            data.gcr_auth = Some(auth);
            true
        })
    }

    /// Remove any stored GCR auth material.
    pub fn clear_gcr_auth(&self) -> Result<(), StoreError> {
        self.update(|data| data.gcr_auth.take().is_some())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, CredStoreData>, StoreError> {
        self.data.read().map_err(|e| StoreError::BackendError {
            message: format!("read lock poisoned: {}", e),
        })
    }

    /// Apply `change` to a copy of the data and persist it.
    ///
    /// `change` returns whether anything changed; unchanged data is not
    /// rewritten. The write lock is held across the save.
    fn update(&self, change: impl FnOnce(&mut CredStoreData) -> bool) -> Result<(), StoreError> {
        let mut guard = self.data.write().map_err(|e| StoreError::BackendError {
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
}

/// Replace `path` with `contents`, readable only by the owner on Unix.
///
/// The data goes to a sibling temporary file created with mode 0600 and is
/// then renamed over `path`, so the target never holds partial content or
/// wider permissions.
pub(super) fn write_owner_only(path: &Path, contents: &str) -> Result<(), StoreError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    match fs::remove_file(&tmp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

impl std::fmt::Debug for FileCredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl CredStore for FileCredStore {
    async fn all_third_party_creds(&self) -> Result<HashMap<String, Credentials>, StoreError> {
        Ok(self.read()?.other_credentials.clone())
    }

    async fn set_other_creds(&self, creds: &Credentials) -> Result<(), StoreError> {
        self.update(|data| {
            data.other_credentials
                .insert(creds.server_url.clone(), creds.clone());
            true
        })
    }

    async fn get_other_creds(&self, server_url: &str) -> Result<Credentials, StoreError> {
        self.read()?
            .other_credentials
            .get(server_url)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                server_url: server_url.to_string(),
            })
    }

    async fn delete_other_creds(&self, server_url: &str) -> Result<(), StoreError> {
        self.update(|data| data.other_credentials.remove(server_url).is_some())
    }

    async fn get_gcr_auth(&self) -> Result<GcrAuth, StoreError> {
        self.read()?.gcr_auth.clone().ok_or(StoreError::NoGcrAuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (FileCredStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credentials.json");
        let store = FileCredStore::load_from_path(path).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let (store, _temp) = test_store();

        assert!(store.all_third_party_creds().await.unwrap().is_empty());
        assert!(!store.path().exists());
        assert!(matches!(
            store.get_gcr_auth().await,
            Err(StoreError::NoGcrAuth)
        ));
    }

    #[tokio::test]
    async fn test_persists_across_loads() {
        let (store, _temp) = test_store();
        store
            .set_other_creds(&Credentials::new("quay.io", "robot", "pw"))
            .await
            .unwrap();
        store
            .set_gcr_auth(GcrAuth::new("client", "refresh").with_client_secret("shh"))
            .unwrap();

        let reloaded = FileCredStore::load_from_path(store.path()).unwrap();
        let creds = reloaded.get_other_creds("quay.io").await.unwrap();
        assert_eq!(creds.username, "robot");
        assert_eq!(creds.secret.expose(), "pw");

        let auth = reloaded.get_gcr_auth().await.unwrap();
        assert_eq!(auth.client_secret.unwrap().expose(), "shh");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (store, _temp) = test_store();
        let err = store.get_other_creds("quay.io").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let (store, _temp) = test_store();
        store
            .set_other_creds(&Credentials::new("quay.io", "robot", "pw"))
            .await
            .unwrap();

        store.delete_other_creds("quay.io").await.unwrap();
        // Deleting again is a no-op.
        store.delete_other_creds("quay.io").await.unwrap();

        let reloaded = FileCredStore::load_from_path(store.path()).unwrap();
        assert!(reloaded.all_third_party_creds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_gcr_auth() {
        let (store, _temp) = test_store();
        store.set_gcr_auth(GcrAuth::new("client", "refresh")).unwrap();
        store.clear_gcr_auth().unwrap();

        assert!(store.get_gcr_auth().await.is_err());
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credentials.json");
        fs::write(&path, "not json").unwrap();

        let result = FileCredStore::load_from_path(path);
        assert!(matches!(result, Err(StoreError::SerializationError(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _temp) = test_store();
        store
            .set_other_creds(&Credentials::new("quay.io", "robot", "pw"))
            .await
            .unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_replaces_loose_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credentials.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_owner_only(&path, "{\"version\": 1}").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"version\": 1}");
        assert!(!temp_dir.path().join("credentials.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("store");
        let store = FileCredStore::load_from_path(dir.join("credentials.json")).unwrap();

        // Replace the store directory with a plain file so the write fails.
        fs::remove_dir(&dir).unwrap();
        fs::write(&dir, "").unwrap();

        let result = store
            .set_other_creds(&Credentials::new("quay.io", "robot", "pw"))
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));

        let err = store.get_other_creds("quay.io").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.set_gcr_auth(GcrAuth::new("client", "refresh")).is_err());
        assert!(store.get_gcr_auth().await.is_err());
    }
}
