//! OS keyring-backed secret storage.

use async_trait::async_trait;
use keyring::Entry;

use super::{Secret, SecretStore, StoreError};

/// Service name credbroker registers its keyring entries under.
pub const KEYRING_SERVICE: &str = "credbroker";

/// Secret store using the platform's native keyring:
/// - macOS: Keychain
/// - Linux: kernel keyutils
/// - Windows: Credential Manager
///
/// Each key becomes one entry with the store's service name and the key as
/// the entry's user.
pub struct KeyringSecretStore {
    service_name: String,
}

impl KeyringSecretStore {
    /// Keyring store under [`KEYRING_SERVICE`].
    pub fn try_default() -> Result<Self, StoreError> {
        Self::try_new(KEYRING_SERVICE)
    }

    /// Try to create a keyring store.
    ///
    /// Returns [`StoreError::KeyringUnavailable`] if no keyring backend can
    /// be reached on this platform.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        match Entry::new(service_name, "__availability_check__") {
            Ok(_) => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Err(e) => Err(StoreError::KeyringUnavailable {
                message: e.to_string(),
            }),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, key).map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

impl std::fmt::Debug for KeyringSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringSecretStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(password) => Ok(Some(Secret::new(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::Ambiguous(_)) => Err(StoreError::BackendError {
                message: format!("ambiguous keyring entry for {}", key),
            }),
            Err(e) => Err(StoreError::BackendError {
                message: format!("keyring error: {}", e),
            }),
        }
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(secret.expose())
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to set keyring password: {}", e),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only touch the real keyring when one is reachable, and skip
    // otherwise (headless CI).

    #[tokio::test]
    async fn test_keyring_round_trip_when_available() {
        let store = match KeyringSecretStore::try_new("credbroker-test") {
            Ok(s) => s,
            Err(_) => {
                eprintln!("Skipping: keyring unavailable");
                return;
            }
        };

        let key = format!(
            "test/{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );

        if let Err(e) = store.set(&key, &Secret::new("value")).await {
            eprintln!("Skipping: keyring set failed ({})", e);
            return;
        }

        match store.get(&key).await {
            Ok(Some(secret)) => assert_eq!(secret.expose(), "value"),
            Ok(None) | Err(_) => {
                eprintln!("Skipping: keyring did not persist the entry");
                let _ = store.delete(&key).await;
                return;
            }
        }

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        // Idempotent.
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_keyring_get_missing_when_available() {
        let store = match KeyringSecretStore::try_new("credbroker-test-missing") {
            Ok(s) => s,
            Err(_) => return,
        };

        if let Ok(result) = store.get("registry/never-stored").await {
            assert!(result.is_none());
        }
    }
}
