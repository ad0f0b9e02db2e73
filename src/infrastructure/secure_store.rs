//! Namespaced secure storage for auth tokens.
//!
//! Keys are prefixed with [`NAMESPACE`] before reaching the platform facility
//! ([`SecureStorageBridge`]). Without a bridge the store keeps values in
//! process memory only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{AppError, Result};

/// Prefix applied to every key.
pub const NAMESPACE: &str = "jarvis.desktop";
/// Access token key.
pub const AUTH_TOKEN_KEY: &str = "auth.accessToken";
/// Refresh token key.
pub const REFRESH_TOKEN_KEY: &str = "auth.refreshToken";
/// Serialized user profile key.
pub const PROFILE_KEY: &str = "auth.profile";

fn with_namespace(key: &str) -> String {
    format!("{NAMESPACE}:{key}")
}

/// Platform secure-storage facility. Values are strings only.
#[async_trait]
pub trait SecureStorageBridge: Send + Sync {
    /// Store `value` under the already-namespaced `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Fetch the value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Delete `key`. Missing keys are not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Token store with native bridge and in-memory fallback.
pub struct SecureTokenStore {
    bridge: Option<Arc<dyn SecureStorageBridge>>,
    memory: Mutex<HashMap<String, String>>,
}

impl SecureTokenStore {
    /// Store backed by a native bridge.
    #[must_use]
    pub fn native(bridge: Arc<dyn SecureStorageBridge>) -> Self {
        Self {
            bridge: Some(bridge),
            memory: Mutex::new(HashMap::new()),
        }
    }

    /// Store without a native facility; data lives for the process lifetime.
    #[must_use]
    pub fn in_memory() -> Self {
        tracing::warn!("No native secure storage, credentials are kept in memory only");
        Self {
            bridge: None,
            memory: Mutex::new(HashMap::new()),
        }
    }

    /// Whether values reach a native facility.
    #[must_use]
    pub const fn is_native(&self) -> bool {
        self.bridge.is_some()
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value.
    ///
    /// # Errors
    /// Returns `AppError::SecureStorage` when the native facility fails.
    /// Fallback mode never fails.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = with_namespace(key);
        match &self.bridge {
            Some(bridge) => bridge.set(&key, value).await,
            None => {
                self.memory().insert(key, value.to_string());
                Ok(())
            }
        }
    }

    /// Fetch a value. Lookup failures are reported as absent.
    pub async fn get(&self, key: &str) -> Option<String> {
        let key = with_namespace(key);
        match &self.bridge {
            Some(bridge) => match bridge.get(&key).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(%key, error = %e, "Secure storage lookup failed");
                    None
                }
            },
            None => self.memory().get(&key).cloned(),
        }
    }

    /// Delete a value.
    ///
    /// # Errors
    /// Returns `AppError::SecureStorage` when the native facility fails.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let key = with_namespace(key);
        match &self.bridge {
            Some(bridge) => bridge.remove(&key).await,
            None => {
                self.memory().remove(&key);
                Ok(())
            }
        }
    }
}

/// Native bridge persisting to a JSON file in the data directory.
pub struct FileKeystore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileKeystore {
    /// Open the keystore, loading existing entries.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or decoded.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let bytes = std::fs::read(path)
                .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;
            serde_json::from_slice(&bytes).map_err(AppError::json_parse)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::secure_storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let contents = serde_json::to_vec_pretty(entries).map_err(AppError::json_parse)?;
        std::fs::write(&self.path, contents).map_err(|e| {
            AppError::secure_storage(format!("cannot write {}: {e}", self.path.display()))
        })
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        f(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

#[async_trait]
impl SecureStorageBridge for FileKeystore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Bridge whose every call fails.
    struct BrokenBridge;

    #[async_trait]
    impl SecureStorageBridge for BrokenBridge {
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(AppError::secure_storage("keychain locked"))
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(AppError::secure_storage("keychain locked"))
        }
        async fn remove(&self, _key: &str) -> Result<()> {
            Err(AppError::secure_storage("keychain locked"))
        }
    }

    #[tokio::test]
    async fn test_fallback_roundtrip() {
        let store = SecureTokenStore::in_memory();
        assert!(!store.is_native());

        store.set(AUTH_TOKEN_KEY, "tok-1").await.unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY).await.as_deref(), Some("tok-1"));

        store.remove(AUTH_TOKEN_KEY).await.unwrap();
        assert!(store.get(AUTH_TOKEN_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_broken_bridge_fails_loudly_on_writes() {
        let store = SecureTokenStore::native(Arc::new(BrokenBridge));

        assert!(matches!(
            store.set(AUTH_TOKEN_KEY, "tok").await,
            Err(AppError::SecureStorage { .. })
        ));
        assert!(store.remove(AUTH_TOKEN_KEY).await.is_err());
        assert!(store.get(AUTH_TOKEN_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_file_keystore_namespaces_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secure.json");

        let store = SecureTokenStore::native(Arc::new(FileKeystore::open(&path).unwrap()));
        store.set(REFRESH_TOKEN_KEY, "refresh-1").await.unwrap();

        let raw: HashMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw.get("jarvis.desktop:auth.refreshToken").map(String::as_str),
            Some("refresh-1")
        );

        let reopened = SecureTokenStore::native(Arc::new(FileKeystore::open(&path).unwrap()));
        assert_eq!(
            reopened.get(REFRESH_TOKEN_KEY).await.as_deref(),
            Some("refresh-1")
        );
        reopened.remove(REFRESH_TOKEN_KEY).await.unwrap();
        assert!(reopened.get(REFRESH_TOKEN_KEY).await.is_none());
    }
}
