//! Session credential storage
//!
//! [`CredentialStore`] is the single owner of the current session. It keeps
//! the credential in memory for readers and mirrors it into a
//! [`CredentialStorage`] backend so a session survives restarts.

use crate::error::{ClientError, Result};
use crate::types::{AuthData, Credential, Role};
use papaya::HashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

pub const KEY_TOKEN: &str = "token";
pub const KEY_USERNAME: &str = "username";
pub const KEY_ROLE: &str = "role";
pub const KEY_USER_ID: &str = "userId";
pub const KEY_IS_REGISTERED: &str = "isRegistered";

/// Every persisted key, cleared together on logout
pub const SESSION_KEYS: [&str; 5] = [KEY_TOKEN, KEY_USERNAME, KEY_ROLE, KEY_USER_ID, KEY_IS_REGISTERED];

/// Key/value persistence for session fields
pub trait CredentialStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    /// Write several entries; `None` removes the key.
    fn write(&self, entries: &[(&str, Option<String>)]) -> Result<()>;

    /// Remove all the given keys in one operation.
    fn remove_all(&self, keys: &[&str]) -> Result<()>;
}

/// Process-local storage backed by a Papaya HashMap
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.pin().get(key).cloned()
    }

    fn write(&self, entries: &[(&str, Option<String>)]) -> Result<()> {
        let map = self.entries.pin();
        for (key, value) in entries {
            match value {
                Some(value) => {
                    map.insert(key.to_string(), value.clone());
                }
                None => {
                    map.remove(*key);
                }
            }
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let map = self.entries.pin();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// Storage persisted as a JSON object in a file
///
/// The whole object is rewritten on every change, so a group of keys is
/// always replaced in a single write.
pub struct FileStorage {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cache = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, cache: &BTreeMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(cache)?;
        std::fs::write(&self.path, bytes).map_err(|e| {
            ClientError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

impl CredentialStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).cloned()
    }

    fn write(&self, entries: &[(&str, Option<String>)]) -> Result<()> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            match value {
                Some(value) => {
                    cache.insert(key.to_string(), value.clone());
                }
                None => {
                    cache.remove(*key);
                }
            }
        }
        self.persist(&cache)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            cache.remove(*key);
        }
        self.persist(&cache)
    }
}

/// Thread-safe handle to the current session credential
///
/// Cloning is cheap; all clones share the same state. Readers may observe an
/// absent or stale token at any time; the last write wins.
#[derive(Clone)]
pub struct CredentialStore {
    current: Arc<RwLock<Credential>>,
    storage: Arc<dyn CredentialStorage>,
}

impl CredentialStore {
    /// Create a store over `storage`, restoring any persisted session.
    pub fn new(storage: Arc<dyn CredentialStorage>) -> Self {
        let store = Self {
            current: Arc::new(RwLock::new(Credential::default())),
            storage,
        };
        store.load();
        store
    }

    /// Create a store that only lives as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Reload the credential from storage, replacing the in-memory copy.
    pub fn load(&self) {
        let role = self.storage.get(KEY_ROLE).and_then(|raw| match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                warn!(error = %e, "Ignoring persisted role");
                None
            }
        });

        let restored = Credential {
            token: self.storage.get(KEY_TOKEN),
            username: self.storage.get(KEY_USERNAME),
            role,
            user_id: self.storage.get(KEY_USER_ID),
            is_registered: self
                .storage
                .get(KEY_IS_REGISTERED)
                .map(|v| v == "true")
                .unwrap_or(false),
        };

        if restored.is_authenticated() {
            debug!(username = ?restored.username, role = ?restored.role, "Restored persisted session");
        }
        *self.write_guard() = restored;
    }

    pub fn credential(&self) -> Credential {
        self.read_guard().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read_guard().token.clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.read_guard().role
    }

    pub fn username(&self) -> Option<String> {
        self.read_guard().username.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_guard().is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    pub fn is_company(&self) -> bool {
        self.role() == Some(Role::Company)
    }

    pub fn is_student(&self) -> bool {
        self.role() == Some(Role::Student)
    }

    pub fn is_viewer(&self) -> bool {
        self.role() == Some(Role::Viewer)
    }

    /// Install a full session (login or profile bootstrap).
    ///
    /// `user_id` and `is_registered` are only overwritten when present.
    pub fn set_auth_data(&self, data: AuthData) -> Result<()> {
        let snapshot = {
            let mut current = self.write_guard();
            current.token = Some(data.token);
            current.username = Some(data.username);
            current.role = Some(data.role);
            if let Some(user_id) = data.user_id {
                current.user_id = Some(user_id);
            }
            if let Some(registered) = data.is_registered {
                current.is_registered = registered;
            }
            current.clone()
        };

        self.storage.write(&[
            (KEY_TOKEN, snapshot.token),
            (KEY_USERNAME, snapshot.username),
            (KEY_ROLE, snapshot.role.map(|r| r.as_str().to_string())),
            (KEY_USER_ID, snapshot.user_id),
            (KEY_IS_REGISTERED, Some(snapshot.is_registered.to_string())),
        ])
    }

    /// Replace only the access token (after a refresh).
    pub fn update_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.write_guard().token = Some(token.clone());
        self.storage.write(&[(KEY_TOKEN, Some(token))])
    }

    pub fn set_is_registered(&self, registered: bool) -> Result<()> {
        self.write_guard().is_registered = registered;
        self.storage
            .write(&[(KEY_IS_REGISTERED, Some(registered.to_string()))])
    }

    /// Clear every session field in memory and in storage.
    ///
    /// The in-memory credential is always cleared, even if the storage
    /// backend reports an error.
    pub fn clear(&self) -> Result<()> {
        *self.write_guard() = Credential::default();
        self.storage.remove_all(&SESSION_KEYS)
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, Credential> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Credential> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
