use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};

const SERVICE_NAME: &str = "practice-client";
const KEYRING_USER: &str = "credentials";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Access and renewal credential, always replaced together
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// On-disk layout of the persisted credentials
#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    access_token: String,
    refresh_token: String,
    saved_at: DateTime<Utc>,
}

impl From<StoredCredentials> for CredentialPair {
    fn from(stored: StoredCredentials) -> Self {
        Self {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
        }
    }
}

/// Credential storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No credentials stored")]
    NoCredentials,
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Persistence backend for the credential pair
///
/// This abstraction allows easy mocking of credential storage in tests.
pub trait CredentialStorage: Send + Sync {
    /// Loads the persisted credential pair
    fn load(&self) -> Result<CredentialPair, StoreError>;

    /// Persists the credential pair, replacing any previous one
    fn save(&self, pair: &CredentialPair) -> Result<()>;

    /// Removes the persisted credential pair
    fn delete(&self) -> Result<()>;
}

/// Credential storage using a JSON file with an OS keyring mirror
///
/// The file is the primary store. The keyring copy is best effort and is only
/// read when the file is missing.
pub struct FileCredentialStore {
    keyring_entry: Option<keyring::Entry>,
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store in the client's config directory
    pub fn new() -> Result<Self> {
        let config_dir = crate::config::ConfigManager::config_dir()?;
        std::fs::create_dir_all(&config_dir)?;

        Ok(Self {
            keyring_entry: keyring::Entry::new(SERVICE_NAME, KEYRING_USER).ok(),
            path: config_dir.join(CREDENTIALS_FILE),
        })
    }

    /// Creates a file-only store at a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            keyring_entry: None,
            path,
        }
    }

    fn parse(data: &str) -> Result<CredentialPair, StoreError> {
        let stored: StoredCredentials =
            serde_json::from_str(data).map_err(|e| StoreError::Storage(e.into()))?;
        Ok(stored.into())
    }
}

impl CredentialStorage for FileCredentialStore {
    fn load(&self) -> Result<CredentialPair, StoreError> {
        if self.path.exists() {
            let data = std::fs::read_to_string(&self.path)
                .map_err(|e| StoreError::Storage(e.into()))?;
            return Self::parse(&data);
        }

        if let Some(ref entry) = self.keyring_entry {
            if let Ok(data) = entry.get_password() {
                return Self::parse(&data);
            }
        }

        Err(StoreError::NoCredentials)
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        let stored = StoredCredentials {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            saved_at: Utc::now(),
        };
        let data = serde_json::to_string(&stored).context("Failed to serialize credentials")?;

        std::fs::write(&self.path, &data).context("Failed to write credentials file")?;

        if let Some(ref entry) = self.keyring_entry {
            let _ = entry.set_password(&data);
        }

        Ok(())
    }

    fn delete(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to delete credentials file")?;
        }

        if let Some(ref entry) = self.keyring_entry {
            let _ = entry.delete_credential();
        }

        Ok(())
    }
}

/// Process-wide view of the current credentials
///
/// Reads and writes go through an in-memory copy so a pair is always
/// observed whole. Every change is written through to the optional
/// persistence backend; backend failures are logged and otherwise ignored.
/// Readers never wait on the backend.
pub struct CredentialStore {
    current: RwLock<Option<CredentialPair>>,
    backend: Option<Box<dyn CredentialStorage>>,
    /// Keeps backend writes in the same order as in-memory changes
    writes: Mutex<()>,
}

impl CredentialStore {
    /// Creates a store backed by `backend`, rehydrating any persisted pair
    pub fn with_backend(backend: Box<dyn CredentialStorage>) -> Self {
        let current = match backend.load() {
            Ok(pair) => {
                tracing::info!("Restored stored credentials");
                Some(pair)
            }
            Err(StoreError::NoCredentials) => None,
            Err(e) => {
                tracing::warn!("Failed to load stored credentials: {}", e);
                None
            }
        };

        Self {
            current: RwLock::new(current),
            backend: Some(backend),
            writes: Mutex::new(()),
        }
    }

    /// Creates a store that lives only as long as the process
    pub fn in_memory(initial: Option<CredentialPair>) -> Self {
        Self {
            current: RwLock::new(initial),
            backend: None,
            writes: Mutex::new(()),
        }
    }

    /// Returns the current pair, if any
    pub fn get(&self) -> Option<CredentialPair> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the current access credential
    pub fn access_token(&self) -> Option<String> {
        self.get().map(|pair| pair.access_token)
    }

    /// Returns the current renewal credential, ignoring an empty one
    pub fn refresh_token(&self) -> Option<String> {
        self.get()
            .map(|pair| pair.refresh_token)
            .filter(|token| !token.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }

    /// Replaces the current pair and persists it
    pub fn set(&self, pair: CredentialPair) {
        let _writing = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        self.replace(Some(pair.clone()));

        if let Some(ref backend) = self.backend {
            if let Err(e) = backend.save(&pair) {
                tracing::warn!("Failed to persist credentials: {}", e);
            }
        }
    }

    /// Removes the current pair and its persisted copy
    pub fn clear(&self) {
        let _writing = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        self.replace(None);

        if let Some(ref backend) = self.backend {
            if let Err(e) = backend.delete() {
                tracing::warn!("Failed to delete stored credentials: {}", e);
            }
        }
    }

    fn replace(&self, pair: Option<CredentialPair>) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = pair;
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MemoryCredentialStorage;
    use super::*;
    use std::sync::{mpsc, Arc};

    fn make_pair(suffix: &str) -> CredentialPair {
        CredentialPair::new(format!("access_{suffix}"), format!("refresh_{suffix}"))
    }

    // === CredentialStore tests ===

    #[test]
    fn empty_store_returns_none() {
        let store = CredentialStore::in_memory(None);

        assert!(store.get().is_none());
        assert!(store.access_token().is_none());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn set_replaces_whole_pair() {
        let store = CredentialStore::in_memory(Some(make_pair("1")));

        store.set(make_pair("2"));

        assert_eq!(store.get(), Some(make_pair("2")));
        assert_eq!(store.access_token().as_deref(), Some("access_2"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh_2"));
    }

    #[test]
    fn clear_empties_store() {
        let store = CredentialStore::in_memory(Some(make_pair("1")));

        store.clear();
        store.clear();

        assert!(store.get().is_none());
    }

    #[test]
    fn empty_refresh_token_is_treated_as_missing() {
        let store = CredentialStore::in_memory(Some(CredentialPair::new("access", "")));
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn store_rehydrates_from_backend() {
        let backend = MemoryCredentialStorage::with_pair(make_pair("persisted"));
        let store = CredentialStore::with_backend(Box::new(backend));

        assert_eq!(store.get(), Some(make_pair("persisted")));
    }

    #[test]
    fn store_writes_through_to_backend() {
        let backend = MemoryCredentialStorage::new();
        let store = CredentialStore::with_backend(Box::new(backend.clone()));

        store.set(make_pair("1"));
        assert_eq!(backend.persisted(), Some(make_pair("1")));

        store.clear();
        assert!(backend.persisted().is_none());
    }

    /// Backend whose writes block until the test lets them finish
    struct SlowStorage {
        entered: mpsc::SyncSender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl CredentialStorage for SlowStorage {
        fn load(&self) -> Result<CredentialPair, StoreError> {
            Err(StoreError::NoCredentials)
        }

        fn save(&self, _pair: &CredentialPair) -> Result<()> {
            self.entered.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(())
        }

        fn delete(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reads_do_not_wait_for_persistence() {
        let (entered_tx, entered_rx) = mpsc::sync_channel(1);
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(CredentialStore::with_backend(Box::new(SlowStorage {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        })));

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || store.set(make_pair("1")))
        };
        entered_rx.recv().unwrap();

        // The backend write is still in progress
        assert_eq!(store.get(), Some(make_pair("1")));
        assert!(store.is_authenticated());

        release_tx.send(()).unwrap();
        writer.join().unwrap();
    }

    #[test]
    fn debug_output_hides_credentials() {
        let rendered = format!("{:?}", make_pair("secret"));
        assert!(!rendered.contains("secret"));
    }

    // === FileCredentialStore tests (with temp files) ===

    #[test]
    fn file_store_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_path(temp_dir.path().join("credentials.json"));

        store.save(&make_pair("1")).unwrap();

        assert_eq!(store.load().unwrap(), make_pair("1"));
    }

    #[test]
    fn file_store_uses_fixed_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");
        let store = FileCredentialStore::with_path(path.clone());

        store.save(&make_pair("1")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(raw["access_token"], "access_1");
        assert_eq!(raw["refresh_token"], "refresh_1");
        assert!(raw["saved_at"].is_string());
    }

    #[test]
    fn file_store_load_nonexistent_returns_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_path(temp_dir.path().join("missing.json"));

        assert!(matches!(store.load(), Err(StoreError::NoCredentials)));
    }

    #[test]
    fn file_store_load_corrupt_returns_storage_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::with_path(path);

        assert!(matches!(store.load(), Err(StoreError::Storage(_))));
    }

    #[test]
    fn file_store_delete_removes_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");
        let store = FileCredentialStore::with_path(path.clone());

        store.save(&make_pair("1")).unwrap();
        assert!(path.exists());

        store.delete().unwrap();
        assert!(!path.exists());

        // Deleting twice is fine
        store.delete().unwrap();
    }

    #[test]
    fn credentials_survive_a_restart() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");

        let first = CredentialStore::with_backend(Box::new(FileCredentialStore::with_path(
            path.clone(),
        )));
        first.set(make_pair("1"));
        drop(first);

        let second =
            CredentialStore::with_backend(Box::new(FileCredentialStore::with_path(path)));
        assert_eq!(second.get(), Some(make_pair("1")));
    }

    #[test]
    fn pair_accepts_camel_case_wire_format() {
        let json = r#"{"accessToken": "a2", "refreshToken": "r2"}"#;
        let pair: CredentialPair = serde_json::from_str(json).unwrap();

        assert_eq!(pair, CredentialPair::new("a2", "r2"));
    }
}
