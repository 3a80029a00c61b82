//! Durable key-value storage for sessions and the API key
//!
//! Two independently keyed records live in the store: the session map and the
//! credential string. Each write replaces the whole record.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::state::{Session, SessionMap};

/// Record holding the serialized session map
pub const SESSIONS_KEY: &str = "travel_assistant_sessions";
/// Record holding the API key
pub const CREDENTIAL_KEY: &str = "travel_assistant_or_key";
/// Last session record that could not be read in full, kept before it is
/// overwritten
pub const SESSIONS_BACKUP_KEY: &str = "travel_assistant_sessions.bak";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize sessions: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Minimal string key-value storage
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        // Write next to the target and rename so readers never see a torn record
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))?;
        debug!(key, bytes = value.len(), "wrote record");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

/// In-process store, used headless and in tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Typed access to the session and credential records
#[derive(Debug)]
pub struct SessionStore<S> {
    backend: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Never fails: sessions that cannot be read are skipped, and an
    /// unreadable record is treated as no sessions
    pub fn load_sessions(&self) -> SessionMap {
        self.read_sessions().0
    }

    /// Like [`SessionStore::load_sessions`], but first copies a record that
    /// could not be read in full to [`SESSIONS_BACKUP_KEY`] so the next save
    /// does not destroy it
    pub fn recover_sessions(&mut self) -> SessionMap {
        let (sessions, unreadable) = self.read_sessions();
        if let Some(raw) = unreadable {
            match self.backend.set(SESSIONS_BACKUP_KEY, &raw) {
                Ok(()) => warn!(key = SESSIONS_BACKUP_KEY, "kept a copy of the unreadable session record"),
                Err(e) => warn!(error = %e, "could not back up unreadable session record"),
            }
        }
        sessions
    }

    /// Parsed sessions, plus the raw record when some of it was lost
    fn read_sessions(&self) -> (SessionMap, Option<String>) {
        let raw = match self.backend.get(SESSIONS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return (SessionMap::new(), None),
            Err(e) => {
                warn!(error = %e, "could not read stored sessions, starting empty");
                return (SessionMap::new(), None);
            }
        };

        let entries: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "stored sessions are malformed, starting empty");
                return (SessionMap::new(), Some(raw));
            }
        };

        let mut sessions = SessionMap::new();
        let mut dropped = 0usize;
        for (id, value) in entries {
            match serde_json::from_value::<Session>(value) {
                Ok(session) => {
                    sessions.insert(id, session);
                }
                Err(e) => {
                    warn!(session = %id, error = %e, "skipping unreadable session");
                    dropped += 1;
                }
            }
        }

        if dropped == 0 {
            (sessions, None)
        } else {
            (sessions, Some(raw))
        }
    }

    pub fn save_sessions(&mut self, sessions: &SessionMap) -> Result<(), StoreError> {
        let raw = serde_json::to_string(sessions)?;
        self.backend.set(SESSIONS_KEY, &raw)
    }

    pub fn load_credential(&self) -> Option<String> {
        match self.backend.get(CREDENTIAL_KEY) {
            Ok(Some(key)) if !key.trim().is_empty() => Some(key.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "could not read stored API key");
                None
            }
        }
    }

    pub fn save_credential(&mut self, credential: &str) -> Result<(), StoreError> {
        self.backend.set(CREDENTIAL_KEY, credential)
    }

    pub fn clear_credential(&mut self) -> Result<(), StoreError> {
        self.backend.remove(CREDENTIAL_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Message, Role, Session};

    fn sample_sessions() -> SessionMap {
        let mut sessions = SessionMap::new();
        sessions.insert(
            "session_a".to_string(),
            Session {
                messages: vec![
                    Message::new(Role::User, "Paris hotels?"),
                    Message::new(Role::Assistant, "Try the Marais."),
                ],
            },
        );
        sessions.insert("session_b".to_string(), Session::default());
        sessions
    }

    #[test]
    fn test_missing_sessions_load_empty() {
        let store = SessionStore::new(MemoryStore::new());
        assert!(store.load_sessions().is_empty());
    }

    #[test]
    fn test_malformed_sessions_load_empty() {
        let mut backend = MemoryStore::new();
        backend.set(SESSIONS_KEY, "{not json").unwrap();
        let store = SessionStore::new(backend);
        assert!(store.load_sessions().is_empty());
    }

    #[test]
    fn test_wrong_shape_loads_empty() {
        let mut backend = MemoryStore::new();
        backend.set(SESSIONS_KEY, r#"{"session_x": "hello"}"#).unwrap();
        let store = SessionStore::new(backend);
        assert!(store.load_sessions().is_empty());
    }

    #[test]
    fn test_one_bad_session_keeps_the_rest() {
        let mut backend = MemoryStore::new();
        let raw = r#"{
            "session_a": [
                {"role": "user", "content": "Paris hotels?", "time": "2024-03-01T10:00:00Z"},
                {"role": "assistant", "content": "Try the Marais.", "time": "2024-03-01T10:00:05Z"}
            ],
            "session_b": [{"role": "pilot", "content": "??", "time": "2024-03-02T10:00:00Z"}]
        }"#;
        backend.set(SESSIONS_KEY, raw).unwrap();
        let mut store = SessionStore::new(backend);

        let loaded = store.recover_sessions();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["session_a"].len(), 2);
        assert_eq!(store.backend().get(SESSIONS_BACKUP_KEY).unwrap().as_deref(), Some(raw));
    }

    #[test]
    fn test_malformed_record_is_backed_up() {
        let mut backend = MemoryStore::new();
        backend.set(SESSIONS_KEY, "{not json").unwrap();
        let mut store = SessionStore::new(backend);

        assert!(store.recover_sessions().is_empty());
        assert_eq!(
            store.backend().get(SESSIONS_BACKUP_KEY).unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[test]
    fn test_clean_record_is_not_backed_up() {
        let mut store = SessionStore::new(MemoryStore::new());
        store.save_sessions(&sample_sessions()).unwrap();
        assert_eq!(store.recover_sessions().len(), 2);
        assert_eq!(store.backend().get(SESSIONS_BACKUP_KEY).unwrap(), None);
    }

    #[test]
    fn test_sessions_round_trip() {
        let mut store = SessionStore::new(MemoryStore::new());
        let sessions = sample_sessions();
        store.save_sessions(&sessions).unwrap();
        let loaded = store.load_sessions();
        assert_eq!(loaded, sessions);

        // Saving what was loaded changes nothing
        store.save_sessions(&loaded).unwrap();
        let raw_first = store.backend().get(SESSIONS_KEY).unwrap();
        let reloaded = store.load_sessions();
        store.save_sessions(&reloaded).unwrap();
        assert_eq!(store.backend().get(SESSIONS_KEY).unwrap(), raw_first);
    }

    #[test]
    fn test_save_overwrites_entirely() {
        let mut store = SessionStore::new(MemoryStore::new());
        store.save_sessions(&sample_sessions()).unwrap();

        let mut smaller = SessionMap::new();
        smaller.insert("session_c".to_string(), Session::default());
        store.save_sessions(&smaller).unwrap();

        let loaded = store.load_sessions();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("session_c"));
    }

    #[test]
    fn test_credential_lifecycle() {
        let mut store = SessionStore::new(MemoryStore::new());
        assert_eq!(store.load_credential(), None);

        store.save_credential("sk-or-123").unwrap();
        assert_eq!(store.load_credential().as_deref(), Some("sk-or-123"));

        store.clear_credential().unwrap();
        assert_eq!(store.load_credential(), None);
    }

    #[test]
    fn test_credential_independent_of_sessions() {
        let mut store = SessionStore::new(MemoryStore::new());
        store.save_credential("sk-or-123").unwrap();
        store.save_sessions(&SessionMap::new()).unwrap();
        assert_eq!(store.load_credential().as_deref(), Some("sk-or-123"));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("wayfare");

        let sessions = sample_sessions();
        let mut store = SessionStore::new(FileStore::new(&data_dir));
        store.save_sessions(&sessions).unwrap();
        store.save_credential("sk-or-abc").unwrap();

        let reopened = SessionStore::new(FileStore::new(&data_dir));
        assert_eq!(reopened.load_sessions(), sessions);
        assert_eq!(reopened.load_credential().as_deref(), Some("sk-or-abc"));
        assert!(data_dir.join("travel_assistant_sessions.json").exists());
    }

    #[test]
    fn test_file_store_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileStore::new(dir.path());
        assert!(backend.remove(CREDENTIAL_KEY).is_ok());
        assert_eq!(backend.get(CREDENTIAL_KEY).unwrap(), None);
    }
}
