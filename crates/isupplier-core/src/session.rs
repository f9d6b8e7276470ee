//! Durable per-profile session identity
//!
//! The backend keys its conversation tracker on the sender id, so the id has
//! to survive restarts. Resetting it starts a fresh server-side context.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AssistantError, Result};

pub const SESSION_KEY: &str = "tmpa.sessionId";

/// Opaque identifier sent as the webhook `sender`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random 128-bit id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compact form for narrow panels: `abcde…wxyz`
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() > 10 {
            let head: String = chars[..5].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}…{}", head, tail)
        } else {
            self.0.clone()
        }
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Small key/value persistence used for the session id
pub trait SessionStore: Send {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&mut self, key: &str, value: &str) -> Result<()>;
}

/// JSON key/value file, read and rewritten on every access
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/isupplier/storage.json`
    pub fn default_location() -> Result<Self> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            AssistantError::StorageUnavailable("could not determine data directory".to_string())
        })?;
        Ok(Self::new(data_dir.join("isupplier").join("storage.json")))
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| storage_err(&self.path, e))?;
        serde_json::from_str(&content).map_err(|e| storage_err(&self.path, e))
    }
}

fn storage_err(path: &std::path::Path, err: impl fmt::Display) -> AssistantError {
    AssistantError::StorageUnavailable(format!("{}: {}", path.display(), err))
}

impl SessionStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_err(&self.path, e))?;
        }
        let content = serde_json::to_string_pretty(&entries).map_err(|e| storage_err(&self.path, e))?;
        fs::write(&self.path, content).map_err(|e| storage_err(&self.path, e))
    }
}

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct SessionIdentity {
    store: Box<dyn SessionStore>,
    /// Last id handed out; kept stable across storage faults
    current: Option<SessionId>,
    /// Set once storage has failed; used for the rest of the process
    fallback: Option<SessionId>,
}

impl SessionIdentity {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self {
            store,
            current: None,
            fallback: None,
        }
    }

    /// Identity backed by the default file store, or memory if there is none
    pub fn open_default() -> Self {
        match FileStore::default_location() {
            Ok(store) => Self::new(Box::new(store)),
            Err(e) => {
                warn!(error = %e, "session storage unavailable, using in-memory session id");
                Self::in_memory()
            }
        }
    }

    /// Degraded identity with no durable storage at all
    pub fn in_memory() -> Self {
        let mut identity = Self::new(Box::new(MemoryStore::default()));
        identity.fallback = Some(SessionId::generate());
        identity
    }

    /// True once the id only lives in memory
    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn get_or_create(&mut self) -> SessionId {
        if let Some(id) = &self.fallback {
            return id.clone();
        }

        let id = match self.store.load(SESSION_KEY) {
            Ok(Some(id)) if !id.is_empty() => SessionId::from(id),
            Ok(_) => {
                let id = self.current.clone().unwrap_or_else(SessionId::generate);
                self.persist(&id);
                id
            }
            Err(e) => {
                warn!(error = %e, "could not read session id, continuing in memory");
                let id = self.current.clone().unwrap_or_else(SessionId::generate);
                self.fallback = Some(id.clone());
                id
            }
        };
        self.current = Some(id.clone());
        id
    }

    /// Replace the id unconditionally. Prior server-side context is abandoned.
    pub fn reset(&mut self) -> SessionId {
        let id = SessionId::generate();
        if self.fallback.is_some() {
            self.fallback = Some(id.clone());
        } else {
            self.persist(&id);
        }
        self.current = Some(id.clone());
        info!(session = %id.short(), "session reset");
        id
    }

    fn persist(&mut self, id: &SessionId) {
        if let Err(e) = self.store.save(SESSION_KEY, id.as_str()) {
            warn!(error = %e, "could not persist session id, continuing in memory");
            self.fallback = Some(id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Store whose reads or writes always fail
    struct BrokenStore {
        fail_reads: bool,
    }

    impl SessionStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Option<String>> {
            if self.fail_reads {
                Err(AssistantError::StorageUnavailable("read denied".to_string()))
            } else {
                Ok(None)
            }
        }

        fn save(&mut self, _key: &str, _value: &str) -> Result<()> {
            Err(AssistantError::StorageUnavailable("write denied".to_string()))
        }
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut identity = SessionIdentity::new(Box::new(MemoryStore::default()));
        let first = identity.get_or_create();
        let second = identity.get_or_create();
        assert_eq!(first, second);
        assert!(!identity.is_degraded());
    }

    #[test]
    fn test_reset_yields_new_id() {
        let mut identity = SessionIdentity::new(Box::new(MemoryStore::default()));
        let before = identity.get_or_create();
        let after = identity.reset();
        assert_ne!(before, after);
        assert_eq!(identity.get_or_create(), after);
    }

    #[test]
    fn test_id_is_uuid_formatted() {
        let id = SessionId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let mut identity = SessionIdentity::new(Box::new(FileStore::new(&path)));
        let id = identity.get_or_create();

        let mut reopened = SessionIdentity::new(Box::new(FileStore::new(&path)));
        assert_eq!(reopened.get_or_create(), id);

        let reset = reopened.reset();
        let mut third = SessionIdentity::new(Box::new(FileStore::new(&path)));
        assert_eq!(third.get_or_create(), reset);
    }

    #[test]
    fn test_file_store_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let mut store = FileStore::new(&path);
        store.save(SESSION_KEY, "abc").unwrap();
        assert_eq!(store.load("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(store.load(SESSION_KEY).unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_corrupt_file_degrades_to_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();

        let mut identity = SessionIdentity::new(Box::new(FileStore::new(&path)));
        let id = identity.get_or_create();
        assert!(identity.is_degraded());
        assert_eq!(identity.get_or_create(), id);
    }

    #[test]
    fn test_unwritable_store_keeps_stable_id() {
        let mut identity = SessionIdentity::new(Box::new(BrokenStore { fail_reads: false }));
        let id = identity.get_or_create();
        assert!(identity.is_degraded());
        assert_eq!(identity.get_or_create(), id);

        let reset = identity.reset();
        assert_ne!(reset, id);
        assert_eq!(identity.get_or_create(), reset);
    }

    #[test]
    fn test_unreadable_store_falls_back() {
        let mut identity = SessionIdentity::new(Box::new(BrokenStore { fail_reads: true }));
        let id = identity.get_or_create();
        assert!(identity.is_degraded());
        assert_eq!(identity.get_or_create(), id);
    }

    #[test]
    fn test_short_id() {
        let id = SessionId::from("0123456789abcdef".to_string());
        assert_eq!(id.short(), "01234…cdef");
        let id = SessionId::from("web-user".to_string());
        assert_eq!(id.short(), "web-user");
    }

    #[test]
    fn test_storage_fault_after_issue_keeps_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");

        let mut identity = SessionIdentity::new(Box::new(FileStore::new(&path)));
        let first = identity.get_or_create();

        fs::write(&path, "garbage").unwrap();
        let second = identity.get_or_create();

        assert_eq!(first, second);
        assert!(identity.is_degraded());
    }

    #[test]
    fn test_missing_entry_after_issue_keeps_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");

        let mut identity = SessionIdentity::new(Box::new(FileStore::new(&path)));
        let first = identity.get_or_create();

        fs::remove_file(&path).unwrap();
        assert_eq!(identity.get_or_create(), first);
        assert!(!identity.is_degraded());
    }

    #[test]
    fn test_in_memory_identity_is_degraded() {
        let mut identity = SessionIdentity::in_memory();
        assert!(identity.is_degraded());
        let id = identity.get_or_create();
        assert_eq!(identity.get_or_create(), id);
    }
}
