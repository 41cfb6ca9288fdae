//! Durable key-value storage for session state
//!
//! The session only needs `get`/`set` of string values under fixed keys.
//! Absent or unreadable data always reads as "no value".

mod file;

pub use file::FileStore;

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Key under which the display-mode preference is stored
pub const DARK_MODE_KEY: &str = "darkMode";

/// String key-value storage that survives across sessions
pub trait KeyValueStore: Send {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: String) -> io::Result<()>;
}

/// Volatile store, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_owned(), value);
        Ok(())
    }
}

/// Display preferences persisted alongside the history
pub struct Preferences {
    store: Box<dyn KeyValueStore>,
    dark_mode: bool,
}

impl Preferences {
    /// Read preferences from the store, falling back to defaults
    pub fn load(store: Box<dyn KeyValueStore>) -> Self {
        let dark_mode = store
            .get(DARK_MODE_KEY)
            .and_then(|raw| serde_json::from_str::<bool>(&raw).ok())
            .unwrap_or(false);
        Self { store, dark_mode }
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    /// Update the dark-mode flag; returns whether it changed
    pub fn set_dark_mode(&mut self, enabled: bool) -> bool {
        if self.dark_mode == enabled {
            return false;
        }
        self.dark_mode = enabled;
        if let Err(e) = self.store.set(DARK_MODE_KEY, enabled.to_string()) {
            warn!(?e, "failed to persist display preference");
        }
        true
    }
}
