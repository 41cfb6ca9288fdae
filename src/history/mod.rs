//! Bounded, persisted translation history
//!
//! Newest entry first, at most [`HISTORY_CAPACITY`] entries. The full list
//! is written back to the store after every mutation.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::lang::Language;
use crate::store::KeyValueStore;

/// Maximum number of entries kept
pub const HISTORY_CAPACITY: usize = 50;

/// Key under which the serialized history is stored
pub const HISTORY_KEY: &str = "translationHistory";

/// One completed translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub source_text: String,
    pub target_text: String,
    pub source_lang: Language,
    pub target_lang: Language,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        source_text: impl Into<String>,
        target_text: impl Into<String>,
        source_lang: Language,
        target_lang: Language,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            target_text: target_text.into(),
            source_lang,
            target_lang,
            timestamp: Utc::now(),
        }
    }
}

pub struct HistoryCache {
    entries: VecDeque<HistoryEntry>,
    store: Box<dyn KeyValueStore>,
}

impl HistoryCache {
    /// Load the history from the store; absent or malformed data loads empty
    pub fn load(store: Box<dyn KeyValueStore>) -> Self {
        let entries = match store.get(HISTORY_KEY) {
            Some(raw) => match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
                Ok(mut list) => {
                    list.truncate(HISTORY_CAPACITY);
                    list.into()
                }
                Err(e) => {
                    warn!(?e, "stored history is malformed, starting empty");
                    VecDeque::new()
                }
            },
            None => VecDeque::new(),
        };

        debug!(len = entries.len(), "history loaded");
        Self { entries, store }
    }

    /// Insert at the front, evicting the oldest entries beyond capacity
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        while self.entries.len() > HISTORY_CAPACITY {
            self.entries.pop_back();
        }
        self.persist();
    }

    /// Remove the entry at `index`; returns false when out of range
    pub fn remove(&mut self, index: usize) -> bool {
        if self.entries.remove(index).is_none() {
            return false;
        }
        self.persist();
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest entry, if any
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// Entries newest first
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.entries)
            .map_err(std::io::Error::from)
            .and_then(|json| self.store.set(HISTORY_KEY, json));
        if let Err(e) = result {
            warn!(?e, "failed to persist history");
        }
    }
}
