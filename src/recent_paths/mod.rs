use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::preference_store::{PreferenceStore, StoreError};

pub const RECENT_PATHS_KEY: &str = "RecentPaths";
pub const DEFAULT_MAX_RECENT_PATHS: usize = 10;
pub const MIN_MAX_RECENT_PATHS: usize = 5;
pub const MAX_MAX_RECENT_PATHS: usize = 50;

pub fn clamp_max_recent_paths(value: usize) -> usize {
    value.clamp(MIN_MAX_RECENT_PATHS, MAX_MAX_RECENT_PATHS)
}

/// Most-recent-first list of paths without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentPathsLog {
    entries: Vec<String>,
    max_entries: usize,
}

impl Default for RecentPathsLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECENT_PATHS)
    }
}

impl RecentPathsLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: clamp_max_recent_paths(max_entries),
        }
    }

    pub fn from_entries(entries: Vec<String>, max_entries: usize) -> Self {
        let mut log = Self::new(max_entries);
        // Oldest first so the persisted order is preserved.
        for entry in entries.into_iter().rev() {
            log.add(entry);
        }
        log
    }

    pub fn add(&mut self, path: impl Into<String>) {
        let path = path.into();
        if path.is_empty() {
            return;
        }

        self.entries.retain(|entry| *entry != path);
        self.entries.insert(0, path);
        self.entries.truncate(self.max_entries);
    }

    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = clamp_max_recent_paths(max_entries);
        self.entries.truncate(self.max_entries);
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Recent paths backed by a [`PreferenceStore`] entry holding a JSON array.
pub struct RecentPathsStore {
    store: Arc<dyn PreferenceStore>,
    log: Mutex<RecentPathsLog>,
}

impl RecentPathsStore {
    pub fn open(store: Arc<dyn PreferenceStore>, max_entries: usize) -> Self {
        let entries = match store.get(RECENT_PATHS_KEY) {
            Ok(Some(bytes)) => {
                serde_json::from_slice::<Vec<String>>(&bytes).unwrap_or_else(|error| {
                    warn!(%error, "stored recent paths are malformed; starting empty");
                    Vec::new()
                })
            }
            Ok(None) => Vec::new(),
            Err(error) => {
                warn!(%error, "failed to read recent paths; starting empty");
                Vec::new()
            }
        };

        Self {
            store,
            log: Mutex::new(RecentPathsLog::from_entries(entries, max_entries)),
        }
    }

    pub fn record(&self, path: &str) -> Result<(), StoreError> {
        let snapshot = {
            let mut log = self.log.lock().map_err(|_| StoreError::LockPoisoned)?;
            log.add(path);
            log.entries().to_vec()
        };

        debug!(path, count = snapshot.len(), "recent path recorded");
        self.write(&snapshot)
    }

    pub fn list(&self) -> Vec<String> {
        self.log
            .lock()
            .map(|log| log.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        {
            let mut log = self.log.lock().map_err(|_| StoreError::LockPoisoned)?;
            log.clear();
        }
        self.write(&[])
    }

    pub fn set_max_entries(&self, max_entries: usize) -> Result<(), StoreError> {
        let snapshot = {
            let mut log = self.log.lock().map_err(|_| StoreError::LockPoisoned)?;
            log.set_max_entries(max_entries);
            log.entries().to_vec()
        };
        self.write(&snapshot)
    }

    fn write(&self, entries: &[String]) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec(entries)?;
        self.store.set(RECENT_PATHS_KEY, &serialized)
    }
}
