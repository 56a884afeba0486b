use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("preference key `{0}` is not a valid storage key")]
    InvalidKey(String),
    #[error("failed to {action} preference file `{}`: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode preference value: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("preference store lock was poisoned")]
    LockPoisoned,
}

/// Durable byte-valued key-value storage for preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes are synchronous: the value is durable once this returns `Ok`.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Stores each preference in its own file under `root`, replacing it
/// atomically on every write.
#[derive(Debug)]
pub struct FilePreferenceStore {
    root: PathBuf,
    io_lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(root: PathBuf) -> Self {
        debug!(root = %root.display(), "preference store initialized");
        Self {
            root,
            io_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        let _io_guard = self.io_lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        match fs::read(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                action: "read",
                path,
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let _io_guard = self.io_lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            action: "create directory for",
            path: path.clone(),
            source,
        })?;
        write_atomic_file(&path, value)?;

        debug!(key, path = %path.display(), bytes = value.len(), "preference written");
        Ok(())
    }
}

/// In-process store, used when nothing needs to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        let values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

pub(crate) fn write_atomic_file(file_path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let temp_path = temp_file_path_for(file_path);
    let io_error = |action: &'static str, path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| StoreError::Io {
            action,
            path,
            source,
        }
    };

    let mut temp_file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .map_err(io_error("create temp file for", file_path))?;

    if let Err(error) = temp_file.write_all(contents) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error("write temp file for", file_path)(error));
    }

    if let Err(error) = temp_file.sync_all() {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error("flush temp file for", file_path)(error));
    }

    drop(temp_file);

    fs::rename(&temp_path, file_path).map_err(|error| {
        let _ = fs::remove_file(&temp_path);
        io_error("finalize", file_path)(error)
    })
}

fn temp_file_path_for(file_path: &Path) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = file_path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("preference.json");
    let pid = std::process::id();

    file_path.with_file_name(format!(".{file_name}.{pid}.{timestamp}.tmp"))
}
