//! Best-effort client-side storage.
//!
//! The cart keeps working in memory when storage is unavailable, so none of
//! the store operations report errors to the caller. Failures are logged and
//! dropped.

pub mod debounce;
pub mod persistence;

pub use debounce::DebouncedWriter;
pub use persistence::CartPersistence;

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// String-keyed store that may be missing, full or read-only at any time.
pub trait KeyValueStore: Send + Sync {
    /// Returns `None` when the key is absent or the store cannot be read.
    fn read(&self, key: &str) -> Option<String>;
    /// Silently drops the write on failure.
    fn write(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-process store. A poisoned lock makes the store behave as unavailable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) {
        match self.entries.lock() {
            Ok(mut entries) => { entries.insert(key.to_string(), value.to_string()); }
            Err(_) => tracing::warn!(key, "memory store unavailable, dropping write"),
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// Stores each key as `<key>.json` under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' }).collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read stored value");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let result = fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&tmp, value))
            .and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "failed to write stored value");
        }
    }

    fn remove(&self, key: &str) {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(key, error = %e, "failed to remove stored value"),
        }
    }
}
