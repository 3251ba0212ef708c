//! File-backed key-value store for the bot's persisted identity.
//!
//! Write-through: every `set`/`remove` rewrites the whole file, mirroring how
//! a browser's `localStorage` survives a crash mid-session. An unreadable file
//! starts empty rather than failing the run.

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use office::store::{KeyValueStore, MemoryStore};
use tracing::{debug, warn};

pub const DEFAULT_STATE_FILE: &str = ".office-bot.json";

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: MemoryStore,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring unreadable state file");
                MemoryStore::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file yet");
                MemoryStore::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read state file");
                MemoryStore::new()
            }
        };
        Self { path, entries }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) {
        let raw = match serde_json::to_string_pretty(&self.entries) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode state");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, raw) {
            warn!(path = %self.path.display(), error = %e, "failed to write state file");
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key)
    }

    fn set(&mut self, key: &str, value: &str) {
        if self.entries.get(key).as_deref() == Some(value) {
            return;
        }
        self.entries.set(key, value);
        self.flush();
    }

    fn remove(&mut self, key: &str) {
        if self.entries.get(key).is_some() {
            self.entries.remove(key);
            self.flush();
        }
    }
}
