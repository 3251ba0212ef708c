//! Persisted local state.
//!
//! SYSTEM CONTEXT
//! ==============
//! Browsers keep these in `localStorage`; the CLI keeps them in a JSON file.
//! The core only sees [`KeyValueStore`]. Reads that fail to parse are
//! treated as absent, and writes are best-effort.
//!
//! Keys carry a literal `_v1` suffix instead of schema versioning.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::presence::ClientId;
use crate::room::RoomName;

pub const NICKNAME_KEY: &str = "agentoffice_nickname_v1";
pub const CLIENT_ID_KEY: &str = "agentoffice_client_id_v1";
const POSITION_KEY_PREFIX: &str = "agentoffice_position_v1";
const AVATAR_KEY_PREFIX: &str = "agentoffice_avatar_v1";

/// Last-used position in `room`.
#[must_use]
pub fn position_key(room: &RoomName) -> String {
    format!("{POSITION_KEY_PREFIX}:{room}")
}

/// Avatar chosen by `client_id` in `room`.
#[must_use]
pub fn avatar_key(room: &RoomName, client_id: &ClientId) -> String {
    format!("{AVATAR_KEY_PREFIX}:{room}:{client_id}")
}

/// String key-value storage owned by the host.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory store. Also the serialized form of the CLI state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Load a JSON value stored under `key`.
pub fn load_json<T: DeserializeOwned>(store: &impl KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(key, error = %e, "ignoring unreadable stored value");
            None
        }
    }
}

/// Save a JSON value under `key`.
pub fn save_json<T: Serialize>(store: &mut impl KeyValueStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => store.set(key, &raw),
        Err(e) => warn!(key, error = %e, "failed to encode value for storage"),
    }
}

/// The persisted client id, generating and saving one on first use.
pub fn load_or_create_client_id(store: &mut impl KeyValueStore) -> ClientId {
    match store.get(CLIENT_ID_KEY) {
        Some(id) if !id.trim().is_empty() => ClientId::new(id.trim()),
        _ => {
            let id = ClientId::generate();
            debug!(client_id = %id, "generated client id");
            store.set(CLIENT_ID_KEY, id.as_str());
            id
        }
    }
}
