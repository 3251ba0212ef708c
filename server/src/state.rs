//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds one [`RoomState`] per active room: the connected clients' outbound
//! senders and the room's presence map. Rooms are created on first join and
//! evicted when the last client leaves; nothing is persisted.

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use frames::Frame;
use office::room::RoomName;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::rate_limit::RateLimiter;

// =============================================================================
// PRESENCE ENTRY
// =============================================================================

/// One presence map entry. Owned by the connection that last tracked it.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub owner: Uuid,
    pub presence: Value,
}

// =============================================================================
// ROOM STATE
// =============================================================================

#[derive(Default)]
pub struct RoomState {
    /// Connected clients: connection id -> sender for outgoing frames.
    pub clients: HashMap<Uuid, mpsc::Sender<Frame>>,
    /// Presence map keyed by the participant's client id.
    pub presences: HashMap<String, PresenceEntry>,
}

impl RoomState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence records for a `presence:sync` snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        let mut keys: Vec<&String> = self.presences.keys().collect();
        keys.sort();
        keys.into_iter().filter_map(|k| self.presences.get(k)).map(|e| e.presence.clone()).collect()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Clone is required by Axum; all fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomName, RoomState>>>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(rate_limiter: RateLimiter) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), rate_limiter }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
