//! Room service: membership, presence map, and fan-out.
//!
//! DESIGN
//! ======
//! A room is created by its first connection and evicted with its last.
//! The relay treats presence records as opaque JSON; it only checks that a
//! tracked record is an object carrying the same `client_id` it is keyed
//! by. An entry belongs to the connection that last tracked it, so a client
//! that reconnects before its old socket closes keeps its entry when the
//! stale connection finally drops.

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;

use frames::{ErrorCode, Frame, PRESENCE_JOIN, PRESENCE_LEAVE, PRESENCE_UPDATE};
use office::room::RoomName;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::{AppState, PresenceEntry, RoomState};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room not joined: {0}")]
    NotJoined(String),
    #[error("client_id required")]
    MissingClientId,
    #[error("presence object required")]
    MissingPresence,
    #[error("presence client_id {found} does not match key {key}")]
    KeyMismatch { key: String, found: String },
}

impl ErrorCode for RoomError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotJoined(_) => "E_ROOM_NOT_JOINED",
            Self::MissingClientId => "E_MISSING_CLIENT_ID",
            Self::MissingPresence => "E_MISSING_PRESENCE",
            Self::KeyMismatch { .. } => "E_KEY_MISMATCH",
        }
    }
}

/// Whether a track created a new key or replaced an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    Joined,
    Updated,
}

impl Tracked {
    /// Syscall peers receive for this change.
    #[must_use]
    pub fn syscall(self) -> &'static str {
        match self {
            Self::Joined => PRESENCE_JOIN,
            Self::Updated => PRESENCE_UPDATE,
        }
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

/// Register a connection and return the room's presence snapshot.
pub async fn join_room(state: &AppState, room: &RoomName, client_id: Uuid, tx: mpsc::Sender<Frame>) -> Vec<Value> {
    let mut rooms = state.rooms.write().await;
    let room_state = rooms.entry(room.clone()).or_insert_with(RoomState::new);
    room_state.clients.insert(client_id, tx);
    info!(%room, %client_id, clients = room_state.clients.len(), "client joined room");
    room_state.snapshot()
}

/// Drop a connection, returning the presence keys it still owned.
///
/// Evicts the room once no connection remains.
pub async fn part_room(state: &AppState, room: &RoomName, client_id: Uuid) -> Vec<String> {
    let mut rooms = state.rooms.write().await;
    let Some(room_state) = rooms.get_mut(room) else {
        return Vec::new();
    };

    room_state.clients.remove(&client_id);
    let owned: Vec<String> =
        room_state.presences.iter().filter(|(_, e)| e.owner == client_id).map(|(k, _)| k.clone()).collect();
    for key in &owned {
        room_state.presences.remove(key);
    }
    info!(%room, %client_id, remaining = room_state.clients.len(), released = owned.len(), "client left room");

    if room_state.clients.is_empty() {
        rooms.remove(room);
        info!(%room, "evicted empty room");
    }
    owned
}

// =============================================================================
// PRESENCE
// =============================================================================

/// Upsert the presence record carried by a `presence:track` payload.
///
/// # Errors
///
/// Returns a [`RoomError`] for a malformed payload or a room the connection
/// is not in.
pub async fn track(state: &AppState, room: &RoomName, client_id: Uuid, data: &Value) -> Result<(String, Tracked), RoomError> {
    let key = match data.get("client_id").and_then(Value::as_str) {
        Some(key) if !key.trim().is_empty() => key.to_owned(),
        _ => return Err(RoomError::MissingClientId),
    };
    let Some(presence) = data.get("presence").filter(|p| p.is_object()) else {
        return Err(RoomError::MissingPresence);
    };
    if let Some(found) = presence.get("client_id").and_then(Value::as_str) {
        if found != key {
            return Err(RoomError::KeyMismatch { key, found: found.to_owned() });
        }
    }

    let mut rooms = state.rooms.write().await;
    let room_state = joined(&mut rooms, room, client_id)?;
    let entry = PresenceEntry { owner: client_id, presence: presence.clone() };
    let tracked = match room_state.presences.insert(key.clone(), entry) {
        Some(_) => Tracked::Updated,
        None => Tracked::Joined,
    };
    debug!(%room, %client_id, key = %key, ?tracked, "presence tracked");
    Ok((key, tracked))
}

/// Remove a presence key owned by this connection. Returns whether it existed.
///
/// # Errors
///
/// Returns a [`RoomError`] for a missing `client_id` or a room the
/// connection is not in.
pub async fn untrack(state: &AppState, room: &RoomName, client_id: Uuid, data: &Value) -> Result<Option<String>, RoomError> {
    let key = match data.get("client_id").and_then(Value::as_str) {
        Some(key) if !key.trim().is_empty() => key.to_owned(),
        _ => return Err(RoomError::MissingClientId),
    };

    let mut rooms = state.rooms.write().await;
    let room_state = joined(&mut rooms, room, client_id)?;
    let owned = room_state.presences.get(&key).is_some_and(|e| e.owner == client_id);
    if !owned {
        return Ok(None);
    }
    room_state.presences.remove(&key);
    debug!(%room, %client_id, key = %key, "presence untracked");
    Ok(Some(key))
}

fn joined<'a>(
    rooms: &'a mut std::collections::HashMap<RoomName, RoomState>,
    room: &RoomName,
    client_id: Uuid,
) -> Result<&'a mut RoomState, RoomError> {
    match rooms.get_mut(room) {
        Some(room_state) if room_state.clients.contains_key(&client_id) => Ok(room_state),
        _ => Err(RoomError::NotJoined(room.to_string())),
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// `presence:leave` notification for one key.
#[must_use]
pub fn leave_frame(room: &RoomName, key: &str) -> Frame {
    Frame::request(PRESENCE_LEAVE, json!({ "client_id": key })).with_room(room.as_str()).with_from("relay")
}

/// Send `frame` to every client in the room except `exclude`.
pub async fn broadcast(state: &AppState, room: &RoomName, frame: &Frame, exclude: Option<Uuid>) {
    let rooms = state.rooms.read().await;
    let Some(room_state) = rooms.get(room) else {
        return;
    };

    for (client_id, tx) in &room_state.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: a full or closed channel skips this client.
        if let Err(e) = tx.try_send(frame.clone()) {
            debug!(%room, %client_id, error = %e, "dropped fan-out frame");
        }
    }
}
