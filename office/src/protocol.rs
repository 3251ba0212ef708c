//! Office payloads on the frame envelope.
//!
//! Outbound builders produce the frames a session hands to its channel.
//! [`parse_inbound`] turns relay frames into typed events and drops anything
//! malformed with a debug log; a bad peer never surfaces as an error.
//!
//! Payload shapes:
//!
//! | Syscall | `data` |
//! |---------|--------|
//! | `presence:track` | `{client_id, presence}` |
//! | `presence:untrack` | `{client_id}` |
//! | `presence:sync` | `{presences: [record, ...]}` |
//! | `presence:join`, `presence:update` | `{client_id, presence}` |
//! | `presence:leave` | `{client_id}` |
//! | `broadcast:chat` | chat message fields |

#[cfg(test)]
#[path = "protocol_test.rs"]
mod protocol_test;

use frames::{
    BROADCAST_CHAT, Frame, PRESENCE_JOIN, PRESENCE_LEAVE, PRESENCE_SYNC, PRESENCE_TRACK, PRESENCE_UNTRACK,
    PRESENCE_UPDATE, SESSION_CONNECTED, Status,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::debug;

use crate::chat::ChatMessage;
use crate::presence::{ClientId, Participant};

/// Typed view of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connected,
    Sync(Vec<Participant>),
    Upsert(Participant),
    Leave(ClientId),
    Chat(ChatMessage),
    /// The relay refused one of our requests.
    Rejected { syscall: String, message: String },
    Ignored,
}

// =============================================================================
// OUTBOUND
// =============================================================================

fn stamped(syscall: &str, data: Value, room: &str, now: i64) -> Frame {
    let mut frame = Frame::request(syscall, data).with_room(room);
    frame.ts = now;
    frame
}

/// Publish (or refresh) the local presence record.
#[must_use]
pub fn track_frame(room: &str, record: &Participant, now: i64) -> Frame {
    stamped(PRESENCE_TRACK, json!({ "client_id": record.client_id, "presence": record }), room, now)
        .with_from(record.client_id.as_str())
}

/// Withdraw the local presence record.
#[must_use]
pub fn untrack_frame(room: &str, client_id: &ClientId, now: i64) -> Frame {
    stamped(PRESENCE_UNTRACK, json!({ "client_id": client_id }), room, now).with_from(client_id.as_str())
}

/// Broadcast a chat message to the room.
#[must_use]
pub fn chat_frame(room: &str, message: &ChatMessage, now: i64) -> Frame {
    stamped(BROADCAST_CHAT, json!(message), room, now).with_from(message.sender_client_id.as_str())
}

// =============================================================================
// INBOUND
// =============================================================================

/// Classify a relay frame. Malformed payloads come back as [`Inbound::Ignored`].
#[must_use]
pub fn parse_inbound(frame: &Frame) -> Inbound {
    if frame.status == Status::Error {
        let message = frame.data_str("message").unwrap_or("request failed").to_owned();
        return Inbound::Rejected { syscall: frame.syscall.clone(), message };
    }
    if frame.status.is_terminal() {
        return Inbound::Ignored;
    }

    match frame.syscall.as_str() {
        SESSION_CONNECTED => Inbound::Connected,
        PRESENCE_SYNC => parse_sync(frame),
        PRESENCE_JOIN | PRESENCE_UPDATE => match frame.data.get("presence").map(Participant::deserialize) {
            Some(Ok(record)) => Inbound::Upsert(record),
            Some(Err(e)) => dropped(frame, &e.to_string()),
            None => dropped(frame, "missing presence"),
        },
        PRESENCE_LEAVE => match frame.data_str("client_id") {
            Some(id) if !id.trim().is_empty() => Inbound::Leave(ClientId::new(id)),
            _ => dropped(frame, "missing client_id"),
        },
        BROADCAST_CHAT => match ChatMessage::deserialize(&frame.data) {
            Ok(message) if !message.id.is_empty() => Inbound::Chat(message),
            Ok(_) => dropped(frame, "empty message id"),
            Err(e) => dropped(frame, &e.to_string()),
        },
        _ => Inbound::Ignored,
    }
}

fn parse_sync(frame: &Frame) -> Inbound {
    let Some(items) = frame.data.get("presences").and_then(Value::as_array) else {
        return dropped(frame, "missing presences");
    };
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match Participant::deserialize(item) {
            Ok(record) => records.push(record),
            Err(e) => debug!(error = %e, "dropping malformed presence in sync"),
        }
    }
    Inbound::Sync(records)
}

fn dropped(frame: &Frame, reason: &str) -> Inbound {
    debug!(syscall = %frame.syscall, id = %frame.id, reason, "dropping malformed frame");
    Inbound::Ignored
}

/// Millisecond timestamp that tolerates the float form numbers take after a
/// protobuf round trip.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() {
        return Err(D::Error::custom("timestamp is not finite"));
    }
    Ok(raw.round() as i64)
}
