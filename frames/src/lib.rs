//! Wire envelope for the office presence channel.
//!
//! Clients and the relay exchange [`Frame`]s. The payload is an untyped JSON
//! value so the relay can hold presence records and forward chat without
//! knowing their shape. A frame travels as JSON text or as protobuf binary;
//! the relay answers in whichever encoding the peer last used.
//!
//! Protobuf numbers are doubles. Integral values (timestamps, counters) are
//! restored to JSON integers on decode; anything with a fraction stays a
//! float.

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use prost_types::value::Kind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// =============================================================================
// SYSCALLS
// =============================================================================

/// Relay greeting after upgrade: `{client_id, room}`.
pub const SESSION_CONNECTED: &str = "session:connected";
/// Upsert the sender's presence entry: `{client_id, presence}`.
pub const PRESENCE_TRACK: &str = "presence:track";
/// Drop the sender's presence entry: `{client_id}`.
pub const PRESENCE_UNTRACK: &str = "presence:untrack";
/// Full room snapshot: `{presences: [..]}`.
pub const PRESENCE_SYNC: &str = "presence:sync";
pub const PRESENCE_JOIN: &str = "presence:join";
pub const PRESENCE_UPDATE: &str = "presence:update";
pub const PRESENCE_LEAVE: &str = "presence:leave";
pub const BROADCAST_CHAT: &str = "broadcast:chat";

pub const FRAME_MESSAGE: &str = "message";
pub const FRAME_CODE: &str = "code";
pub const FRAME_RETRYABLE: &str = "retryable";

/// Errors that can be reported to a peer as an error frame.
pub trait ErrorCode: std::fmt::Display {
    /// Stable `E_*` identifier.
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed binary frame: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("unknown frame status {0}")]
    InvalidStatus(i32),
    #[error("malformed json frame: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Where a frame sits in an exchange. Notifications use `Request`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Request,
    Done,
    Error,
}

impl Status {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        let wire = match self {
            Self::Request => WireStatus::Request,
            Self::Done => WireStatus::Done,
            Self::Error => WireStatus::Error,
        };
        wire as i32
    }

    fn from_wire(raw: i32) -> Result<Self, CodecError> {
        match WireStatus::try_from(raw) {
            Ok(WireStatus::Request) => Ok(Self::Request),
            Ok(WireStatus::Done) => Ok(Self::Done),
            Ok(WireStatus::Error) => Ok(Self::Error),
            Err(_) => Err(CodecError::InvalidStatus(raw)),
        }
    }

    /// `Done` and `Error` close a request.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Request
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    /// Request this frame answers.
    pub parent_id: Option<String>,
    /// Epoch millis at creation.
    pub ts: i64,
    /// Stamped by the relay on everything it forwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Relay connection id of the sender, or `relay` for relay notices.
    pub from: Option<String>,
    /// `<prefix>:<op>`, e.g. `presence:track`.
    pub syscall: String,
    pub status: Status,
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Wall clock in epoch millis; 0 if the clock is before 1970.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

impl Frame {
    /// New request (or notification) with a fresh id, stamped now.
    #[must_use]
    pub fn request(syscall: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
            ts: now_ms(),
            room: None,
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    #[must_use]
    pub fn with_room(self, room: impl Into<String>) -> Self {
        Self { room: Some(room.into()), ..self }
    }

    #[must_use]
    pub fn with_from(self, from: impl Into<String>) -> Self {
        Self { from: Some(from.into()), ..self }
    }

    /// `presence` for `presence:track`; the whole syscall when there is no `:`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.split_syscall().0
    }

    /// `track` for `presence:track`; empty when there is no `:`.
    #[must_use]
    pub fn op(&self) -> &str {
        self.split_syscall().1
    }

    fn split_syscall(&self) -> (&str, &str) {
        self.syscall.split_once(':').unwrap_or((self.syscall.as_str(), ""))
    }

    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key)?.as_str()
    }

    #[must_use]
    pub fn done(&self) -> Self {
        self.reply(Status::Done, empty_object())
    }

    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Self {
        let data = Map::from_iter([(FRAME_MESSAGE.to_owned(), Value::String(message.into()))]);
        self.reply(Status::Error, Value::Object(data))
    }

    /// Error reply carrying `code`, `message` and `retryable`.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let data = Map::from_iter([
            (FRAME_CODE.to_owned(), Value::from(err.error_code())),
            (FRAME_MESSAGE.to_owned(), Value::String(err.to_string())),
            (FRAME_RETRYABLE.to_owned(), Value::Bool(err.retryable())),
        ]);
        self.reply(Status::Error, Value::Object(data))
    }

    fn reply(&self, status: Status, data: Value) -> Self {
        let mut reply = Self::request(self.syscall.clone(), data);
        reply.parent_id = Some(self.id.clone());
        reply.room.clone_from(&self.room);
        reply.status = status;
        reply
    }
}

// =============================================================================
// CODECS
// =============================================================================

#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    // `WireFrame::from` is the prost getter for the `from` field.
    let wire: WireFrame = frame.into();
    wire.encode_to_vec()
}

/// # Errors
///
/// [`CodecError::Decode`] for bytes that are not a frame,
/// [`CodecError::InvalidStatus`] for a status this channel does not use.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    Frame::try_from(WireFrame::decode(bytes)?)
}

/// # Errors
///
/// [`CodecError::Json`] if the payload cannot be serialized.
pub fn encode_frame_json(frame: &Frame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// # Errors
///
/// [`CodecError::Json`] for malformed text or missing envelope fields.
pub fn decode_frame_json(text: &str) -> Result<Frame, CodecError> {
    Ok(serde_json::from_str(text)?)
}

impl From<&Frame> for WireFrame {
    fn from(frame: &Frame) -> Self {
        Self {
            id: frame.id.clone(),
            parent_id: frame.parent_id.clone(),
            ts: frame.ts,
            room: frame.room.clone(),
            from: frame.from.clone(),
            syscall: frame.syscall.clone(),
            status: frame.status.as_i32(),
            data: Some(to_proto(&frame.data)),
        }
    }
}

impl TryFrom<WireFrame> for Frame {
    type Error = CodecError;

    fn try_from(wire: WireFrame) -> Result<Self, CodecError> {
        Ok(Self {
            status: Status::from_wire(wire.status)?,
            data: wire.data.as_ref().map_or_else(empty_object, from_proto),
            id: wire.id,
            parent_id: wire.parent_id,
            ts: wire.ts,
            room: wire.room,
            from: wire.from,
            syscall: wire.syscall,
        })
    }
}

fn to_proto(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(prost_types::ListValue { values: items.iter().map(to_proto).collect() }),
        Value::Object(fields) => Kind::StructValue(prost_types::Struct {
            fields: fields.iter().map(|(k, v)| (k.clone(), to_proto(v))).collect(),
        }),
    };
    prost_types::Value { kind: Some(kind) }
}

fn from_proto(value: &prost_types::Value) -> Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::NumberValue(n)) => number(*n),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => list.values.iter().map(from_proto).collect(),
        Some(Kind::StructValue(s)) => Value::Object(s.fields.iter().map(|(k, v)| (k.clone(), from_proto(v))).collect()),
    }
}

/// Largest magnitude a double holds without losing integer precision.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
struct WireFrame {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(string, optional, tag = "2")]
    parent_id: Option<String>,
    #[prost(int64, tag = "3")]
    ts: i64,
    #[prost(string, optional, tag = "4")]
    room: Option<String>,
    #[prost(string, optional, tag = "5")]
    from: Option<String>,
    #[prost(string, tag = "6")]
    syscall: String,
    #[prost(enumeration = "WireStatus", tag = "7")]
    status: i32,
    #[prost(message, optional, tag = "8")]
    data: Option<prost_types::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireStatus {
    Request = 0,
    Done = 1,
    Error = 2,
}
