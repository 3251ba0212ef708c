//! WebSocket handler: the presence channel relay.
//!
//! DESIGN
//! ======
//! On upgrade the connection joins the room named by `?room=` (sanitized the
//! same way the office client sanitizes it) and enters a `select!` loop:
//! - Incoming client frames → decode + dispatch by syscall prefix
//! - Fan-out frames from room peers → forward to client
//!
//! Handlers validate, mutate room state, and return an `Outcome`. The
//! dispatch layer owns all outbound concerns: reply to sender and fan-out
//! to peers.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `session:connected`, then `presence:sync` snapshot
//! 2. Client frames → dispatch → Outcome applied
//! 3. Close → owned presence keys removed, `presence:leave` to peers
//!
//! Frames arrive as JSON text or protobuf binary; replies and fan-out use
//! whichever encoding the client last sent.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use frames::{
    Frame, PRESENCE_SYNC, SESSION_CONNECTED, Status, decode_frame, decode_frame_json, encode_frame, encode_frame_json,
};
use office::room::{ROOM_QUERY_PARAM, RoomName};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::room;
use crate::state::AppState;

const RELAY_FROM: &str = "relay";

// =============================================================================
// OUTCOME
// =============================================================================

/// What the dispatch layer sends, and to whom. Handlers never send frames.
#[derive(Debug)]
enum Outcome {
    /// Reply `done` to the sender and send `notify` to peers.
    DoneAndNotify(Frame),
    /// Forward to peers only.
    Relay(Frame),
    /// Reply `done` to the sender only.
    Done,
}

/// Wire encoding a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Encoding {
    #[default]
    Json,
    Binary,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let room = RoomName::sanitize(params.get(ROOM_QUERY_PARAM).map_or("", String::as_str));
    ws.on_upgrade(move |socket| run_ws(socket, state, room))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, room: RoomName) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);
    let mut encoding = Encoding::default();

    let snapshot = room::join_room(&state, &room, client_id, client_tx).await;
    let welcome = Frame::request(SESSION_CONNECTED, json!({ "client_id": client_id, "room": room }))
        .with_room(room.as_str())
        .with_from(RELAY_FROM);
    let sync = Frame::request(PRESENCE_SYNC, json!({ "presences": snapshot }))
        .with_room(room.as_str())
        .with_from(RELAY_FROM);

    info!(%client_id, %room, "ws: client connected");

    let mut open = send_frame(&mut socket, encoding, &welcome).await.is_ok()
        && send_frame(&mut socket, encoding, &sync).await.is_ok();

    while open {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let decoded = match msg {
                    Message::Text(text) => {
                        encoding = Encoding::Json;
                        decode_frame_json(text.as_str())
                    }
                    Message::Binary(bytes) => {
                        encoding = Encoding::Binary;
                        decode_frame(&bytes)
                    }
                    Message::Close(_) => break,
                    _ => continue,
                };
                let replies = match decoded {
                    Ok(frame) => process_inbound(&state, &room, client_id, frame).await,
                    Err(e) => {
                        warn!(%client_id, error = %e, "ws: invalid inbound frame");
                        vec![Frame::request("gateway:error", json!({ "message": format!("invalid frame: {e}") }))]
                    }
                };
                for reply in replies {
                    if send_frame(&mut socket, encoding, &reply).await.is_err() {
                        open = false;
                        break;
                    }
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, encoding, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    disconnect(&state, &room, client_id).await;
    info!(%client_id, %room, "ws: client disconnected");
}

/// Release the connection's presence keys and tell the remaining peers.
async fn disconnect(state: &AppState, room: &RoomName, client_id: Uuid) {
    let released = room::part_room(state, room, client_id).await;
    for key in released {
        room::broadcast(state, room, &room::leave_frame(room, &key), None).await;
    }
    state.rate_limiter.forget(client_id);
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Process one inbound frame and return the frames for the sender.
async fn process_inbound(state: &AppState, room: &RoomName, client_id: Uuid, mut req: Frame) -> Vec<Frame> {
    req.room = Some(room.as_str().to_owned());
    req.from = Some(client_id.to_string());
    debug!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let result = match req.prefix() {
        "presence" => handle_presence(state, room, client_id, &req).await,
        "broadcast" => handle_broadcast(state, client_id, &req),
        other => Err(req.error(format!("unknown prefix: {other}"))),
    };

    match result {
        Ok(Outcome::DoneAndNotify(notify)) => {
            room::broadcast(state, room, &notify, Some(client_id)).await;
            vec![req.done()]
        }
        Ok(Outcome::Relay(frame)) => {
            room::broadcast(state, room, &frame, Some(client_id)).await;
            vec![]
        }
        Ok(Outcome::Done) => vec![req.done()],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// PRESENCE HANDLERS
// =============================================================================

async fn handle_presence(state: &AppState, room: &RoomName, client_id: Uuid, req: &Frame) -> Result<Outcome, Frame> {
    match req.op() {
        "track" => {
            let (key, tracked) = room::track(state, room, client_id, &req.data).await.map_err(|e| req.error_from(&e))?;
            let presence = req.data.get("presence").cloned().unwrap_or_default();
            let notify = Frame::request(tracked.syscall(), json!({ "client_id": key, "presence": presence }))
                .with_room(room.as_str())
                .with_from(RELAY_FROM);
            Ok(Outcome::DoneAndNotify(notify))
        }
        "untrack" => match room::untrack(state, room, client_id, &req.data).await {
            Ok(Some(key)) => Ok(Outcome::DoneAndNotify(room::leave_frame(room, &key))),
            Ok(None) => Ok(Outcome::Done),
            Err(e) => Err(req.error_from(&e)),
        },
        op => Err(req.error(format!("unknown presence op: {op}"))),
    }
}

// =============================================================================
// BROADCAST HANDLER
// =============================================================================

fn handle_broadcast(state: &AppState, client_id: Uuid, req: &Frame) -> Result<Outcome, Frame> {
    if req.op().is_empty() {
        return Err(req.error("broadcast event required"));
    }
    if let Err(e) = state.rate_limiter.check_and_record(client_id) {
        warn!(%client_id, syscall = %req.syscall, error = %e, "ws: broadcast rate limited");
        return Err(req.error_from(&e));
    }
    Ok(Outcome::Relay(req.clone()))
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, encoding: Encoding, frame: &Frame) -> Result<(), ()> {
    let message = match encoding {
        Encoding::Binary => Message::Binary(encode_frame(frame).into()),
        Encoding::Json => match encode_frame_json(frame) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => {
                warn!(error = %e, "ws: failed to serialize frame");
                return Err(());
            }
        },
    };
    if frame.status == Status::Error {
        let code = frame.data_str("code").unwrap_or("-");
        let message = frame.data_str("message").unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(message).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
