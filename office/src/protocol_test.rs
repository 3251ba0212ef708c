use super::*;
use crate::presence::{Facing, Status as PresenceStatus};
use crate::spatial::Position;

fn record(id: &str) -> Participant {
    Participant {
        client_id: ClientId::new(id),
        name: "Ann".into(),
        role: "Backend".into(),
        status: PresenceStatus::Focus,
        avatar: "assets/avatars/avatar-dev.svg".into(),
        position: Position::Point { x: 120.5, y: 300.0 },
        facing: Facing::Left,
        joined_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_250,
        claimed_at: 1_700_000_000_000,
        is_local: true,
    }
}

fn relay_frame(syscall: &str, data: Value) -> Frame {
    Frame::request(syscall, data).with_from("relay")
}

#[test]
fn track_frame_carries_record_and_room() {
    let frame = track_frame("lobby", &record("c1"), 42);
    assert_eq!(frame.syscall, PRESENCE_TRACK);
    assert_eq!(frame.room.as_deref(), Some("lobby"));
    assert_eq!(frame.from.as_deref(), Some("c1"));
    assert_eq!(frame.ts, 42);
    assert_eq!(frame.data_str("client_id"), Some("c1"));
    assert_eq!(frame.data["presence"]["position"]["kind"], "point");
    assert!(frame.data["presence"].get("is_local").is_none());
}

#[test]
fn join_survives_protobuf_round_trip() {
    let tracked = track_frame("lobby", &record("c1"), 42);
    let join = relay_frame(PRESENCE_JOIN, tracked.data.clone());
    let decoded = frames::decode_frame(&frames::encode_frame(&join)).expect("decode");

    let Inbound::Upsert(parsed) = parse_inbound(&decoded) else {
        panic!("expected upsert");
    };
    let mut expected = record("c1");
    expected.is_local = false;
    assert_eq!(parsed, expected);
}

#[test]
fn sync_keeps_valid_records_and_drops_malformed() {
    let good = serde_json::to_value(record("c1")).expect("record");
    let frame = relay_frame(PRESENCE_SYNC, json!({ "presences": [good, {"client_id": "broken"}] }));
    let Inbound::Sync(records) = parse_inbound(&frame) else {
        panic!("expected sync");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].client_id.as_str(), "c1");
}

#[test]
fn sync_without_presences_is_ignored() {
    assert_eq!(parse_inbound(&relay_frame(PRESENCE_SYNC, json!({}))), Inbound::Ignored);
}

#[test]
fn update_without_presence_is_ignored() {
    assert_eq!(parse_inbound(&relay_frame(PRESENCE_UPDATE, json!({"client_id": "c1"}))), Inbound::Ignored);
}

#[test]
fn leave_requires_client_id() {
    assert_eq!(
        parse_inbound(&relay_frame(PRESENCE_LEAVE, json!({"client_id": "c9"}))),
        Inbound::Leave(ClientId::new("c9"))
    );
    assert_eq!(parse_inbound(&relay_frame(PRESENCE_LEAVE, json!({"client_id": "  "}))), Inbound::Ignored);
    assert_eq!(parse_inbound(&relay_frame(PRESENCE_LEAVE, json!({}))), Inbound::Ignored);
}

#[test]
fn chat_frame_round_trips_through_parser() {
    let message = ChatMessage {
        id: "m-1".into(),
        sender_client_id: ClientId::new("c1"),
        nickname: "Ann".into(),
        text: "hi".into(),
        created_at: 1_700_000_000_999,
    };
    let sent = chat_frame("lobby", &message, 7);
    assert_eq!(sent.syscall, BROADCAST_CHAT);
    let decoded = frames::decode_frame(&frames::encode_frame(&sent)).expect("decode");
    assert_eq!(parse_inbound(&decoded), Inbound::Chat(message));
}

#[test]
fn chat_without_text_is_ignored() {
    let frame = relay_frame(BROADCAST_CHAT, json!({"id": "m-2", "sender_client_id": "c1"}));
    assert_eq!(parse_inbound(&frame), Inbound::Ignored);
}

#[test]
fn error_reply_is_rejected() {
    let mut frame = relay_frame(BROADCAST_CHAT, json!({"message": "rate limited"}));
    frame.status = Status::Error;
    assert_eq!(
        parse_inbound(&frame),
        Inbound::Rejected { syscall: BROADCAST_CHAT.into(), message: "rate limited".into() }
    );
}

#[test]
fn done_reply_and_unknown_syscalls_are_ignored() {
    let mut done = relay_frame(PRESENCE_TRACK, json!({}));
    done.status = Status::Done;
    assert_eq!(parse_inbound(&done), Inbound::Ignored);
    assert_eq!(parse_inbound(&relay_frame("board:join", json!({}))), Inbound::Ignored);
    assert_eq!(parse_inbound(&relay_frame(SESSION_CONNECTED, json!({}))), Inbound::Connected);
}
