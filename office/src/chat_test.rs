use super::*;
use crate::presence::{Facing, Status};
use crate::spatial::Position;

fn message(id: &str, sender: &str, nickname: &str) -> ChatMessage {
    ChatMessage {
        id: id.into(),
        sender_client_id: ClientId::new(sender),
        nickname: nickname.into(),
        text: "hi".into(),
        created_at: 1_000,
    }
}

fn participant(id: &str, name: &str) -> Participant {
    Participant {
        client_id: ClientId::new(id),
        name: name.into(),
        role: "Backend".into(),
        status: Status::Active,
        avatar: String::new(),
        position: Position::seat("be-01"),
        facing: Facing::Down,
        joined_at: 1,
        updated_at: 1,
        claimed_at: 1,
        is_local: false,
    }
}

// =============================================================================
// LOG
// =============================================================================

#[test]
fn echo_of_same_id_is_appended_once() {
    let mut log = ChatLog::new(100);
    assert!(log.append(message("m-1", "me", "Ann")));
    for _ in 0..5 {
        assert!(!log.append(message("m-1", "me", "Ann")));
    }
    assert_eq!(log.len(), 1);
    assert!(log.contains("m-1"));
}

#[test]
fn ring_evicts_oldest_and_forgets_its_id() {
    let mut log = ChatLog::new(3);
    for i in 0..5 {
        log.append(message(&format!("m-{i}"), "a", "A"));
    }
    let ids: Vec<&str> = log.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m-2", "m-3", "m-4"]);
    assert_eq!(log.seen_len(), 3);
    assert!(!log.contains("m-0"));
    // An evicted id is accepted again.
    assert!(log.append(message("m-0", "a", "A")));
}

#[test]
fn message_text_is_trimmed_and_capped() {
    assert_eq!(sanitize_message_text("  hello  ", 300).as_deref(), Some("hello"));
    assert_eq!(sanitize_message_text(&"x".repeat(400), 300).map(|t| t.len()), Some(300));
    assert_eq!(sanitize_message_text(" \n ", 300), None);
}

#[test]
fn message_accepts_float_created_at() {
    let json = serde_json::json!({
        "id": "m-9", "sender_client_id": "a", "nickname": "A", "text": "yo", "created_at": 12.0
    });
    let m: ChatMessage = serde_json::from_value(json).expect("message");
    assert_eq!(m.created_at, 12);
}

// =============================================================================
// BUBBLES
// =============================================================================

fn said(id: &str, text: &str, created_at: i64) -> ChatMessage {
    ChatMessage { text: text.into(), created_at, ..message(id, "a", "Ann") }
}

#[test]
fn bubble_replaces_previous_text() {
    let mut board = BubbleBoard::new(6_000);
    let id = ClientId::new("a");
    assert!(board.show(&id, &said("m-1", "first", 0), 0));
    assert!(board.show(&id, &said("m-2", "second", 1_000), 1_000));
    assert_eq!(board.len(), 1);
    let bubble = board.get(&id).expect("bubble");
    assert_eq!(bubble.text, "second");
    assert_eq!(bubble.expires_at, 7_000);
}

#[test]
fn late_older_message_keeps_newer_bubble() {
    let mut board = BubbleBoard::new(6_000);
    let id = ClientId::new("a");
    board.show(&id, &said("m-2", "newer", 2_000), 2_100);
    assert!(!board.show(&id, &said("m-1", "older", 1_500), 2_200));
    let bubble = board.get(&id).expect("bubble");
    assert_eq!(bubble.text, "newer");
    assert_eq!(bubble.expires_at, 8_100);

    // Same stamp is not older.
    assert!(board.show(&id, &said("m-3", "tie", 2_000), 2_300));
}

#[test]
fn sweep_reports_only_real_expiry() {
    let mut board = BubbleBoard::new(6_000);
    board.show(&ClientId::new("a"), &said("m-1", "hi", 0), 0);
    board.show(&ClientId::new("b"), &said("m-2", "yo", 3_000), 3_000);

    assert!(!board.sweep(5_999));
    assert!(board.sweep(6_000));
    assert_eq!(board.len(), 1);
    assert!(!board.sweep(6_500));
    assert!(board.sweep(9_000));
    assert!(board.is_empty());
}

// =============================================================================
// SENDER RESOLUTION
// =============================================================================

#[test]
fn sender_id_wins_over_nickname() {
    let people = [participant("a", "Ann"), participant("b", "Bob")];
    let resolved = resolve_sender(&message("m", "b", "Ann"), &people);
    assert_eq!(resolved, Some(ClientId::new("b")));
}

#[test]
fn unique_nickname_resolves_case_insensitively() {
    let people = [participant("a", "Ann"), participant("b", "Bob")];
    let resolved = resolve_sender(&message("m", "gone", "ann"), &people);
    assert_eq!(resolved, Some(ClientId::new("a")));
}

#[test]
fn duplicate_nickname_gets_no_attribution() {
    let people = [participant("a", "Ann"), participant("b", "ANN")];
    assert_eq!(resolve_sender(&message("m", "gone", "Ann"), &people), None);
    assert_eq!(resolve_sender(&message("m", "gone", "Zed"), &people), None);
}
