use super::*;
use office::presence::{ClientId, PM_CLIENT_ID, PM_NAME, Status};

fn roster() -> Roster {
    Roster::new(ClientId::new("me"), &OfficeConfig::default())
}

#[test]
fn room_url_appends_sanitized_room() {
    let url = room_url("ws://127.0.0.1:3000/api/ws", &RoomName::sanitize("  design team ")).expect("room url");
    assert_eq!(url, "ws://127.0.0.1:3000/api/ws?room=design+team");
}

#[test]
fn room_url_rejects_http_and_garbage() {
    assert!(matches!(room_url("http://host/api/ws", &RoomName::sanitize("ops")), Err(CliError::InvalidRelayUrl(_))));
    assert!(matches!(room_url("not a url", &RoomName::sanitize("ops")), Err(CliError::InvalidRelayUrl(_))));
}

#[test]
fn health_url_maps_ws_schemes_to_http() {
    assert_eq!(health_url("ws://127.0.0.1:3000/api/ws?room=ops").expect("ws"), "http://127.0.0.1:3000/healthz");
    assert_eq!(health_url("wss://office.example.com/api/ws").expect("wss"), "https://office.example.com/healthz");
    assert!(matches!(health_url("ftp://host/x"), Err(CliError::InvalidRelayUrl(_))));
}

#[test]
fn explicit_relay_flag_wins() {
    assert_eq!(resolve_relay_url(Some(" ws://relay/api/ws ".to_owned())).expect("flag"), "ws://relay/api/ws");
}

#[test]
fn positions_read_naturally() {
    assert_eq!(describe_position(&Position::seat("be-01")), "be-01");
    assert_eq!(describe_position(&Position::Point { x: 640.4, y: 155.6 }), "(640, 156)");
    assert_eq!(
        describe_position(&Position::Meeting { room_id: "mt-a".to_owned(), x_pct: 25.0, y_pct: 60.0 }),
        "mt-a [25%, 60%]"
    );
}

#[test]
fn joins_name_the_participant_and_updates_are_quiet() {
    let roster = roster();
    let pm = ClientId::new(PM_CLIENT_ID);
    let line = describe_change(&RosterChange::Joined(pm.clone()), &roster).expect("joined line");
    assert_eq!(line, format!("+ {PM_NAME} (PM) at pm-02"));
    assert_eq!(describe_change(&RosterChange::Updated(pm), &roster), None);
    assert_eq!(describe_change(&RosterChange::Joined(ClientId::new("ghost")), &roster), None);
}

#[test]
fn local_changes_are_flagged() {
    let roster = roster();
    let moved = RosterChange::LocalReassigned { from: Position::seat("be-01"), to: Position::seat("be-02") };
    assert_eq!(describe_change(&moved, &roster).as_deref(), Some("! seat lost: be-01 -> be-02"));
    let evicted = describe_change(&RosterChange::LocalEvicted(OfficeError::CapacityExceeded { max: 12 }), &roster).expect("evicted line");
    assert_eq!(evicted, "! removed from room: room is full (max 12 participants)");
    assert_eq!(describe_change(&RosterChange::Left(ClientId::new("bob")), &roster).as_deref(), Some("- bob"));
}

#[test]
fn messages_and_roster_lines() {
    let message = ChatMessage {
        id: "m-1".to_owned(),
        sender_client_id: ClientId::new("bob"),
        nickname: "Bob".to_owned(),
        text: "hello".to_owned(),
        created_at: 1,
    };
    assert_eq!(format_message(&message), "<Bob> hello");

    let lines = format_roster(&roster().snapshot());
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(PM_NAME));
    assert!(lines[0].contains(Status::Active.label()));
    assert!(lines[0].contains("활동중"));
    assert!(lines[0].ends_with("pm-02"));
}

#[test]
fn nickname_flag_wins_then_saved_name() {
    assert_eq!(resolve_nickname(Some("Ann"), Some("Old")).as_deref(), Ok("Ann"));
    assert_eq!(resolve_nickname(None, Some(" Old ")).as_deref(), Ok("Old"));
    assert_eq!(resolve_nickname(Some("  "), Some("Old")).as_deref(), Ok("Old"));
    assert_eq!(resolve_nickname(None, None), Err(OfficeError::InvalidNickname));
    assert_eq!(resolve_nickname(Some(" "), Some("")), Err(OfficeError::InvalidNickname));
}

#[test]
fn saved_nickname_survives_into_next_run() {
    use crate::store::JsonFileStore;
    use office::store::{KeyValueStore, NICKNAME_KEY};

    let path = std::env::temp_dir().join(format!("office-bot-{}-rejoin.json", std::process::id()));
    JsonFileStore::open(&path).set(NICKNAME_KEY, "Ann");

    let (tx, _rx) = mpsc::unbounded_channel();
    let session = Session::new(OfficeConfig::default(), RoomName::sanitize("lobby"), QueueChannel { tx }, JsonFileStore::open(&path));
    assert_eq!(resolve_nickname(None, session.saved_nickname()).as_deref(), Ok("Ann"));
    std::fs::remove_file(&path).expect("cleanup");
}
