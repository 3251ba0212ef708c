use super::*;

#[test]
fn room_state_new_is_empty() {
    let room = RoomState::new();
    assert!(room.clients.is_empty());
    assert!(room.presences.is_empty());
    assert!(room.snapshot().is_empty());
}

#[test]
fn snapshot_is_ordered_by_key() {
    let mut room = RoomState::new();
    let owner = Uuid::new_v4();
    for key in ["zed", "amy", "kim"] {
        room.presences
            .insert(key.to_owned(), PresenceEntry { owner, presence: test_helpers::presence(key, key, 5) });
    }
    let snapshot = room.snapshot();
    let ids: Vec<&str> = snapshot.iter().filter_map(|p| p["client_id"].as_str()).collect();
    assert_eq!(ids, vec!["amy", "kim", "zed"]);
}
