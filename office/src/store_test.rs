use super::*;
use crate::spatial::Position;

#[test]
fn keys_embed_room_and_client() {
    let room = RoomName::sanitize("ops");
    assert_eq!(position_key(&room), "agentoffice_position_v1:ops");
    assert_eq!(avatar_key(&room, &ClientId::new("c1")), "agentoffice_avatar_v1:ops:c1");
}

#[test]
fn client_id_is_created_once() {
    let mut store = MemoryStore::new();
    let first = load_or_create_client_id(&mut store);
    let second = load_or_create_client_id(&mut store);
    assert_eq!(first, second);
    assert_eq!(store.get(CLIENT_ID_KEY).as_deref(), Some(first.as_str()));
}

#[test]
fn blank_client_id_is_replaced() {
    let mut store = MemoryStore::new();
    store.set(CLIENT_ID_KEY, "  ");
    let id = load_or_create_client_id(&mut store);
    assert!(!id.as_str().trim().is_empty());
}

#[test]
fn json_values_round_trip_and_garbage_reads_as_absent() {
    let mut store = MemoryStore::new();
    save_json(&mut store, "pos", &Position::seat("fe-02"));
    assert_eq!(load_json::<Position>(&store, "pos"), Some(Position::seat("fe-02")));

    store.set("pos", "{not json");
    assert_eq!(load_json::<Position>(&store, "pos"), None);
    assert_eq!(load_json::<Position>(&store, "missing"), None);
}

#[test]
fn memory_store_serializes_as_flat_object() {
    let mut store = MemoryStore::new();
    store.set(NICKNAME_KEY, "Ann");
    let json = serde_json::to_value(&store).expect("serialize");
    assert_eq!(json, serde_json::json!({"agentoffice_nickname_v1": "Ann"}));
    store.remove(NICKNAME_KEY);
    assert!(store.is_empty());
}
