use super::*;

#[test]
fn missing_or_blank_room_defaults_to_lobby() {
    assert_eq!(RoomName::from_query(None).as_str(), "lobby");
    assert_eq!(RoomName::from_query(Some("x=1")).as_str(), "lobby");
    assert_eq!(RoomName::from_query(Some("?room=%20%20")).as_str(), "lobby");
}

#[test]
fn room_is_trimmed_and_decoded() {
    assert_eq!(RoomName::from_query(Some("?room=+design+team+")).as_str(), "design team");
    assert_eq!(RoomName::from_query(Some("a=1&room=ops&b=2")).as_str(), "ops");
}

#[test]
fn room_is_capped_at_forty_chars() {
    let long = "r".repeat(64);
    assert_eq!(RoomName::sanitize(&long).as_str().chars().count(), 40);
}

#[test]
fn room_from_full_url() {
    let room = RoomName::from_url("https://office.example/app?room=standup").expect("url");
    assert_eq!(room.as_str(), "standup");
    assert!(matches!(RoomName::from_url("not a url"), Err(OfficeError::InvalidUrl(_))));
}

#[test]
fn share_link_replaces_room_and_keeps_other_params() {
    let link = share_link("https://office.example/app?lang=ko&room=old", &RoomName::sanitize("new room")).expect("link");
    assert_eq!(link, "https://office.example/app?lang=ko&room=new+room");
}

#[test]
fn share_link_round_trips_through_from_url() {
    let room = RoomName::sanitize("  팀 회의  ");
    let link = share_link("https://office.example/", &room).expect("link");
    assert_eq!(RoomName::from_url(&link).expect("parse"), room);
}
