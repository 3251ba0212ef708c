use super::*;

#[test]
fn defaults_are_valid() {
    let config = OfficeConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.max_participants, 14);
    assert_eq!(config.nickname_max_chars, 12);
    assert_eq!(config.spatial_mode, SpatialMode::Seats);
}

#[test]
fn heartbeat_must_stay_below_ttl() {
    let config = OfficeConfig { heartbeat_interval_ms: 45_000, presence_ttl_ms: 45_000, ..OfficeConfig::default() };
    assert!(matches!(config.validate(), Err(OfficeError::InvalidConfig(_))));

    let config = OfficeConfig { heartbeat_interval_ms: 0, ..OfficeConfig::default() };
    assert!(matches!(config.validate(), Err(OfficeError::InvalidConfig(_))));
}

#[test]
fn zero_capacity_is_rejected() {
    let config = OfficeConfig { max_participants: 0, ..OfficeConfig::default() };
    assert!(matches!(config.validate(), Err(OfficeError::InvalidConfig(_))));
}

#[test]
fn partial_json_fills_defaults() {
    let config: OfficeConfig =
        serde_json::from_str(r#"{"max_participants": 4, "spatial_mode": "free_roam", "movement": {"speed_px_per_sec": 90.0}}"#)
            .expect("config json");
    assert_eq!(config.max_participants, 4);
    assert_eq!(config.spatial_mode, SpatialMode::FreeRoam);
    assert!((config.movement.speed_px_per_sec - 90.0).abs() < f64::EPSILON);
    assert_eq!(config.movement.max_frame_delta_ms, 100);
    assert_eq!(config.presence_ttl_ms, DEFAULT_PRESENCE_TTL_MS);
    assert_eq!(config.geometry.search_radii.len(), 9);
}

#[test]
fn env_parse_falls_back_when_unset() {
    assert_eq!(env_parse("OFFICE_TEST_UNSET_VARIABLE_FOR_PARSE", 7_usize), 7);
}

#[test]
fn invalid_override_keeps_default() {
    assert_eq!(parse_override("OFFICE_MAX_PARTICIPANTS", "lots", 14_usize), 14);
    assert_eq!(parse_override("OFFICE_MAX_PARTICIPANTS", "-3", 14_usize), 14);
    assert!((parse_override("OFFICE_MOVE_SPEED", "fast", 180.0_f64) - 180.0).abs() < f64::EPSILON);
}

#[test]
fn valid_override_is_trimmed_and_applied() {
    assert_eq!(parse_override("OFFICE_MAX_PARTICIPANTS", " 8 ", 14_usize), 8);
    assert_eq!(parse_override("OFFICE_BUBBLE_TTL_MS", "2500", 4_000_i64), 2_500);
}
