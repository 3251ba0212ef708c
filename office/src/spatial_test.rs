use super::*;
use crate::config::GeometryConfig;
use crate::geometry::MeasuredLayout;

fn free_roam() -> FreeRoam {
    FreeRoam::new(Layout::from_measured(&MeasuredLayout::default_office(1280.0, 800.0), &GeometryConfig::default()))
}

fn meeting(room: &str) -> Position {
    Position::Meeting { room_id: room.to_owned(), x_pct: 50.0, y_pct: 50.0 }
}

// =============================================================================
// MODE
// =============================================================================

#[test]
fn spatial_mode_parses_config_spellings() {
    assert_eq!(SpatialMode::parse("seats").expect("seats"), SpatialMode::Seats);
    assert_eq!(SpatialMode::parse(" Free-Roam ").expect("free roam"), SpatialMode::FreeRoam);
    assert!(matches!(SpatialMode::parse("hover"), Err(OfficeError::InvalidConfig(_))));
    assert_eq!(SpatialMode::FreeRoam.as_str(), "free_roam");
}

#[test]
fn position_serializes_with_kind_tag() {
    let json = serde_json::to_value(Position::seat("be-01")).expect("serialize");
    assert_eq!(json, serde_json::json!({"kind": "seat", "seat_id": "be-01"}));
    let back: Position = serde_json::from_value(serde_json::json!({"kind": "point", "x": 10, "y": 20})).expect("point");
    assert_eq!(back.point(), Some(Point::new(10.0, 20.0)));
}

// =============================================================================
// SEAT GRID
// =============================================================================

#[test]
fn seat_grid_assigns_first_canonical_seat() {
    let grid = SeatGrid::default_office();
    assert_eq!(grid.assign_position(None, &[]), Some(Position::seat("be-01")));
    assert_eq!(grid.seats().len(), 14);
}

#[test]
fn seat_grid_honors_free_preferred_seat() {
    let grid = SeatGrid::default_office();
    let preferred = Position::seat("ds-02");
    assert_eq!(grid.assign_position(Some(&preferred), &[]), Some(preferred));
}

#[test]
fn seat_grid_skips_taken_preferred_seat() {
    let grid = SeatGrid::default_office();
    let others = [Position::seat("be-01"), Position::seat("ds-02")];
    let assigned = grid.assign_position(Some(&Position::seat("ds-02")), &others);
    assert_eq!(assigned, Some(Position::seat("be-02")));
}

#[test]
fn seat_grid_full_office_assigns_nothing() {
    let grid = SeatGrid::default_office();
    let others: Vec<Position> = grid.seats().iter().map(|s| Position::seat(&s.id)).collect();
    assert_eq!(grid.assign_position(None, &others), None);
}

#[test]
fn seat_grid_rejects_pm_unknown_and_taken_seats() {
    let grid = SeatGrid::default_office();
    let others = [Position::seat("fe-01")];
    assert_eq!(grid.is_valid_move(None, &Position::seat(PM_SEAT_ID), &others), Err(MoveRejection::PmSeat));
    assert_eq!(
        grid.is_valid_move(None, &Position::seat("zz-99"), &others),
        Err(MoveRejection::UnknownSeat("zz-99".into()))
    );
    assert_eq!(
        grid.is_valid_move(None, &Position::seat("fe-01"), &others),
        Err(MoveRejection::SeatTaken("fe-01".into()))
    );
    assert_eq!(grid.is_valid_move(None, &Position::at(Point::new(1.0, 1.0)), &others), Err(MoveRejection::Blocked));
}

#[test]
fn seat_grid_meeting_rooms_hold_two() {
    let grid = SeatGrid::default_office();
    assert_eq!(grid.zone_capacity("room-a"), Some(2));
    assert_eq!(grid.zone_capacity("lobby"), None);

    let one = [Position::seat("mt-a1")];
    assert_eq!(grid.zone_entry("room-a", &one), Ok(Position::seat("mt-a2")));

    let two = [Position::seat("mt-a1"), Position::seat("mt-a2")];
    assert_eq!(grid.zone_entry("room-a", &two), Err(MoveRejection::ZoneFull { room_id: "room-a".into() }));
    assert_eq!(grid.zone_entry("room-z", &[]), Err(MoveRejection::UnknownRoom("room-z".into())));
}

#[test]
fn seat_grid_roles_and_zones() {
    let grid = SeatGrid::default_office();
    assert_eq!(grid.role_for(&Position::seat("be-02")), "Backend");
    assert_eq!(grid.role_for(&Position::seat("mt-b1")), "Meeting");
    assert_eq!(grid.role_for(&Position::seat(PM_SEAT_ID)), "PM");
    assert_eq!(grid.detect_zone(&Position::seat("mt-b2")).as_deref(), Some("room-b"));
    assert_eq!(grid.detect_zone(&Position::seat("ops-01")), None);

    let counts = grid.occupancy(&[Position::seat("mt-a1"), Position::seat("mt-b1"), Position::seat("mt-b2")]);
    assert_eq!(counts.get("room-a"), Some(&1));
    assert_eq!(counts.get("room-b"), Some(&2));
}

// =============================================================================
// FREE ROAM
// =============================================================================

#[test]
fn free_roam_first_spawn_when_empty() {
    let model = free_roam();
    let first = model.layout().and_then(|l| l.spawn_points.first().copied()).expect("spawn");
    assert_eq!(model.assign_position(None, &[]), Some(Position::at(first)));
}

#[test]
fn free_roam_spreads_new_arrivals() {
    let model = free_roam();
    let layout = model.layout().expect("layout");
    let first = layout.spawn_points[0];
    let others = [Position::at(first)];

    let assigned = model.assign_position(None, &others).and_then(|p| p.point()).expect("point");
    let chosen = assigned.distance(first);
    for spawn in &layout.spawn_points {
        assert!(spawn.distance(first) <= chosen + 1e-9);
    }
}

#[test]
fn free_roam_snaps_colliding_preferred_point() {
    let model = free_roam();
    let layout = model.layout().expect("layout");
    // Inside the be-01 desk.
    let preferred = Position::at(Point::new(160.0, 280.0));
    let assigned = model.assign_position(Some(&preferred), &[]).and_then(|p| p.point()).expect("point");
    assert!(!layout.collides_at(assigned.x, assigned.y));
}

#[test]
fn free_roam_gates_full_room_from_outside_only() {
    let model = free_roam();
    let inside = Position::at(Point::new(780.0, 620.0));
    let outside = Position::at(Point::new(640.0, 400.0));
    let others: Vec<Position> = (0..4).map(|_| meeting("room-a")).collect();

    assert_eq!(
        model.is_valid_move(Some(&outside), &inside, &others),
        Err(MoveRejection::ZoneFull { room_id: "room-a".into() })
    );
    let also_inside = Position::at(Point::new(785.0, 620.0));
    assert_eq!(model.is_valid_move(Some(&inside), &also_inside, &others), Ok(()));
    assert_eq!(model.is_valid_move(Some(&outside), &inside, &others[..3]), Ok(()));
}

#[test]
fn free_roam_blocks_colliders() {
    let model = free_roam();
    assert_eq!(model.is_valid_move(None, &Position::at(Point::new(160.0, 280.0)), &[]), Err(MoveRejection::Blocked));
    assert_eq!(model.is_valid_move(None, &Position::seat("be-01"), &[]), Err(MoveRejection::Blocked));
}

#[test]
fn free_roam_zone_entry_uses_scene_entry_point() {
    let model = free_roam();
    let entry = model.zone_entry("room-b", &[]).expect("entry");
    assert_eq!(entry, Position::Meeting { room_id: "room-b".into(), x_pct: 50.0, y_pct: 78.0 });
    assert_eq!(model.zone_capacity("room-b"), Some(4));
    assert_eq!(model.role_for(&entry), "Meeting");
}

#[test]
fn build_model_follows_mode() {
    let layout = Layout::from_measured(&MeasuredLayout::default_office(1280.0, 800.0), &GeometryConfig::default());
    assert_eq!(build_model(SpatialMode::Seats, layout.clone()).mode(), SpatialMode::Seats);
    assert_eq!(build_model(SpatialMode::FreeRoam, layout).mode(), SpatialMode::FreeRoam);
}

#[test]
fn rejection_maps_to_office_error() {
    let err: OfficeError = MoveRejection::ZoneFull { room_id: "room-a".into() }.into();
    assert_eq!(err, OfficeError::ZoneFull { room_id: "room-a".into() });
}
