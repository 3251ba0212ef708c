use super::*;

fn office() -> Layout {
    Layout::from_measured(&MeasuredLayout::default_office(1280.0, 800.0), &GeometryConfig::default())
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn rect_edges_touching_do_not_intersect() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(10.0, 0.0, 10.0, 10.0);
    assert!(!a.intersects(&b));
    assert!(a.intersects(&Rect::new(9.0, 9.0, 5.0, 5.0)));
}

#[test]
fn rect_inset_never_goes_negative() {
    let r = Rect::new(0.0, 0.0, 8.0, 8.0).inset(6.0);
    assert!(close(r.width, 0.0));
    assert!(close(r.height, 0.0));
}

#[test]
fn collides_outside_world_margin() {
    let layout = office();
    assert!(layout.collides_at(10.0, 10.0));
    assert!(layout.collides_at(1279.0, 400.0));
}

#[test]
fn collides_with_desk() {
    let layout = office();
    // be-01 desk spans y 240..288 starting at x 102.4.
    assert!(layout.collides_at(160.0, 280.0));
    assert!(!layout.collides_at(640.0, 400.0));
}

#[test]
fn clamp_point_keeps_avatar_inside_margin() {
    let layout = office();
    let low = layout.clamp_point(0.0, 0.0);
    assert!(close(low.x, 22.0) && close(low.y, 44.0));
    let high = layout.clamp_point(5_000.0, 5_000.0);
    assert!(close(high.x, 1258.0) && close(high.y, 792.0));
}

#[test]
fn valid_spot_returns_free_target_unchanged() {
    let layout = office();
    let spot = layout.find_valid_spot_around(640.0, 400.0);
    assert!(close(spot.x, 640.0) && close(spot.y, 400.0));
}

#[test]
fn valid_spot_escapes_a_desk() {
    let layout = office();
    let spot = layout.find_valid_spot_around(160.0, 280.0);
    assert!(!layout.collides_at(spot.x, spot.y));
    assert!(spot.distance(Point::new(160.0, 280.0)) <= 160.0 + 1e-6);
}

#[test]
fn detect_room_honors_inner_margin() {
    let layout = office();
    let zone = layout.zone("room-a").expect("room-a");
    let center = zone.rect.center();
    assert_eq!(layout.detect_room_id_at(center.x, center.y), Some("room-a"));
    assert_eq!(layout.detect_room_id_at(zone.rect.x + 3.0, center.y), None);
    assert_eq!(layout.detect_room_id_at(640.0, 400.0), None);
}

#[test]
fn doorway_is_passable_and_walls_are_not() {
    let layout = office();
    let zone = layout.zone("room-a").expect("room-a");
    let door_center = zone.door.center().x;
    let bottom = zone.rect.bottom();
    assert!(!layout.collides_at(door_center, bottom));
    assert!(layout.collides_at(zone.rect.x + 28.0, bottom));
}

#[test]
fn exit_point_is_outside_the_room() {
    let layout = office();
    for zone in &layout.zones {
        assert!(zone.exit_point.y > zone.rect.bottom());
        assert!(!layout.collides_at(zone.exit_point.x, zone.exit_point.y));
        assert_eq!(zone.capacity, 4);
    }
}

#[test]
fn spawn_points_start_with_desks_and_are_all_free() {
    let layout = office();
    let first = layout.spawn_points.first().copied().expect("spawn points");
    // PM desk is the first measured element.
    assert!(close(first.x, 640.0) && close(first.y, 156.0));
    for p in &layout.spawn_points {
        assert!(!layout.collides_at(p.x, p.y), "spawn {p:?} collides");
        assert!(layout.detect_room_id_at(p.x, p.y).is_none(), "spawn {p:?} inside a room");
    }
}

#[test]
fn measured_layout_parses_from_host_json() {
    let measured: MeasuredLayout = serde_json::from_str(
        r#"{
            "world_width": 400, "world_height": 300,
            "elements": [
                {"kind": "plant", "rect": {"x": 10, "y": 10, "width": 20, "height": 20}},
                {"kind": "desk", "seat_id": "be-01", "rect": {"x": 100, "y": 100, "width": 60, "height": 30}}
            ]
        }"#,
    )
    .expect("measured json");
    let layout = Layout::from_measured(&measured, &GeometryConfig::default());
    assert_eq!(layout.colliders.len(), 2);
    assert!(layout.zones.is_empty());
}
