//! Static office geometry: colliders, spawn points, and room zones.
//!
//! A [`Layout`] is derived from a [`MeasuredLayout`], the rectangles the host
//! measured for rendered desks, plants and meeting rooms. It is static until
//! the host reports a new measurement (resize, layout change), at which point
//! the session rebuilds it and revalidates every continuous position.
//!
//! Positions are feet anchors: the avatar box is centered horizontally on
//! the point and extends upward by the avatar height.

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use serde::{Deserialize, Serialize};

use crate::config::GeometryConfig;

/// A point in world pixels, or in scene percent inside a meeting scene.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle. `x`/`y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Strict overlap; rectangles that only share an edge do not intersect.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right() && self.right() > other.x && self.y < other.bottom() && self.bottom() > other.y
    }

    /// Inclusive point containment.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Shrink by `margin` on every side. Collapses to zero size, never negative.
    #[must_use]
    pub fn inset(&self, margin: f64) -> Rect {
        let width = (self.width - margin * 2.0).max(0.0);
        let height = (self.height - margin * 2.0).max(0.0);
        Rect::new(self.x + margin, self.y + margin, width, height)
    }
}

// =============================================================================
// MEASURED INPUT
// =============================================================================

/// What a measured element is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementKind {
    Desk {
        #[serde(default)]
        seat_id: Option<String>,
    },
    Plant,
    MeetingRoom {
        room_id: String,
        capacity: usize,
        door_width: f64,
        /// Table rectangle in world pixels, if the room renders one.
        #[serde(default)]
        table: Option<Rect>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutElement {
    #[serde(flatten)]
    pub kind: ElementKind,
    pub rect: Rect,
}

/// Rendered obstacle rectangles as measured by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredLayout {
    pub world_width: f64,
    pub world_height: f64,
    pub elements: Vec<LayoutElement>,
}

impl MeasuredLayout {
    /// The stock office floor scaled to a `width` x `height` world.
    #[must_use]
    pub fn default_office(width: f64, height: f64) -> Self {
        let desk = |seat: &str, fx: f64, fy: f64| LayoutElement {
            kind: ElementKind::Desk { seat_id: Some(seat.to_owned()) },
            rect: Rect::new(fx * width, fy * height, 0.09 * width, 0.06 * height),
        };
        let room = |id: &str, fx: f64| {
            let rect = Rect::new(fx * width, 0.50 * height, 0.17 * width, 0.30 * height);
            LayoutElement {
                kind: ElementKind::MeetingRoom {
                    room_id: id.to_owned(),
                    capacity: 4,
                    door_width: 0.06 * width,
                    table: Some(Rect::new(
                        rect.x + rect.width * 0.3,
                        rect.y + rect.height * 0.3,
                        rect.width * 0.4,
                        rect.height * 0.3,
                    )),
                },
                rect,
            }
        };
        let plant = |fx: f64| LayoutElement {
            kind: ElementKind::Plant,
            rect: Rect::new(fx * width, 0.90 * height, 0.03 * width, 0.05 * height),
        };

        let elements = vec![
            LayoutElement {
                kind: ElementKind::Desk { seat_id: Some("pm-02".to_owned()) },
                rect: Rect::new(0.45 * width, 0.08 * height, 0.10 * width, 0.06 * height),
            },
            desk("be-01", 0.08, 0.30),
            desk("be-02", 0.20, 0.30),
            desk("be-03", 0.32, 0.30),
            desk("fe-01", 0.56, 0.30),
            desk("fe-02", 0.68, 0.30),
            desk("fe-03", 0.80, 0.30),
            desk("ds-01", 0.08, 0.55),
            desk("ds-02", 0.20, 0.55),
            desk("ops-01", 0.32, 0.55),
            desk("ops-02", 0.44, 0.55),
            room("room-a", 0.58),
            room("room-b", 0.78),
            plant(0.02),
            plant(0.50),
        ];

        Self { world_width: width, world_height: height, elements }
    }
}

// =============================================================================
// LAYOUT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColliderSource {
    Desk,
    Plant,
    Wall,
    Table,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collider {
    pub rect: Rect,
    pub source: ColliderSource,
}

/// A meeting room: a capacity-limited rectangle with a doorway.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomZone {
    pub id: String,
    pub rect: Rect,
    pub capacity: usize,
    /// Doorway gap in the bottom wall, world pixels.
    pub door: Rect,
    /// Where a participant lands when leaving the meeting scene.
    pub exit_point: Point,
    /// Scene-space (percent) obstacle for the meeting table.
    pub table_pct: Rect,
    /// Scene-space (percent) doorway that ends the scene.
    pub door_pct: Rect,
    /// Scene-space (percent) starting point inside the scene.
    pub entry_pct: Point,
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub world_width: f64,
    pub world_height: f64,
    pub colliders: Vec<Collider>,
    pub spawn_points: Vec<Point>,
    pub zones: Vec<RoomZone>,
    config: GeometryConfig,
}

impl Layout {
    /// Derive colliders, zones and spawn candidates from measured elements.
    #[must_use]
    pub fn from_measured(measured: &MeasuredLayout, config: &GeometryConfig) -> Self {
        let mut layout = Self {
            world_width: measured.world_width,
            world_height: measured.world_height,
            colliders: Vec::new(),
            spawn_points: Vec::new(),
            zones: Vec::new(),
            config: config.clone(),
        };

        let mut desk_spawns = Vec::new();
        for element in &measured.elements {
            match &element.kind {
                ElementKind::Desk { .. } => {
                    layout.colliders.push(Collider { rect: element.rect, source: ColliderSource::Desk });
                    let r = element.rect;
                    desk_spawns.push(Point::new(
                        r.center().x,
                        r.bottom() + config.desk_spawn_offset + config.avatar_height,
                    ));
                }
                ElementKind::Plant => {
                    layout.colliders.push(Collider { rect: element.rect, source: ColliderSource::Plant });
                }
                ElementKind::MeetingRoom { room_id, capacity, door_width, table } => {
                    let zone = layout.add_room(room_id, element.rect, *capacity, *door_width, *table);
                    layout.zones.push(zone);
                }
            }
        }

        let grid = layout.grid_points();
        layout.spawn_points = desk_spawns
            .into_iter()
            .chain(grid)
            .filter(|p| !layout.collides_at(p.x, p.y) && layout.detect_room_id_at(p.x, p.y).is_none())
            .collect();
        layout
    }

    fn add_room(&mut self, id: &str, rect: Rect, capacity: usize, door_width: f64, table: Option<Rect>) -> RoomZone {
        let t = self.config.wall_thickness;
        let door_width = door_width.clamp(0.0, rect.width);
        let door_x0 = rect.x + (rect.width - door_width) / 2.0;
        let door_x1 = door_x0 + door_width;
        let bottom_y = rect.bottom() - t;

        let walls = [
            Rect::new(rect.x, rect.y, rect.width, t),
            Rect::new(rect.x, rect.y, t, rect.height),
            Rect::new(rect.right() - t, rect.y, t, rect.height),
            Rect::new(rect.x, bottom_y, door_x0 - rect.x, t),
            Rect::new(door_x1, bottom_y, rect.right() - door_x1, t),
        ];
        for wall in walls.into_iter().filter(|w| w.width > 0.0 && w.height > 0.0) {
            self.colliders.push(Collider { rect: wall, source: ColliderSource::Wall });
        }
        if let Some(table) = table {
            self.colliders.push(Collider { rect: table, source: ColliderSource::Table });
        }

        let to_pct = |r: Rect| {
            Rect::new(
                (r.x - rect.x) / rect.width * 100.0,
                (r.y - rect.y) / rect.height * 100.0,
                r.width / rect.width * 100.0,
                r.height / rect.height * 100.0,
            )
        };
        let table_pct = table.map_or(Rect::new(30.0, 30.0, 40.0, 30.0), to_pct);
        let door_pct = Rect::new(
            (door_x0 - rect.x) / rect.width * 100.0,
            90.0,
            door_width / rect.width * 100.0,
            10.0,
        );

        RoomZone {
            id: id.to_owned(),
            rect,
            capacity,
            door: Rect::new(door_x0, bottom_y, door_width, t),
            exit_point: Point::new((door_x0 + door_x1) / 2.0, rect.bottom() + self.config.avatar_height + 4.0),
            table_pct,
            door_pct,
            entry_pct: Point::new(50.0, 78.0),
        }
    }

    fn grid_points(&self) -> Vec<Point> {
        let step = self.config.spawn_grid_step;
        if step <= 0.0 {
            return Vec::new();
        }
        let mut points = Vec::new();
        let mut y = step / 2.0;
        while y < self.world_height {
            let mut x = step / 2.0;
            while x < self.world_width {
                points.push(Point::new(x, y));
                x += step;
            }
            y += step;
        }
        points
    }

    /// The avatar box for a feet point.
    #[must_use]
    pub fn avatar_box(&self, x: f64, y: f64) -> Rect {
        let w = self.config.avatar_width;
        let h = self.config.avatar_height;
        Rect::new(x - w / 2.0, y - h, w, h)
    }

    /// Whether an avatar standing at `(x, y)` hits an obstacle or leaves the world.
    #[must_use]
    pub fn collides_at(&self, x: f64, y: f64) -> bool {
        let avatar = self.avatar_box(x, y);
        let m = self.config.world_margin;
        if avatar.x < m
            || avatar.y < m
            || avatar.right() > self.world_width - m
            || avatar.bottom() > self.world_height - m
        {
            return true;
        }
        self.colliders.iter().any(|c| c.rect.intersects(&avatar))
    }

    /// Clamp a feet point so the avatar box stays inside the world margin.
    #[must_use]
    pub fn clamp_point(&self, x: f64, y: f64) -> Point {
        let m = self.config.world_margin;
        let half_w = self.config.avatar_width / 2.0;
        let h = self.config.avatar_height;
        Point::new(
            x.max(m + half_w).min(self.world_width - m - half_w),
            y.max(m + h).min(self.world_height - m),
        )
    }

    /// Nearest free spot around a target using a bounded ring search.
    ///
    /// Rings are tried in the configured radius order, each sampled at the
    /// configured angular step starting from angle zero. Falls back to the
    /// clamped target when every sample collides.
    #[must_use]
    pub fn find_valid_spot_around(&self, x: f64, y: f64) -> Point {
        let origin = self.clamp_point(x, y);
        if !self.collides_at(origin.x, origin.y) {
            return origin;
        }

        let step = self.config.search_angle_step_deg;
        if step > 0.0 {
            for &radius in &self.config.search_radii {
                let mut angle = 0.0_f64;
                while angle < 360.0 {
                    let rad = angle.to_radians();
                    let candidate = self.clamp_point(origin.x + radius * rad.cos(), origin.y + radius * rad.sin());
                    if !self.collides_at(candidate.x, candidate.y) {
                        return candidate;
                    }
                    angle += step;
                }
            }
        }
        origin
    }

    /// Room whose inset rectangle contains the point.
    #[must_use]
    pub fn detect_room_id_at(&self, x: f64, y: f64) -> Option<&str> {
        let p = Point::new(x, y);
        self.zones
            .iter()
            .find(|z| z.rect.inset(self.config.zone_inner_margin).contains(p))
            .map(|z| z.id.as_str())
    }

    #[must_use]
    pub fn zone(&self, id: &str) -> Option<&RoomZone> {
        self.zones.iter().find(|z| z.id == id)
    }

    #[must_use]
    pub fn world_center(&self) -> Point {
        Point::new(self.world_width / 2.0, self.world_height / 2.0)
    }
}
