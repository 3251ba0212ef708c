//! Spatial strategies: where a participant may be, and what zone it is in.
//!
//! DESIGN
//! ======
//! One [`SpatialModel`] trait with two implementations selected by
//! [`SpatialMode`]:
//!
//! - [`SeatGrid`]: a fixed, canonically ordered list of seats. Meeting-room
//!   slots are seats tagged with a zone, so a zone's capacity is its seat
//!   count.
//! - [`FreeRoam`]: continuous positions on a measured [`Layout`], gated by
//!   colliders and room-zone capacities.
//!
//! The presence reconciler and the movement controller only talk to the
//! trait, so seat contention, spawn choice and zone gating are identical for
//! both modes wherever the concept exists.

#[cfg(test)]
#[path = "spatial_test.rs"]
mod spatial_test;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::OfficeError;
use crate::geometry::{Layout, Point};

/// Seat bound to the synthetic PM participant.
pub const PM_SEAT_ID: &str = "pm-02";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialMode {
    #[default]
    Seats,
    FreeRoam,
}

impl SpatialMode {
    /// Parse a mode name as written in config (`seats`, `free_roam`).
    ///
    /// # Errors
    ///
    /// Returns [`OfficeError::InvalidConfig`] for any other value.
    pub fn parse(raw: &str) -> Result<Self, OfficeError> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "seats" | "seat" => Ok(Self::Seats),
            "free_roam" | "freeroam" => Ok(Self::FreeRoam),
            other => Err(OfficeError::InvalidConfig(format!("unknown spatial mode: {other}"))),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seats => "seats",
            Self::FreeRoam => "free_roam",
        }
    }
}

/// Where a participant is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Position {
    Seat { seat_id: String },
    /// World pixels, feet anchor.
    Point { x: f64, y: f64 },
    /// Percent of the meeting scene container.
    Meeting { room_id: String, x_pct: f64, y_pct: f64 },
}

impl Position {
    #[must_use]
    pub fn seat(seat_id: &str) -> Self {
        Self::Seat { seat_id: seat_id.to_owned() }
    }

    #[must_use]
    pub fn at(point: Point) -> Self {
        Self::Point { x: point.x, y: point.y }
    }

    #[must_use]
    pub fn seat_id(&self) -> Option<&str> {
        match self {
            Self::Seat { seat_id } => Some(seat_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn point(&self) -> Option<Point> {
        match self {
            Self::Point { x, y } => Some(Point::new(*x, *y)),
            _ => None,
        }
    }

    /// Whether two positions claim the same exclusive slot.
    ///
    /// Only seats are exclusive; continuous points may overlap.
    #[must_use]
    pub fn same_seat(&self, other: &Position) -> bool {
        matches!((self.seat_id(), other.seat_id()), (Some(a), Some(b)) if a == b)
    }
}

/// Why a move or an assignment was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveRejection {
    /// The destination collides or is not expressible in this mode.
    Blocked,
    ZoneFull { room_id: String },
    SeatTaken(String),
    UnknownSeat(String),
    UnknownRoom(String),
    PmSeat,
}

impl From<MoveRejection> for OfficeError {
    fn from(rejection: MoveRejection) -> Self {
        match rejection {
            MoveRejection::Blocked => OfficeError::NotPermitted("destination is blocked".into()),
            MoveRejection::ZoneFull { room_id } => OfficeError::ZoneFull { room_id },
            MoveRejection::SeatTaken(seat) => OfficeError::SeatTaken(seat),
            MoveRejection::UnknownSeat(seat) => OfficeError::UnknownSeat(seat),
            MoveRejection::UnknownRoom(room) => OfficeError::UnknownRoom(room),
            MoveRejection::PmSeat => OfficeError::NotPermitted("the PM seat is reserved".into()),
        }
    }
}

/// Strategy seam shared by fixed-seat and free-roam offices.
///
/// `others` is always the positions of every participant except the one
/// being placed, PM excluded.
pub trait SpatialModel: std::fmt::Debug {
    fn mode(&self) -> SpatialMode;

    /// Pick a starting position, honoring `preferred` when it is still free.
    fn assign_position(&self, preferred: Option<&Position>, others: &[Position]) -> Option<Position>;

    /// Check a move from `from` (none when joining) to `to`.
    ///
    /// # Errors
    ///
    /// Returns the first [`MoveRejection`] that applies.
    fn is_valid_move(&self, from: Option<&Position>, to: &Position, others: &[Position]) -> Result<(), MoveRejection>;

    fn detect_zone(&self, position: &Position) -> Option<String>;

    fn role_for(&self, position: &Position) -> String;

    fn zone_capacity(&self, zone_id: &str) -> Option<usize>;

    /// Position a participant takes when entering the meeting room `zone_id`.
    ///
    /// # Errors
    ///
    /// [`MoveRejection::UnknownRoom`] for an unknown zone,
    /// [`MoveRejection::ZoneFull`] when it is at capacity.
    fn zone_entry(&self, zone_id: &str, others: &[Position]) -> Result<Position, MoveRejection>;

    /// Measured layout backing this model, if any.
    fn layout(&self) -> Option<&Layout> {
        None
    }

    /// Swap in a re-measured layout. Seat grids ignore it.
    fn relayout(&mut self, _layout: Layout) {}

    /// Member count per zone for the given positions.
    fn occupancy(&self, positions: &[Position]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for position in positions {
            if let Some(zone) = self.detect_zone(position) {
                *counts.entry(zone).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Whether entering `zone_id` from outside would exceed its capacity.
    fn zone_is_full(&self, zone_id: &str, others: &[Position]) -> bool {
        match self.zone_capacity(zone_id) {
            Some(capacity) => self.occupancy(others).get(zone_id).copied().unwrap_or(0) >= capacity,
            None => false,
        }
    }
}

/// Build the model configured by `mode` for a measured layout.
#[must_use]
pub fn build_model(mode: SpatialMode, layout: Layout) -> Box<dyn SpatialModel> {
    match mode {
        SpatialMode::Seats => Box::new(SeatGrid::default_office()),
        SpatialMode::FreeRoam => Box::new(FreeRoam::new(layout)),
    }
}

// =============================================================================
// SEAT GRID
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatSpec {
    pub id: String,
    pub role: String,
    pub zone: Option<String>,
}

impl SeatSpec {
    fn new(id: &str, role: &str, zone: Option<&str>) -> Self {
        Self { id: id.to_owned(), role: role.to_owned(), zone: zone.map(str::to_owned) }
    }
}

#[derive(Debug, Clone)]
pub struct SeatGrid {
    seats: Vec<SeatSpec>,
    pm_seat: String,
}

impl SeatGrid {
    #[must_use]
    pub fn new(seats: Vec<SeatSpec>, pm_seat: &str) -> Self {
        Self { seats, pm_seat: pm_seat.to_owned() }
    }

    /// The stock office: 14 member seats in canonical order plus the PM seat.
    #[must_use]
    pub fn default_office() -> Self {
        let seats = vec![
            SeatSpec::new("be-01", "Backend", None),
            SeatSpec::new("be-02", "Backend", None),
            SeatSpec::new("be-03", "Backend", None),
            SeatSpec::new("fe-01", "Frontend", None),
            SeatSpec::new("fe-02", "Frontend", None),
            SeatSpec::new("fe-03", "Frontend", None),
            SeatSpec::new("ds-01", "Design", None),
            SeatSpec::new("ds-02", "Design", None),
            SeatSpec::new("ops-01", "Ops", None),
            SeatSpec::new("ops-02", "Ops", None),
            SeatSpec::new("mt-a1", "Meeting", Some("room-a")),
            SeatSpec::new("mt-a2", "Meeting", Some("room-a")),
            SeatSpec::new("mt-b1", "Meeting", Some("room-b")),
            SeatSpec::new("mt-b2", "Meeting", Some("room-b")),
        ];
        Self::new(seats, PM_SEAT_ID)
    }

    #[must_use]
    pub fn seats(&self) -> &[SeatSpec] {
        &self.seats
    }

    fn spec(&self, seat_id: &str) -> Option<&SeatSpec> {
        self.seats.iter().find(|s| s.id == seat_id)
    }
}

impl SpatialModel for SeatGrid {
    fn mode(&self) -> SpatialMode {
        SpatialMode::Seats
    }

    fn assign_position(&self, preferred: Option<&Position>, others: &[Position]) -> Option<Position> {
        if let Some(preferred) = preferred {
            if self.is_valid_move(None, preferred, others).is_ok() {
                return Some(preferred.clone());
            }
        }
        self.seats
            .iter()
            .map(|spec| Position::seat(&spec.id))
            .find(|candidate| self.is_valid_move(None, candidate, others).is_ok())
    }

    fn is_valid_move(&self, from: Option<&Position>, to: &Position, others: &[Position]) -> Result<(), MoveRejection> {
        let Some(seat_id) = to.seat_id() else {
            return Err(MoveRejection::Blocked);
        };
        if seat_id == self.pm_seat {
            return Err(MoveRejection::PmSeat);
        }
        let spec = self.spec(seat_id).ok_or_else(|| MoveRejection::UnknownSeat(seat_id.to_owned()))?;
        if others.iter().any(|p| p.same_seat(to)) {
            return Err(MoveRejection::SeatTaken(seat_id.to_owned()));
        }
        if let Some(zone) = &spec.zone {
            let already_inside = from.and_then(|f| self.detect_zone(f)).is_some_and(|z| &z == zone);
            if !already_inside && self.zone_is_full(zone, others) {
                return Err(MoveRejection::ZoneFull { room_id: zone.clone() });
            }
        }
        Ok(())
    }

    fn detect_zone(&self, position: &Position) -> Option<String> {
        match position {
            Position::Seat { seat_id } => self.spec(seat_id).and_then(|s| s.zone.clone()),
            Position::Meeting { room_id, .. } => Some(room_id.clone()),
            Position::Point { .. } => None,
        }
    }

    fn role_for(&self, position: &Position) -> String {
        match position {
            Position::Seat { seat_id } if *seat_id == self.pm_seat => "PM".to_owned(),
            Position::Seat { seat_id } => self.spec(seat_id).map_or_else(|| "Member".to_owned(), |s| s.role.clone()),
            Position::Meeting { .. } => "Meeting".to_owned(),
            Position::Point { .. } => "Member".to_owned(),
        }
    }

    fn zone_capacity(&self, zone_id: &str) -> Option<usize> {
        let count = self.seats.iter().filter(|s| s.zone.as_deref() == Some(zone_id)).count();
        (count > 0).then_some(count)
    }

    fn zone_entry(&self, zone_id: &str, others: &[Position]) -> Result<Position, MoveRejection> {
        if self.zone_capacity(zone_id).is_none() {
            return Err(MoveRejection::UnknownRoom(zone_id.to_owned()));
        }
        if self.zone_is_full(zone_id, others) {
            return Err(MoveRejection::ZoneFull { room_id: zone_id.to_owned() });
        }
        self.seats
            .iter()
            .filter(|s| s.zone.as_deref() == Some(zone_id))
            .map(|s| Position::seat(&s.id))
            .find(|candidate| !others.iter().any(|o| o.same_seat(candidate)))
            .ok_or(MoveRejection::ZoneFull { room_id: zone_id.to_owned() })
    }
}

// =============================================================================
// FREE ROAM
// =============================================================================

#[derive(Debug, Clone)]
pub struct FreeRoam {
    layout: Layout,
}

impl FreeRoam {
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    fn spread_spawn(&self, others: &[Position]) -> Option<Point> {
        let occupied: Vec<Point> = others.iter().filter_map(|p| self.anchor(p)).collect();
        let mut best: Option<(Point, f64)> = None;
        for &spawn in &self.layout.spawn_points {
            if self.is_valid_move(None, &Position::at(spawn), others).is_err() {
                continue;
            }
            let score = occupied.iter().map(|o| spawn.distance(*o)).fold(f64::INFINITY, f64::min);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((spawn, score));
            }
        }
        best.map(|(spawn, _)| spawn)
    }

    /// World-space point representing a position, for spacing purposes.
    fn anchor(&self, position: &Position) -> Option<Point> {
        match position {
            Position::Point { x, y } => Some(Point::new(*x, *y)),
            Position::Meeting { room_id, .. } => self.layout.zone(room_id).map(|z| z.rect.center()),
            Position::Seat { .. } => None,
        }
    }
}

impl SpatialModel for FreeRoam {
    fn mode(&self) -> SpatialMode {
        SpatialMode::FreeRoam
    }

    fn assign_position(&self, preferred: Option<&Position>, others: &[Position]) -> Option<Position> {
        if let Some(p) = preferred.and_then(Position::point) {
            let snapped = Position::at(self.layout.find_valid_spot_around(p.x, p.y));
            if self.is_valid_move(None, &snapped, others).is_ok() {
                return Some(snapped);
            }
        }
        if let Some(spawn) = self.spread_spawn(others) {
            return Some(Position::at(spawn));
        }
        let center = self.layout.world_center();
        Some(Position::at(self.layout.find_valid_spot_around(center.x, center.y)))
    }

    fn is_valid_move(&self, from: Option<&Position>, to: &Position, others: &[Position]) -> Result<(), MoveRejection> {
        let target_zone = match to {
            Position::Point { x, y } => {
                if self.layout.collides_at(*x, *y) {
                    return Err(MoveRejection::Blocked);
                }
                self.layout.detect_room_id_at(*x, *y).map(str::to_owned)
            }
            Position::Meeting { room_id, .. } => {
                if self.layout.zone(room_id).is_none() {
                    return Err(MoveRejection::UnknownRoom(room_id.clone()));
                }
                Some(room_id.clone())
            }
            Position::Seat { .. } => return Err(MoveRejection::Blocked),
        };
        if let Some(zone) = target_zone {
            let from_zone = from.and_then(|f| self.detect_zone(f));
            if from_zone.as_deref() != Some(zone.as_str()) && self.zone_is_full(&zone, others) {
                return Err(MoveRejection::ZoneFull { room_id: zone });
            }
        }
        Ok(())
    }

    fn detect_zone(&self, position: &Position) -> Option<String> {
        match position {
            Position::Point { x, y } => self.layout.detect_room_id_at(*x, *y).map(str::to_owned),
            Position::Meeting { room_id, .. } => Some(room_id.clone()),
            Position::Seat { .. } => None,
        }
    }

    fn role_for(&self, position: &Position) -> String {
        match position {
            Position::Seat { seat_id } if seat_id == PM_SEAT_ID => "PM".to_owned(),
            _ if self.detect_zone(position).is_some() => "Meeting".to_owned(),
            _ => "Member".to_owned(),
        }
    }

    fn zone_capacity(&self, zone_id: &str) -> Option<usize> {
        self.layout.zone(zone_id).map(|z| z.capacity)
    }

    fn zone_entry(&self, zone_id: &str, others: &[Position]) -> Result<Position, MoveRejection> {
        let zone = self.layout.zone(zone_id).ok_or_else(|| MoveRejection::UnknownRoom(zone_id.to_owned()))?;
        if self.zone_is_full(zone_id, others) {
            return Err(MoveRejection::ZoneFull { room_id: zone_id.to_owned() });
        }
        Ok(Position::Meeting { room_id: zone.id.clone(), x_pct: zone.entry_pct.x, y_pct: zone.entry_pct.y })
    }

    fn layout(&self) -> Option<&Layout> {
        Some(&self.layout)
    }

    fn relayout(&mut self, layout: Layout) {
        self.layout = layout;
    }
}
