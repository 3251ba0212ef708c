//! Per-frame movement of the local avatar.
//!
//! The host calls [`MovementController::tick`] from its frame callback. A
//! tick never blocks and never publishes by itself: it reports the new
//! position and whether a broadcast is due, and the session decides what to
//! send.
//!
//! World movement is axis-separated: x then y, each checked on its own
//! against the spatial model, so an avatar slides along a wall instead of
//! sticking to it. Inside a meeting scene the avatar moves in percent of the
//! scene, the table blocks, and stepping into the doorway ends the scene.

#[cfg(test)]
#[path = "movement_test.rs"]
mod movement_test;

use tracing::debug;

use crate::config::{MovementConfig, OfficeConfig};
use crate::geometry::{Point, Rect, RoomZone};
use crate::presence::Facing;
use crate::spatial::{MoveRejection, Position, SpatialModel};
use crate::throttle::Throttle;

/// Held arrow/WASD keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl KeyState {
    #[must_use]
    pub fn any(self) -> bool {
        self.up || self.down || self.left || self.right
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.length() <= f64::EPSILON
    }

    /// Scale down to unit length if longer. Shorter vectors are kept.
    #[must_use]
    pub fn clamp_unit(self) -> Self {
        let len = self.length();
        if len > 1.0 { Self::new(self.x / len, self.y / len) } else { self }
    }
}

/// Combined movement input for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intent {
    pub direction: Vec2,
    pub facing: Option<Facing>,
}

/// Merge keys and joystick into one direction of at most unit length.
#[must_use]
pub fn intent(keys: KeyState, joystick: Vec2) -> Intent {
    let axis = |neg: bool, pos: bool| f64::from(u8::from(pos)) - f64::from(u8::from(neg));
    let stick = joystick.clamp_unit();
    let direction = Vec2::new(axis(keys.left, keys.right) + stick.x, axis(keys.up, keys.down) + stick.y).clamp_unit();

    let facing = if direction.is_zero() {
        None
    } else if direction.x.abs() > direction.y.abs() {
        Some(if direction.x > 0.0 { Facing::Right } else { Facing::Left })
    } else {
        Some(if direction.y > 0.0 { Facing::Down } else { Facing::Up })
    };
    Intent { direction, facing }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    #[default]
    Idle,
    Moving,
}

/// Meeting-room sub-mode. Coordinates are percent of the scene container.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingScene {
    pub room_id: String,
    pub position: Point,
    pub table: Rect,
    pub door: Rect,
    /// World point to return to when the scene ends.
    pub exit_point: Point,
}

impl MeetingScene {
    fn as_position(&self) -> Position {
        Position::Meeting { room_id: self.room_id.clone(), x_pct: self.position.x, y_pct: self.position.y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveWarning {
    ZoneFull { room_id: String },
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// New local position, when it changed.
    pub position: Option<Position>,
    /// New facing, when it changed.
    pub facing: Option<Facing>,
    pub warning: Option<MoveWarning>,
    /// A movement broadcast is due now.
    pub broadcast: bool,
    /// Room whose scene was left through the doorway.
    pub exited_scene: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MovementController {
    config: MovementConfig,
    keys: KeyState,
    joystick: Vec2,
    state: MotionState,
    last_frame: Option<i64>,
    facing: Facing,
    scene: Option<MeetingScene>,
    broadcast: Throttle,
    warning: Throttle,
    pending_broadcast: bool,
}

impl MovementController {
    #[must_use]
    pub fn new(config: &OfficeConfig) -> Self {
        Self {
            config: config.movement.clone(),
            keys: KeyState::default(),
            joystick: Vec2::default(),
            state: MotionState::Idle,
            last_frame: None,
            facing: Facing::Down,
            scene: None,
            broadcast: Throttle::new(config.movement_broadcast_interval_ms),
            warning: Throttle::new(config.warning_cooldown_ms),
            pending_broadcast: false,
        }
    }

    pub fn set_keys(&mut self, keys: KeyState) {
        self.keys = keys;
    }

    pub fn set_joystick(&mut self, joystick: Vec2) {
        self.joystick = joystick.clamp_unit();
    }

    /// Release all input.
    pub fn stop(&mut self) {
        self.keys = KeyState::default();
        self.joystick = Vec2::default();
    }

    #[must_use]
    pub fn state(&self) -> MotionState {
        self.state
    }

    #[must_use]
    pub fn facing(&self) -> Facing {
        self.facing
    }

    #[must_use]
    pub fn scene(&self) -> Option<&MeetingScene> {
        self.scene.as_ref()
    }

    /// Switch into a meeting scene at its entry point.
    pub fn enter_scene(&mut self, zone: &RoomZone) -> Position {
        let scene = MeetingScene {
            room_id: zone.id.clone(),
            position: zone.entry_pct,
            table: zone.table_pct,
            door: zone.door_pct,
            exit_point: zone.exit_point,
        };
        let position = scene.as_position();
        debug!(room = %zone.id, "entered meeting scene");
        self.scene = Some(scene);
        position
    }

    pub fn leave_scene(&mut self) {
        self.scene = None;
    }

    /// Advance one frame.
    ///
    /// `current` is the local position, `others` everyone else's (PM
    /// excluded). The first tick after idling moves nothing and only starts
    /// the frame clock.
    pub fn tick(&mut self, now: i64, current: &Position, model: &dyn SpatialModel, others: &[Position]) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let intent = intent(self.keys, self.joystick);

        let Some(facing) = intent.facing else {
            if self.state == MotionState::Moving {
                self.state = MotionState::Idle;
                self.last_frame = None;
                if self.pending_broadcast {
                    self.pending_broadcast = false;
                    self.broadcast.mark(now);
                    outcome.broadcast = true;
                }
            }
            return outcome;
        };

        let dt_ms = match (self.state, self.last_frame) {
            (MotionState::Moving, Some(last)) => now.saturating_sub(last).clamp(0, self.config.max_frame_delta_ms),
            _ => 0,
        };
        self.state = MotionState::Moving;
        self.last_frame = Some(now);

        if facing != self.facing {
            self.facing = facing;
            outcome.facing = Some(facing);
        }

        #[allow(clippy::cast_precision_loss)]
        let dt = dt_ms as f64 / 1000.0;
        if self.scene.is_some() {
            self.tick_scene(dt, intent.direction, model, &mut outcome);
        } else {
            self.tick_world(now, dt, intent.direction, current, model, others, &mut outcome);
        }

        if outcome.exited_scene.is_some() {
            self.broadcast.mark(now);
            self.pending_broadcast = false;
            outcome.broadcast = true;
        } else if outcome.position.is_some() || outcome.facing.is_some() {
            if self.broadcast.try_acquire(now) {
                self.pending_broadcast = false;
                outcome.broadcast = true;
            } else {
                self.pending_broadcast = true;
            }
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn tick_world(
        &mut self,
        now: i64,
        dt: f64,
        dir: Vec2,
        current: &Position,
        model: &dyn SpatialModel,
        others: &[Position],
        outcome: &mut TickOutcome,
    ) {
        let Some(start) = current.point() else {
            return;
        };
        let step = self.config.speed_px_per_sec * dt;
        let mut at = start;
        let mut blocked_by_zone = None;

        let candidates = [Point::new(dir.x * step, 0.0), Point::new(0.0, dir.y * step)];
        for delta in candidates {
            if delta.x == 0.0 && delta.y == 0.0 {
                continue;
            }
            let next = Point::new(at.x + delta.x, at.y + delta.y);
            match model.is_valid_move(Some(&Position::at(at)), &Position::at(next), others) {
                Ok(()) => at = next,
                Err(MoveRejection::ZoneFull { room_id }) => blocked_by_zone = Some(room_id),
                Err(_) => {}
            }
        }

        if let Some(room_id) = blocked_by_zone {
            if self.warning.try_acquire(now) {
                debug!(room = %room_id, "blocked at full meeting room");
                outcome.warning = Some(MoveWarning::ZoneFull { room_id });
            }
        }
        if at != start {
            outcome.position = Some(Position::at(at));
        }
    }

    fn tick_scene(&mut self, dt: f64, dir: Vec2, model: &dyn SpatialModel, outcome: &mut TickOutcome) {
        let step = self.config.meeting_speed_pct_per_sec * dt;
        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        let start = scene.position;
        let mut at = start;
        let bounds = |v: f64| v.max(0.0).min(100.0);

        for delta in [Point::new(dir.x * step, 0.0), Point::new(0.0, dir.y * step)] {
            let next = Point::new(bounds(at.x + delta.x), bounds(at.y + delta.y));
            if !scene.table.contains(next) {
                at = next;
            }
        }

        if scene.door.contains(at) {
            let room_id = scene.room_id.clone();
            let target = scene.exit_point;
            let exit = model.layout().map_or(target, |layout| layout.find_valid_spot_around(target.x, target.y));
            debug!(room = %room_id, x = exit.x, y = exit.y, "left meeting scene through the door");
            outcome.position = Some(Position::at(exit));
            outcome.exited_scene = Some(room_id);
            self.scene = None;
            return;
        }
        if at != start {
            scene.position = at;
            outcome.position = Some(scene.as_position());
        }
    }
}
