//! Office tunables.
//!
//! Every limit and interval used by the core lives here with a default.
//! Hosts may override any of them from `OFFICE_*` environment variables via
//! [`OfficeConfig::from_env`], or deserialize a full config from JSON.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::OfficeError;
use crate::spatial::SpatialMode;

pub const DEFAULT_MAX_PARTICIPANTS: usize = 14;
pub const DEFAULT_NICKNAME_MAX_CHARS: usize = 12;
pub const DEFAULT_MESSAGE_MAX_CHARS: usize = 300;
pub const DEFAULT_CHAT_HISTORY_CAP: usize = 100;
pub const DEFAULT_BUBBLE_TTL_MS: i64 = 6_000;
pub const DEFAULT_PRESENCE_TTL_MS: i64 = 45_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: i64 = 15_000;
pub const DEFAULT_PRESENCE_PUBLISH_INTERVAL_MS: i64 = 120;
pub const DEFAULT_MOVEMENT_BROADCAST_INTERVAL_MS: i64 = 80;
pub const DEFAULT_WARNING_COOLDOWN_MS: i64 = 1_500;
pub const DEFAULT_RESIZE_DEBOUNCE_MS: i64 = 150;

/// Env var holding the channel relay websocket URL.
pub const RELAY_URL_ENV: &str = "OFFICE_RELAY_URL";

/// Collision and spawn geometry settings, in world pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Avatar bounding box width, centered on the feet point.
    pub avatar_width: f64,
    /// Avatar bounding box height, extending upward from the feet point.
    pub avatar_height: f64,
    /// Minimum distance between the avatar box and the world edge.
    pub world_margin: f64,
    /// Inward margin a point must clear to count as inside a room zone.
    pub zone_inner_margin: f64,
    pub wall_thickness: f64,
    /// Radii tried, in order, by the valid-spot search.
    pub search_radii: Vec<f64>,
    /// Angular step of the valid-spot search, in degrees.
    pub search_angle_step_deg: f64,
    pub spawn_grid_step: f64,
    /// Gap between a desk's bottom edge and the avatar box of its spawn point.
    pub desk_spawn_offset: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            avatar_width: 28.0,
            avatar_height: 36.0,
            world_margin: 8.0,
            zone_inner_margin: 6.0,
            wall_thickness: 6.0,
            search_radii: vec![12.0, 24.0, 36.0, 48.0, 64.0, 80.0, 96.0, 128.0, 160.0],
            search_angle_step_deg: 30.0,
            spawn_grid_step: 96.0,
            desk_spawn_offset: 8.0,
        }
    }
}

/// Per-frame movement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub speed_px_per_sec: f64,
    /// Speed inside a meeting scene, in percent of the scene per second.
    pub meeting_speed_pct_per_sec: f64,
    /// Upper bound on a single frame's delta time.
    pub max_frame_delta_ms: i64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self { speed_px_per_sec: 180.0, meeting_speed_pct_per_sec: 40.0, max_frame_delta_ms: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficeConfig {
    pub max_participants: usize,
    pub nickname_max_chars: usize,
    pub message_max_chars: usize,
    pub chat_history_cap: usize,
    pub bubble_ttl_ms: i64,
    /// Remote records older than this are treated as disconnected.
    pub presence_ttl_ms: i64,
    /// Local record republish interval. Kept below `presence_ttl_ms`.
    pub heartbeat_interval_ms: i64,
    pub presence_publish_interval_ms: i64,
    pub movement_broadcast_interval_ms: i64,
    pub warning_cooldown_ms: i64,
    pub resize_debounce_ms: i64,
    pub spatial_mode: SpatialMode,
    pub world_width: f64,
    pub world_height: f64,
    pub avatars: Vec<String>,
    pub geometry: GeometryConfig,
    pub movement: MovementConfig,
}

impl Default for OfficeConfig {
    fn default() -> Self {
        Self {
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            nickname_max_chars: DEFAULT_NICKNAME_MAX_CHARS,
            message_max_chars: DEFAULT_MESSAGE_MAX_CHARS,
            chat_history_cap: DEFAULT_CHAT_HISTORY_CAP,
            bubble_ttl_ms: DEFAULT_BUBBLE_TTL_MS,
            presence_ttl_ms: DEFAULT_PRESENCE_TTL_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            presence_publish_interval_ms: DEFAULT_PRESENCE_PUBLISH_INTERVAL_MS,
            movement_broadcast_interval_ms: DEFAULT_MOVEMENT_BROADCAST_INTERVAL_MS,
            warning_cooldown_ms: DEFAULT_WARNING_COOLDOWN_MS,
            resize_debounce_ms: DEFAULT_RESIZE_DEBOUNCE_MS,
            spatial_mode: SpatialMode::default(),
            world_width: 1280.0,
            world_height: 800.0,
            avatars: [
                "assets/avatars/avatar-dev.svg",
                "assets/avatars/avatar-ops.svg",
                "assets/avatars/avatar-design.svg",
                "assets/avatars/avatar-data.svg",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            geometry: GeometryConfig::default(),
            movement: MovementConfig::default(),
        }
    }
}

impl OfficeConfig {
    /// Build config from defaults overridden by environment variables.
    ///
    /// Optional:
    /// - `OFFICE_SPATIAL_MODE`: `seats` (default) or `free_roam`
    /// - `OFFICE_MAX_PARTICIPANTS`, `OFFICE_NICKNAME_MAX_CHARS`,
    ///   `OFFICE_MESSAGE_MAX_CHARS`, `OFFICE_CHAT_HISTORY_CAP`
    /// - `OFFICE_PRESENCE_TTL_MS`, `OFFICE_HEARTBEAT_INTERVAL_MS`,
    ///   `OFFICE_BUBBLE_TTL_MS`, `OFFICE_MOVE_SPEED`
    ///
    /// # Errors
    ///
    /// Returns [`OfficeError::InvalidConfig`] for an unknown spatial mode or
    /// a heartbeat interval that would let peers evict a live client.
    pub fn from_env() -> Result<Self, OfficeError> {
        let defaults = Self::default();
        let spatial_mode = match std::env::var("OFFICE_SPATIAL_MODE") {
            Ok(raw) => SpatialMode::parse(&raw)?,
            Err(_) => defaults.spatial_mode,
        };
        let config = Self {
            max_participants: env_parse("OFFICE_MAX_PARTICIPANTS", defaults.max_participants),
            nickname_max_chars: env_parse("OFFICE_NICKNAME_MAX_CHARS", defaults.nickname_max_chars),
            message_max_chars: env_parse("OFFICE_MESSAGE_MAX_CHARS", defaults.message_max_chars),
            chat_history_cap: env_parse("OFFICE_CHAT_HISTORY_CAP", defaults.chat_history_cap),
            bubble_ttl_ms: env_parse("OFFICE_BUBBLE_TTL_MS", defaults.bubble_ttl_ms),
            presence_ttl_ms: env_parse("OFFICE_PRESENCE_TTL_MS", defaults.presence_ttl_ms),
            heartbeat_interval_ms: env_parse("OFFICE_HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval_ms),
            spatial_mode,
            movement: MovementConfig {
                speed_px_per_sec: env_parse("OFFICE_MOVE_SPEED", defaults.movement.speed_px_per_sec),
                ..defaults.movement.clone()
            },
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`OfficeError::InvalidConfig`] when a constraint fails.
    pub fn validate(&self) -> Result<(), OfficeError> {
        if self.heartbeat_interval_ms <= 0 || self.heartbeat_interval_ms >= self.presence_ttl_ms {
            return Err(OfficeError::InvalidConfig(format!(
                "heartbeat interval {}ms must be positive and below presence ttl {}ms",
                self.heartbeat_interval_ms, self.presence_ttl_ms
            )));
        }
        if self.max_participants == 0 {
            return Err(OfficeError::InvalidConfig("max_participants must be at least 1".into()));
        }
        if self.nickname_max_chars == 0 || self.chat_history_cap == 0 {
            return Err(OfficeError::InvalidConfig("nickname and history caps must be at least 1".into()));
        }
        Ok(())
    }
}

/// Relay websocket URL from `OFFICE_RELAY_URL`.
///
/// # Errors
///
/// Returns [`OfficeError::ConfigMissing`] when the variable is unset or blank.
pub fn relay_url_from_env() -> Result<String, OfficeError> {
    match std::env::var(RELAY_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => Ok(url.trim().to_owned()),
        _ => Err(OfficeError::ConfigMissing(RELAY_URL_ENV.into())),
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_override(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_override<T>(key: &str, raw: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    raw.trim().parse::<T>().unwrap_or_else(|_| {
        warn!(key, value = raw, %default, "ignoring invalid config override");
        default
    })
}
