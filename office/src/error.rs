//! Error taxonomy surfaced to the host UI.
//!
//! None of these are retried automatically. The host shows them as an alert
//! or inline state and the user re-attempts the action.

use frames::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OfficeError {
    /// The room already holds the maximum number of participants.
    #[error("room is full (max {max} participants)")]
    CapacityExceeded { max: usize },
    /// No seat could be assigned, or the local seat was lost to a race.
    #[error("no free seat is available")]
    SeatUnavailable,
    /// The channel did not accept an outbound frame.
    #[error("publish failed: {0}")]
    PublishFailure(String),
    /// A required setting (relay URL, credentials) is absent.
    #[error("missing configuration: {0}")]
    ConfigMissing(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("nickname must not be empty")]
    InvalidNickname,
    #[error("join the office first")]
    NotJoined,
    #[error("not permitted: {0}")]
    NotPermitted(String),
    /// A meeting room is at its member cap.
    #[error("meeting room {room_id} is full")]
    ZoneFull { room_id: String },
    #[error("unknown seat: {0}")]
    UnknownSeat(String),
    #[error("unknown meeting room: {0}")]
    UnknownRoom(String),
    #[error("seat {0} is already taken")]
    SeatTaken(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl ErrorCode for OfficeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "E_CAPACITY",
            Self::SeatUnavailable => "E_SEAT_UNAVAILABLE",
            Self::PublishFailure(_) => "E_PUBLISH",
            Self::ConfigMissing(_) => "E_CONFIG_MISSING",
            Self::InvalidConfig(_) => "E_CONFIG_INVALID",
            Self::InvalidNickname => "E_NICKNAME",
            Self::NotJoined => "E_NOT_JOINED",
            Self::NotPermitted(_) => "E_NOT_PERMITTED",
            Self::ZoneFull { .. } => "E_ZONE_FULL",
            Self::UnknownSeat(_) => "E_UNKNOWN_SEAT",
            Self::UnknownRoom(_) => "E_UNKNOWN_ROOM",
            Self::SeatTaken(_) => "E_SEAT_TAKEN",
            Self::InvalidUrl(_) => "E_INVALID_URL",
        }
    }
}
