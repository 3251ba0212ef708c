//! Presence, movement, and chat core for the virtual office.
//!
//! This crate holds every rule of the office that is independent of the
//! transport and of the DOM: where participants sit or stand, how remote
//! presence snapshots merge into the local view, how the avatar moves each
//! frame, and how chat messages and speech bubbles are kept. A host (browser
//! shell, CLI bot) feeds it input events, inbound [`frames::Frame`]s and a
//! clock, and forwards the frames it emits to a channel backend.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | Top-level [`session::Session`] context object and the [`session::Channel`] seam |
//! | [`presence`] | Participants, statuses, and the [`presence::Roster`] reconciler |
//! | [`spatial`] | [`spatial::SpatialModel`] strategies: fixed seats vs free roam |
//! | [`geometry`] | Colliders, spawn points, room zones, valid-spot search |
//! | [`movement`] | Per-frame movement controller and meeting scenes |
//! | [`chat`] | Deduplicated chat ring and speech bubbles |
//! | [`protocol`] | Outbound frame builders and inbound frame parsing |
//! | [`room`] | Room name sanitizing and share links |
//! | [`store`] | Persisted local key-value state and client identity |
//! | [`throttle`] | Rate limiting and debouncing on an explicit clock |
//! | [`config`] | Tunables with defaults and env overrides |
//! | [`error`] | [`error::OfficeError`] taxonomy |

pub mod chat;
pub mod config;
pub mod error;
pub mod geometry;
pub mod movement;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod session;
pub mod spatial;
pub mod store;
pub mod throttle;

pub use error::OfficeError;
