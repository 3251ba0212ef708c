//! Domain services used by the websocket route.
//!
//! Service modules own the room bookkeeping so the route handler stays
//! focused on frame translation.

pub mod room;
