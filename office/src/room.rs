//! Room addressing.
//!
//! A room is named by the `room` query parameter of the page URL. The name
//! is trimmed, capped, and defaulted, then written back into share links so
//! every participant lands on the same canonical spelling.

#[cfg(test)]
#[path = "room_test.rs"]
mod room_test;

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::OfficeError;

pub const DEFAULT_ROOM: &str = "lobby";
pub const ROOM_NAME_MAX_CHARS: usize = 40;
pub const ROOM_QUERY_PARAM: &str = "room";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Trim, cap at 40 characters, and fall back to `lobby` when blank.
    #[must_use]
    pub fn sanitize(raw: &str) -> Self {
        let name: String = raw.trim().chars().take(ROOM_NAME_MAX_CHARS).collect();
        let name = name.trim_end();
        if name.is_empty() { Self(DEFAULT_ROOM.to_owned()) } else { Self(name.to_owned()) }
    }

    /// Room from a raw query string (`a=1&room=ops`, leading `?` allowed).
    #[must_use]
    pub fn from_query(query: Option<&str>) -> Self {
        let raw = query.map(|q| q.trim_start_matches('?')).and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == ROOM_QUERY_PARAM)
                .map(|(_, value)| value.into_owned())
        });
        Self::sanitize(raw.as_deref().unwrap_or_default())
    }

    /// Room from a full page URL.
    ///
    /// # Errors
    ///
    /// Returns [`OfficeError::InvalidUrl`] when the URL does not parse.
    pub fn from_url(raw: &str) -> Result<Self, OfficeError> {
        let url = Url::parse(raw).map_err(|e| OfficeError::InvalidUrl(format!("{raw}: {e}")))?;
        Ok(Self::from_query(url.query()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RoomName {
    fn default() -> Self {
        Self(DEFAULT_ROOM.to_owned())
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical link to `room` on `base_url`, replacing any previous `room`
/// parameter and keeping the others in order.
///
/// # Errors
///
/// Returns [`OfficeError::InvalidUrl`] when `base_url` does not parse.
pub fn share_link(base_url: &str, room: &RoomName) -> Result<String, OfficeError> {
    let mut url = Url::parse(base_url).map_err(|e| OfficeError::InvalidUrl(format!("{base_url}: {e}")))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != ROOM_QUERY_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut().clear().extend_pairs(kept).append_pair(ROOM_QUERY_PARAM, room.as_str());
    Ok(url.to_string())
}
