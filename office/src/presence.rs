//! Presence reconciler: the local view of everyone in the room.
//!
//! DESIGN
//! ======
//! The [`Roster`] is the single owner of participant records. Remote records
//! arrive in any order and possibly more than once, so the merge rule is a
//! plain last-writer-wins on `updated_at` with ties keeping the existing
//! record. That makes merging commutative and idempotent.
//!
//! The local participant is special in two ways:
//! - Remote echoes of it only apply when strictly newer than the last local
//!   mutation, so network lag never drags the avatar back.
//! - After every remote sync the roster re-checks capacity and seat
//!   contention and may move or evict it. The caller learns about this from
//!   the returned [`RosterUpdate`].
//!
//! The PM is synthetic: always present, never counted, never mutated.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OfficeConfig;
use crate::error::OfficeError;
use crate::geometry::Layout;
use crate::spatial::{PM_SEAT_ID, Position, SpatialModel};

pub const PM_CLIENT_ID: &str = "pm-02";
pub const PM_NAME: &str = "김피엠";
pub const PM_AVATAR: &str = "assets/avatars/avatar-pm.svg";

// =============================================================================
// IDENTITY AND STATUS
// =============================================================================

/// Stable per-device identity, used as the presence map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_pm(&self) -> bool {
        self.0 == PM_CLIENT_ID
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    #[default]
    Focus,
    Idle,
    Offline,
}

impl Status {
    /// Next status in the fixed cycle active, focus, idle, offline.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Active => Self::Focus,
            Self::Focus => Self::Idle,
            Self::Idle => Self::Offline,
            Self::Offline => Self::Active,
        }
    }

    /// Display text shown next to the avatar.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "활동중",
            Self::Focus => "집중",
            Self::Idle => "대기",
            Self::Offline => "오프라인",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

// =============================================================================
// PARTICIPANT
// =============================================================================

/// One participant. The serialized form is the wire presence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub client_id: ClientId,
    pub name: String,
    pub role: String,
    pub status: Status,
    pub avatar: String,
    pub position: Position,
    #[serde(default)]
    pub facing: Facing,
    #[serde(deserialize_with = "crate::protocol::millis")]
    pub joined_at: i64,
    #[serde(deserialize_with = "crate::protocol::millis")]
    pub updated_at: i64,
    /// When the current seat was taken. Earlier claims win contention.
    #[serde(default, deserialize_with = "crate::protocol::millis")]
    pub claimed_at: i64,
    #[serde(skip)]
    pub is_local: bool,
}

impl Participant {
    fn pm() -> Self {
        Self {
            client_id: ClientId::new(PM_CLIENT_ID),
            name: PM_NAME.to_owned(),
            role: "PM".to_owned(),
            status: Status::Active,
            avatar: PM_AVATAR.to_owned(),
            position: Position::seat(PM_SEAT_ID),
            facing: Facing::Down,
            joined_at: 0,
            updated_at: 0,
            claimed_at: 0,
            is_local: false,
        }
    }

    fn claim_key(&self) -> (i64, &ClientId) {
        (self.claimed_at, &self.client_id)
    }

    fn join_key(&self) -> (i64, &ClientId) {
        (self.joined_at, &self.client_id)
    }
}

/// Trim and cap a nickname at `max_chars` characters. `None` when empty.
#[must_use]
pub fn sanitize_nickname(raw: &str, max_chars: usize) -> Option<String> {
    let name: String = raw.trim().chars().take(max_chars).collect();
    if name.is_empty() { None } else { Some(name) }
}

// =============================================================================
// CHANGES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RosterChange {
    Joined(ClientId),
    Updated(ClientId),
    Left(ClientId),
    /// The local participant lost its seat and was moved.
    LocalReassigned { from: Position, to: Position },
    /// The local participant was removed from the room.
    LocalEvicted(OfficeError),
}

/// What a roster operation changed, for the render layer to diff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterUpdate {
    pub changes: Vec<RosterChange>,
}

impl RosterUpdate {
    fn one(change: RosterChange) -> Self {
        Self { changes: vec![change] }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn extend(&mut self, other: RosterUpdate) {
        self.changes.extend(other.changes);
    }

    /// The eviction reason, if the local participant was evicted.
    #[must_use]
    pub fn local_evicted(&self) -> Option<&OfficeError> {
        self.changes.iter().find_map(|c| match c {
            RosterChange::LocalEvicted(err) => Some(err),
            _ => None,
        })
    }

    /// Whether the local record changed and should be republished.
    #[must_use]
    pub fn touches(&self, client_id: &ClientId) -> bool {
        self.changes.iter().any(|c| match c {
            RosterChange::Joined(id) | RosterChange::Updated(id) => id == client_id,
            RosterChange::LocalReassigned { .. } => true,
            RosterChange::Left(_) | RosterChange::LocalEvicted(_) => false,
        })
    }
}

// =============================================================================
// ROSTER
// =============================================================================

#[derive(Debug, Clone)]
pub struct Roster {
    local_id: ClientId,
    participants: BTreeMap<ClientId, Participant>,
    pm: Participant,
    last_local_update: i64,
    max_participants: usize,
    nickname_max_chars: usize,
    presence_ttl_ms: i64,
}

impl Roster {
    #[must_use]
    pub fn new(local_id: ClientId, config: &OfficeConfig) -> Self {
        Self {
            local_id,
            participants: BTreeMap::new(),
            pm: Participant::pm(),
            last_local_update: 0,
            max_participants: config.max_participants,
            nickname_max_chars: config.nickname_max_chars,
            presence_ttl_ms: config.presence_ttl_ms,
        }
    }

    #[must_use]
    pub fn local_id(&self) -> &ClientId {
        &self.local_id
    }

    #[must_use]
    pub fn local(&self) -> Option<&Participant> {
        self.participants.get(&self.local_id)
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.participants.contains_key(&self.local_id)
    }

    #[must_use]
    pub fn get(&self, client_id: &ClientId) -> Option<&Participant> {
        if client_id.is_pm() {
            return Some(&self.pm);
        }
        self.participants.get(client_id)
    }

    #[must_use]
    pub fn pm(&self) -> &Participant {
        &self.pm
    }

    /// Member count, PM excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Everyone including the PM, ordered by `(joined_at, client_id)`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Participant> {
        let mut all: Vec<Participant> = std::iter::once(&self.pm).chain(self.participants.values()).cloned().collect();
        all.sort_by(|a, b| a.join_key().cmp(&b.join_key()));
        all
    }

    /// Positions of every member except `exclude`.
    #[must_use]
    pub fn others_positions(&self, exclude: &ClientId) -> Vec<Position> {
        self.participants
            .values()
            .filter(|p| &p.client_id != exclude)
            .map(|p| p.position.clone())
            .collect()
    }

    /// Members per zone.
    #[must_use]
    pub fn occupancy(&self, model: &dyn SpatialModel) -> BTreeMap<String, usize> {
        let positions: Vec<Position> = self.participants.values().map(|p| p.position.clone()).collect();
        model.occupancy(&positions)
    }

    fn next_stamp(&self, now: i64) -> i64 {
        let last = self.local().map_or(self.last_local_update, |p| p.updated_at.max(self.last_local_update));
        now.max(last + 1)
    }

    /// Insert the local participant.
    ///
    /// # Errors
    ///
    /// - [`OfficeError::InvalidNickname`] for a blank nickname.
    /// - [`OfficeError::CapacityExceeded`] when the room is full.
    /// - [`OfficeError::SeatUnavailable`] when the model has no position left.
    /// - [`OfficeError::NotPermitted`] when already joined.
    pub fn join(
        &mut self,
        nickname: &str,
        avatar: &str,
        now: i64,
        preferred: Option<&Position>,
        model: &dyn SpatialModel,
    ) -> Result<RosterUpdate, OfficeError> {
        if self.is_joined() {
            return Err(OfficeError::NotPermitted("already joined".into()));
        }
        let name = sanitize_nickname(nickname, self.nickname_max_chars).ok_or(OfficeError::InvalidNickname)?;
        if self.participants.len() >= self.max_participants {
            info!(client_id = %self.local_id, count = self.participants.len(), "join rejected: room full");
            return Err(OfficeError::CapacityExceeded { max: self.max_participants });
        }
        let others = self.others_positions(&self.local_id);
        let position = model.assign_position(preferred, &others).ok_or(OfficeError::SeatUnavailable)?;

        let stamp = self.next_stamp(now);
        let participant = Participant {
            client_id: self.local_id.clone(),
            name,
            role: model.role_for(&position),
            status: Status::Focus,
            avatar: avatar.to_owned(),
            position,
            facing: Facing::Down,
            joined_at: stamp,
            updated_at: stamp,
            claimed_at: stamp,
            is_local: true,
        };
        info!(client_id = %self.local_id, name = %participant.name, position = ?participant.position, "joined");
        self.participants.insert(self.local_id.clone(), participant);
        self.last_local_update = stamp;
        Ok(RosterUpdate::one(RosterChange::Joined(self.local_id.clone())))
    }

    /// Merge one remote record under last-writer-wins.
    pub fn merge_remote(&mut self, mut record: Participant, now: i64) -> RosterUpdate {
        let id = record.client_id.clone();
        if id.is_pm() {
            return RosterUpdate::default();
        }
        let Some(name) = sanitize_nickname(&record.name, self.nickname_max_chars) else {
            debug!(client_id = %id, "dropping remote record without a name");
            return RosterUpdate::default();
        };
        record.name = name;

        if id == self.local_id {
            let Some(local) = self.participants.get_mut(&id) else {
                return RosterUpdate::default();
            };
            if record.updated_at <= self.last_local_update.max(local.updated_at) {
                return RosterUpdate::default();
            }
            debug!(client_id = %id, updated_at = record.updated_at, "newer remote copy of local record");
            record.is_local = true;
            *local = record;
            return RosterUpdate::one(RosterChange::Updated(id));
        }

        if now.saturating_sub(record.updated_at) > self.presence_ttl_ms {
            debug!(client_id = %id, "dropping stale remote record");
            return RosterUpdate::default();
        }

        record.is_local = false;
        match self.participants.get_mut(&id) {
            Some(existing) if record.updated_at > existing.updated_at => {
                *existing = record;
                RosterUpdate::one(RosterChange::Updated(id))
            }
            Some(_) => RosterUpdate::default(),
            None => {
                self.participants.insert(id.clone(), record);
                RosterUpdate::one(RosterChange::Joined(id))
            }
        }
    }

    /// Merge one remote record, then re-check the local seat and capacity.
    pub fn apply_remote(&mut self, record: Participant, now: i64, model: &dyn SpatialModel) -> RosterUpdate {
        let mut update = self.merge_remote(record, now);
        if !update.is_empty() {
            update.extend(self.recheck(now, model));
        }
        update
    }

    /// Merge a full presence snapshot, then re-check.
    pub fn merge_snapshot(&mut self, records: Vec<Participant>, now: i64, model: &dyn SpatialModel) -> RosterUpdate {
        let mut update = RosterUpdate::default();
        for record in records {
            update.extend(self.merge_remote(record, now));
        }
        update.extend(self.recheck(now, model));
        update
    }

    /// Apply a leave event. The local record and the PM are never removed.
    pub fn remove(&mut self, client_id: &ClientId) -> RosterUpdate {
        if client_id == &self.local_id || client_id.is_pm() {
            return RosterUpdate::default();
        }
        match self.participants.remove(client_id) {
            Some(_) => RosterUpdate::one(RosterChange::Left(client_id.clone())),
            None => RosterUpdate::default(),
        }
    }

    /// Drop the local participant (explicit leave or eviction).
    pub fn leave_local(&mut self) -> RosterUpdate {
        match self.participants.remove(&self.local_id) {
            Some(_) => RosterUpdate::one(RosterChange::Left(self.local_id.clone())),
            None => RosterUpdate::default(),
        }
    }

    /// Capacity and seat-contention check for the local participant.
    pub fn recheck(&mut self, now: i64, model: &dyn SpatialModel) -> RosterUpdate {
        let Some(local) = self.local() else {
            return RosterUpdate::default();
        };

        let mut order: Vec<&Participant> = self.participants.values().collect();
        order.sort_by(|a, b| a.join_key().cmp(&b.join_key()));
        let rank = order.iter().position(|p| p.client_id == self.local_id).unwrap_or(0);
        if rank >= self.max_participants {
            warn!(client_id = %self.local_id, rank, max = self.max_participants, "room over capacity; evicting local");
            self.participants.remove(&self.local_id);
            return RosterUpdate::one(RosterChange::LocalEvicted(OfficeError::CapacityExceeded {
                max: self.max_participants,
            }));
        }

        let lost_seat = self
            .participants
            .values()
            .any(|other| other.client_id != local.client_id && other.position.same_seat(&local.position) && other.claim_key() < local.claim_key());
        if !lost_seat {
            return RosterUpdate::default();
        }

        let from = local.position.clone();
        let others = self.others_positions(&self.local_id);
        match model.assign_position(None, &others) {
            Some(to) => {
                warn!(client_id = %self.local_id, from = ?from, to = ?to, "seat lost to an earlier claim; reassigned");
                let stamp = self.next_stamp(now);
                if let Some(local) = self.participants.get_mut(&self.local_id) {
                    local.role = model.role_for(&to);
                    local.position = to.clone();
                    local.updated_at = stamp;
                    local.claimed_at = stamp;
                }
                self.last_local_update = stamp;
                RosterUpdate::one(RosterChange::LocalReassigned { from, to })
            }
            None => {
                warn!(client_id = %self.local_id, from = ?from, "seat lost and no free seat; evicting local");
                self.participants.remove(&self.local_id);
                RosterUpdate::one(RosterChange::LocalEvicted(OfficeError::SeatUnavailable))
            }
        }
    }

    /// Remove remote records not refreshed within the presence TTL.
    pub fn evict_stale(&mut self, now: i64) -> RosterUpdate {
        let stale: Vec<ClientId> = self
            .participants
            .values()
            .filter(|p| !p.is_local && now.saturating_sub(p.updated_at) > self.presence_ttl_ms)
            .map(|p| p.client_id.clone())
            .collect();
        let mut update = RosterUpdate::default();
        for id in stale {
            debug!(client_id = %id, "evicting stale presence");
            self.participants.remove(&id);
            update.changes.push(RosterChange::Left(id));
        }
        update
    }

    /// Apply a local mutation and bump `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`OfficeError::NotJoined`] before a successful join.
    pub fn update_local(&mut self, now: i64, f: impl FnOnce(&mut Participant)) -> Result<RosterUpdate, OfficeError> {
        let stamp = self.next_stamp(now);
        let local = self.participants.get_mut(&self.local_id).ok_or(OfficeError::NotJoined)?;
        f(local);
        local.updated_at = stamp;
        self.last_local_update = stamp;
        Ok(RosterUpdate::one(RosterChange::Updated(self.local_id.clone())))
    }

    /// Advance a participant's status. Only the local participant may cycle.
    ///
    /// # Errors
    ///
    /// [`OfficeError::NotPermitted`] for anyone else (the PM included),
    /// [`OfficeError::NotJoined`] before joining.
    pub fn cycle_status(&mut self, client_id: &ClientId, now: i64) -> Result<RosterUpdate, OfficeError> {
        if client_id.is_pm() {
            return Err(OfficeError::NotPermitted("the PM status is fixed".into()));
        }
        if client_id != &self.local_id {
            return Err(OfficeError::NotPermitted("only your own status can change".into()));
        }
        self.update_local(now, |p| p.status = p.status.next())
    }

    /// Validate and apply a local move.
    ///
    /// # Errors
    ///
    /// [`OfficeError::NotJoined`] before joining, or the model's rejection.
    pub fn move_local(&mut self, to: Position, now: i64, model: &dyn SpatialModel) -> Result<RosterUpdate, OfficeError> {
        let from = self.local().map(|p| p.position.clone()).ok_or(OfficeError::NotJoined)?;
        let others = self.others_positions(&self.local_id);
        model.is_valid_move(Some(&from), &to, &others)?;
        self.place_local(to, None, now, model)
    }

    /// Set the local position without validation (already checked per axis
    /// by the movement controller).
    ///
    /// # Errors
    ///
    /// Returns [`OfficeError::NotJoined`] before a successful join.
    pub fn place_local(
        &mut self,
        to: Position,
        facing: Option<Facing>,
        now: i64,
        model: &dyn SpatialModel,
    ) -> Result<RosterUpdate, OfficeError> {
        let stamp = self.next_stamp(now);
        let role = model.role_for(&to);
        self.update_local(now, |p| {
            if !p.position.same_seat(&to) && to.seat_id().is_some() {
                p.claimed_at = stamp;
            }
            p.position = to;
            p.role = role;
            if let Some(facing) = facing {
                p.facing = facing;
            }
        })
    }

    /// Snap every continuous position onto a re-measured layout.
    ///
    /// Remote corrections are view-only and keep their `updated_at`; a moved
    /// local record gets a fresh stamp so it is republished.
    pub fn revalidate_points(&mut self, layout: &Layout, now: i64) -> RosterUpdate {
        let mut update = RosterUpdate::default();
        let mut local_target = None;
        for participant in self.participants.values_mut() {
            let Some(point) = participant.position.point() else {
                continue;
            };
            let snapped = layout.find_valid_spot_around(point.x, point.y);
            if snapped == point {
                continue;
            }
            if participant.is_local {
                local_target = Some(Position::at(snapped));
            } else {
                participant.position = Position::at(snapped);
                update.changes.push(RosterChange::Updated(participant.client_id.clone()));
            }
        }
        if let Some(target) = local_target {
            if let Ok(local_update) = self.update_local(now, |p| p.position = target) {
                update.extend(local_update);
            }
        }
        update
    }
}
