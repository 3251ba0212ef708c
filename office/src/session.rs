//! Session controller: the one context object a host drives.
//!
//! DESIGN
//! ======
//! A [`Session`] owns everything for one participant in one room: config,
//! identity, spatial model, roster, movement, chat, bubbles, publish timers,
//! connection status, selection, plus the host's [`Channel`] and
//! [`KeyValueStore`]. The host calls it from three places:
//!
//! - user actions (`join`, `send_message`, `cycle_status`, ...)
//! - inbound frames (`handle_frame`)
//! - its frame callback (`tick`)
//!
//! Every call returns synchronously with a [`TickReport`] describing what
//! changed. Nothing here awaits; outbound frames are handed to the channel,
//! which must not block.
//!
//! PUBLISHING
//! ==========
//! Significant local changes (join, status, seat moves, meeting entry and
//! exit, seat reassignment) publish immediately. Movement publishes on the
//! movement controller's broadcast throttle. Everything else coalesces to at
//! most one publish per `presence_publish_interval_ms`. A heartbeat
//! republishes with a fresh stamp when nothing was published for
//! `heartbeat_interval_ms`.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use frames::{BROADCAST_CHAT, Frame};
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::{BubbleBoard, ChatLog, ChatMessage, resolve_sender, sanitize_message_text};
use crate::config::OfficeConfig;
use crate::error::OfficeError;
use crate::geometry::{Layout, MeasuredLayout};
use crate::movement::{KeyState, MoveWarning, MovementController, Vec2};
use crate::presence::{ClientId, Participant, Roster, RosterChange, RosterUpdate};
use crate::protocol::{Inbound, chat_frame, parse_inbound, track_frame, untrack_frame};
use crate::room::{RoomName, share_link};
use crate::spatial::{Position, SpatialModel, build_model};
use crate::store::{KeyValueStore, NICKNAME_KEY, avatar_key, load_json, load_or_create_client_id, position_key, save_json};
use crate::throttle::{Debounce, Throttle};

// =============================================================================
// SEAMS
// =============================================================================

/// Outbound transport. Fire-and-forget.
pub trait Channel {
    /// Hand a frame to the transport without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] when the transport refused the frame.
    fn send(&mut self, frame: Frame) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("channel send failed: {0}")]
pub struct ChannelError(pub String);

/// Transport state, shown as an indicator only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
    TimedOut,
    Closed,
}

/// What a session call changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub changes: Vec<RosterChange>,
    pub warnings: Vec<MoveWarning>,
    pub new_messages: Vec<ChatMessage>,
    /// Conditions to surface to the user (evictions, failed publishes).
    pub errors: Vec<OfficeError>,
    pub render_needed: bool,
}

impl TickReport {
    fn absorb(&mut self, update: RosterUpdate) {
        if !update.is_empty() {
            self.render_needed = true;
            self.changes.extend(update.changes);
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

pub struct Session<C: Channel, S: KeyValueStore> {
    config: OfficeConfig,
    room: RoomName,
    channel: C,
    store: S,
    roster: Roster,
    model: Box<dyn SpatialModel>,
    movement: MovementController,
    chat: ChatLog,
    bubbles: BubbleBoard,
    publish: Throttle,
    publish_pending: bool,
    heartbeat: Throttle,
    relayout: Debounce,
    pending_size: Option<(f64, f64)>,
    pending_layout: Option<MeasuredLayout>,
    status: ConnectionStatus,
    selected: Option<ClientId>,
    saved_nickname: Option<String>,
    closed: bool,
}

impl<C: Channel, S: KeyValueStore> Session<C, S> {
    /// Session on the stock office layout for the configured spatial mode.
    pub fn new(config: OfficeConfig, room: RoomName, channel: C, store: S) -> Self {
        let measured = MeasuredLayout::default_office(config.world_width, config.world_height);
        let layout = Layout::from_measured(&measured, &config.geometry);
        let model = build_model(config.spatial_mode, layout);
        Self::with_model(config, room, channel, store, model)
    }

    pub fn with_model(
        config: OfficeConfig,
        room: RoomName,
        channel: C,
        mut store: S,
        model: Box<dyn SpatialModel>,
    ) -> Self {
        let client_id = load_or_create_client_id(&mut store);
        let saved_nickname = store.get(NICKNAME_KEY);
        info!(client_id = %client_id, room = %room, mode = model.mode().as_str(), "session created");
        Self {
            roster: Roster::new(client_id, &config),
            movement: MovementController::new(&config),
            chat: ChatLog::new(config.chat_history_cap),
            bubbles: BubbleBoard::new(config.bubble_ttl_ms),
            publish: Throttle::new(config.presence_publish_interval_ms),
            publish_pending: false,
            heartbeat: Throttle::new(config.heartbeat_interval_ms),
            relayout: Debounce::new(config.resize_debounce_ms),
            pending_size: None,
            pending_layout: None,
            status: ConnectionStatus::Disconnected,
            selected: None,
            saved_nickname,
            closed: false,
            config,
            room,
            channel,
            store,
            model,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        self.roster.local_id()
    }

    #[must_use]
    pub fn room(&self) -> &RoomName {
        &self.room
    }

    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Participant> {
        self.roster.snapshot()
    }

    #[must_use]
    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    #[must_use]
    pub fn bubbles(&self) -> &BubbleBoard {
        &self.bubbles
    }

    #[must_use]
    pub fn model(&self) -> &dyn SpatialModel {
        self.model.as_ref()
    }

    #[must_use]
    pub fn movement(&self) -> &MovementController {
        &self.movement
    }

    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub fn saved_nickname(&self) -> Option<&str> {
        self.saved_nickname.as_deref()
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.roster.is_joined()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    // -------------------------------------------------------------------------
    // User actions
    // -------------------------------------------------------------------------

    /// Join the room under `nickname`.
    ///
    /// On failure nothing is persisted and nothing is published. A channel
    /// failure after a successful local join is reported in
    /// [`TickReport::errors`].
    ///
    /// # Errors
    ///
    /// Any [`Roster::join`] error, or [`OfficeError::NotPermitted`] after
    /// [`Session::leave`].
    pub fn join(&mut self, nickname: &str, now: i64) -> Result<TickReport, OfficeError> {
        if self.closed {
            return Err(OfficeError::NotPermitted("session is closed".into()));
        }
        let preferred: Option<Position> = load_json(&self.store, &position_key(&self.room));
        let avatar_slot = avatar_key(&self.room, self.roster.local_id());
        let stored_avatar = self.store.get(&avatar_slot);
        let avatar = match &stored_avatar {
            Some(avatar) => avatar.clone(),
            None => self.config.avatars.choose(&mut rand::rng()).cloned().unwrap_or_default(),
        };

        let update = self.roster.join(nickname, &avatar, now, preferred.as_ref(), self.model.as_ref())?;

        if stored_avatar.is_none() {
            self.store.set(&avatar_slot, &avatar);
        }
        if let Some(name) = self.roster.local().map(|p| p.name.clone()) {
            self.store.set(NICKNAME_KEY, &name);
            self.saved_nickname = Some(name);
        }

        let mut report = TickReport::default();
        report.absorb(update);
        self.publish_local(now, &mut report);
        Ok(report)
    }

    /// Advance the local status. Only the local participant may cycle.
    ///
    /// # Errors
    ///
    /// See [`Roster::cycle_status`].
    pub fn cycle_status(&mut self, client_id: &ClientId, now: i64) -> Result<TickReport, OfficeError> {
        let update = self.roster.cycle_status(client_id, now)?;
        let mut report = TickReport::default();
        report.absorb(update);
        self.publish_local(now, &mut report);
        Ok(report)
    }

    /// Move the local participant to a named seat.
    ///
    /// # Errors
    ///
    /// [`OfficeError::NotJoined`], or why the seat cannot be taken.
    pub fn move_to_seat(&mut self, seat_id: &str, now: i64) -> Result<TickReport, OfficeError> {
        self.movement.leave_scene();
        let update = self.roster.move_local(Position::seat(seat_id), now, self.model.as_ref())?;
        let mut report = TickReport::default();
        report.absorb(update);
        self.publish_local(now, &mut report);
        Ok(report)
    }

    /// Enter a meeting room.
    ///
    /// Free roam switches into the room's scene at its entry point; a seat
    /// grid takes a free seat in the room.
    ///
    /// # Errors
    ///
    /// [`OfficeError::NotJoined`], [`OfficeError::UnknownRoom`], or
    /// [`OfficeError::ZoneFull`] when the room is at capacity.
    pub fn enter_meeting(&mut self, room_id: &str, now: i64) -> Result<TickReport, OfficeError> {
        if !self.roster.is_joined() {
            return Err(OfficeError::NotJoined);
        }
        let others = self.roster.others_positions(self.roster.local_id());
        let position = self.model.zone_entry(room_id, &others)?;
        if matches!(position, Position::Meeting { .. }) {
            let zone = self.model.layout().and_then(|l| l.zone(room_id)).cloned();
            match zone {
                Some(zone) => {
                    self.movement.enter_scene(&zone);
                }
                None => return Err(OfficeError::UnknownRoom(room_id.to_owned())),
            }
        }
        info!(client_id = %self.roster.local_id(), room = room_id, "entering meeting room");
        let update = self.roster.place_local(position, None, now, self.model.as_ref())?;
        let mut report = TickReport::default();
        report.absorb(update);
        self.publish_local(now, &mut report);
        Ok(report)
    }

    pub fn set_keys(&mut self, keys: KeyState) {
        self.movement.set_keys(keys);
    }

    pub fn set_joystick(&mut self, joystick: Vec2) {
        self.movement.set_joystick(joystick);
    }

    /// Select a participant for the detail view. Unknown ids clear it.
    pub fn select(&mut self, client_id: Option<&ClientId>) -> Option<&Participant> {
        self.selected = client_id.filter(|id| self.roster.get(id).is_some()).cloned();
        self.selected()
    }

    #[must_use]
    pub fn selected(&self) -> Option<&Participant> {
        self.selected.as_ref().and_then(|id| self.roster.get(id))
    }

    /// Send a chat message.
    ///
    /// Returns `Ok(None)` without sending when not joined or when the text
    /// is blank. The message is kept locally even if the channel refuses it.
    ///
    /// # Errors
    ///
    /// Returns [`OfficeError::PublishFailure`] when the channel refuses the
    /// frame. There is no retry.
    pub fn send_message(&mut self, text: &str, now: i64) -> Result<Option<ChatMessage>, OfficeError> {
        if self.closed {
            return Ok(None);
        }
        let Some(local) = self.roster.local() else {
            return Ok(None);
        };
        let Some(text) = sanitize_message_text(text, self.config.message_max_chars) else {
            return Ok(None);
        };
        let message = ChatMessage {
            id: format!("m-{}", Uuid::new_v4()),
            sender_client_id: local.client_id.clone(),
            nickname: local.name.clone(),
            text,
            created_at: now,
        };
        self.chat.append(message.clone());
        self.bubbles.show(&message.sender_client_id, &message, now);
        self.channel.send(chat_frame(self.room.as_str(), &message, now)).map_err(|e| {
            warn!(error = %e, message_id = %message.id, "chat publish failed");
            OfficeError::PublishFailure(e.to_string())
        })?;
        Ok(Some(message))
    }

    /// Canonical link to this room on `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`OfficeError::InvalidUrl`] when `base_url` does not parse.
    pub fn share_link(&self, base_url: &str) -> Result<String, OfficeError> {
        share_link(base_url, &self.room)
    }

    pub fn set_connection_status(&mut self, status: ConnectionStatus) {
        if self.closed || self.status == status {
            return;
        }
        info!(room = %self.room, from = ?self.status, to = ?status, "connection status changed");
        self.status = status;
    }

    /// Record a new viewport size. The layout is rebuilt after a quiet period.
    pub fn on_resize(&mut self, width: f64, height: f64, now: i64) {
        self.pending_size = Some((width, height));
        self.relayout.trigger(now);
    }

    /// Record freshly measured layout elements, rebuilt after a quiet period.
    pub fn on_layout_changed(&mut self, measured: MeasuredLayout, now: i64) {
        self.pending_layout = Some(measured);
        self.relayout.trigger(now);
    }

    /// Leave the room: best-effort untrack, stop timers, mark closed.
    ///
    /// Frames and ticks after this are ignored.
    pub fn leave(&mut self, now: i64) {
        if self.closed {
            return;
        }
        if self.roster.is_joined() {
            let frame = untrack_frame(self.room.as_str(), self.roster.local_id(), now);
            if let Err(e) = self.channel.send(frame) {
                debug!(error = %e, "untrack on leave was not delivered");
            }
            self.roster.leave_local();
        }
        self.movement.stop();
        self.movement.leave_scene();
        self.relayout.cancel();
        self.publish_pending = false;
        self.closed = true;
        self.status = ConnectionStatus::Closed;
        info!(client_id = %self.roster.local_id(), room = %self.room, "left room");
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Apply one inbound frame.
    pub fn handle_frame(&mut self, frame: &Frame, now: i64) -> TickReport {
        let mut report = TickReport::default();
        if self.closed {
            return report;
        }
        match parse_inbound(frame) {
            Inbound::Connected => {
                self.set_connection_status(ConnectionStatus::Connected);
                report.render_needed = true;
            }
            Inbound::Sync(records) => {
                let update = self.roster.merge_snapshot(records, now, self.model.as_ref());
                self.after_remote(update, now, &mut report);
            }
            Inbound::Upsert(record) => {
                let update = self.roster.apply_remote(record, now, self.model.as_ref());
                self.after_remote(update, now, &mut report);
            }
            Inbound::Leave(client_id) => {
                let update = self.roster.remove(&client_id);
                if !update.is_empty() {
                    self.bubbles.remove(&client_id);
                    if self.selected.as_ref() == Some(&client_id) {
                        self.selected = None;
                    }
                }
                report.absorb(update);
            }
            Inbound::Chat(message) => self.receive_message(message, now, &mut report),
            Inbound::Rejected { syscall, message } => {
                warn!(syscall = %syscall, message = %message, "relay rejected request");
                if syscall == BROADCAST_CHAT {
                    report.errors.push(OfficeError::PublishFailure(message));
                }
            }
            Inbound::Ignored => {}
        }
        report
    }

    fn after_remote(&mut self, update: RosterUpdate, now: i64, report: &mut TickReport) {
        let reassigned = update.changes.iter().any(|c| matches!(c, RosterChange::LocalReassigned { .. }));
        if let Some(err) = update.local_evicted().cloned() {
            warn!(client_id = %self.roster.local_id(), error = %err, "evicted from room");
            self.movement.stop();
            self.movement.leave_scene();
            let frame = untrack_frame(self.room.as_str(), self.roster.local_id(), now);
            if let Err(e) = self.channel.send(frame) {
                debug!(error = %e, "untrack after eviction was not delivered");
            }
            report.errors.push(err);
        }
        report.absorb(update);
        if reassigned {
            self.movement.leave_scene();
            self.publish_local(now, report);
        }
    }

    fn receive_message(&mut self, message: ChatMessage, now: i64, report: &mut TickReport) {
        let Some(text) = sanitize_message_text(&message.text, self.config.message_max_chars) else {
            debug!(message_id = %message.id, "dropping blank chat message");
            return;
        };
        let message = ChatMessage { text, ..message };
        if !self.chat.append(message.clone()) {
            return;
        }
        let everyone = self.roster.members().chain(std::iter::once(self.roster.pm()));
        match resolve_sender(&message, everyone) {
            Some(sender) => {
                if !self.bubbles.show(&sender, &message, now) {
                    debug!(message_id = %message.id, "bubble kept: a newer message is showing");
                }
            }
            None => debug!(message_id = %message.id, nickname = %message.nickname, "no bubble: sender unresolved"),
        }
        report.new_messages.push(message);
        report.render_needed = true;
    }

    // -------------------------------------------------------------------------
    // Frame loop
    // -------------------------------------------------------------------------

    /// Run one frame: relayout, movement, staleness, heartbeat, bubbles, and
    /// coalesced publishes.
    pub fn tick(&mut self, now: i64) -> TickReport {
        let mut report = TickReport::default();
        if self.closed {
            return report;
        }

        if self.relayout.take_due(now) {
            self.apply_relayout(now, &mut report);
        }
        self.tick_movement(now, &mut report);
        report.absorb(self.roster.evict_stale(now));

        if self.roster.is_joined() && self.heartbeat.ready(now) {
            match self.roster.update_local(now, |_| {}) {
                Ok(_) => {
                    debug!(client_id = %self.roster.local_id(), "heartbeat");
                    self.publish_local(now, &mut report);
                }
                Err(e) => debug!(error = %e, "heartbeat skipped"),
            }
        }

        if self.bubbles.sweep(now) {
            report.render_needed = true;
        }
        if self.publish_pending && self.publish.ready(now) {
            self.publish_local(now, &mut report);
        }
        report
    }

    fn tick_movement(&mut self, now: i64, report: &mut TickReport) {
        let Some(current) = self.roster.local().map(|p| p.position.clone()) else {
            return;
        };
        let others = self.roster.others_positions(self.roster.local_id());
        let outcome = self.movement.tick(now, &current, self.model.as_ref(), &others);

        report.warnings.extend(outcome.warning);
        if outcome.position.is_some() || outcome.facing.is_some() {
            let position = outcome.position.unwrap_or(current);
            match self.roster.place_local(position, outcome.facing, now, self.model.as_ref()) {
                Ok(update) => report.absorb(update),
                Err(e) => debug!(error = %e, "movement dropped"),
            }
        }
        if outcome.broadcast {
            self.publish_local(now, report);
        }
    }

    fn apply_relayout(&mut self, now: i64, report: &mut TickReport) {
        if let Some((width, height)) = self.pending_size.take() {
            self.config.world_width = width;
            self.config.world_height = height;
        }
        let measured = self
            .pending_layout
            .take()
            .unwrap_or_else(|| MeasuredLayout::default_office(self.config.world_width, self.config.world_height));
        self.config.world_width = measured.world_width;
        self.config.world_height = measured.world_height;

        let layout = Layout::from_measured(&measured, &self.config.geometry);
        let update = self.roster.revalidate_points(&layout, now);
        self.model.relayout(layout);
        debug!(width = measured.world_width, height = measured.world_height, "layout rebuilt");

        let local_moved = update.touches(self.roster.local_id());
        report.absorb(update);
        report.render_needed = true;
        if local_moved {
            self.request_publish(now, report);
        }
    }

    // -------------------------------------------------------------------------
    // Publishing
    // -------------------------------------------------------------------------

    /// Publish now unless a publish went out within the coalescing interval.
    fn request_publish(&mut self, now: i64, report: &mut TickReport) {
        if self.publish.ready(now) {
            self.publish_local(now, report);
        } else {
            self.publish_pending = true;
        }
    }

    fn publish_local(&mut self, now: i64, report: &mut TickReport) {
        let Some(local) = self.roster.local() else {
            return;
        };
        let frame = track_frame(self.room.as_str(), local, now);
        let position = local.position.clone();
        self.publish.mark(now);
        self.heartbeat.mark(now);
        self.publish_pending = false;
        if !matches!(position, Position::Meeting { .. }) {
            save_json(&mut self.store, &position_key(&self.room), &position);
        }
        if let Err(e) = self.channel.send(frame) {
            warn!(error = %e, "presence publish failed");
            report.errors.push(OfficeError::PublishFailure(e.to_string()));
        }
    }
}
