//! Headless participant driving an office session over the relay websocket.
//!
//! DESIGN
//! ======
//! The session is synchronous; the bot owns the async edges. Outbound frames
//! go through an unbounded queue drained by a writer task, so
//! `Channel::send` never blocks. The main loop multiplexes inbound frames
//! with a frame-rate ticker and prints what changed.
//!
//! LIFECYCLE
//! =========
//! 1. Connect to `<relay>?room=<room>`
//! 2. Feed frames until the first `presence:sync`, then join
//! 3. Optional status cycles and chat line
//! 4. Walk (random joystick) and linger while ticking
//! 5. Leave, drain the writer, close

#[cfg(test)]
#[path = "bot_test.rs"]
mod tests;

use std::path::PathBuf;
use std::time::Duration;

use frames::{Frame, PRESENCE_SYNC, decode_frame, decode_frame_json, encode_frame, now_ms};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use office::OfficeError;
use office::chat::ChatMessage;
use office::config::{OfficeConfig, relay_url_from_env};
use office::movement::{MoveWarning, Vec2};
use office::presence::{Participant, Roster, RosterChange};
use office::room::{RoomName, share_link};
use office::session::{Channel, ChannelError, ConnectionStatus, Session, TickReport};
use office::spatial::Position;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use crate::store::JsonFileStore;

const FRAME_INTERVAL: Duration = Duration::from_millis(50);
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const TURN_INTERVAL: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Office(#[from] OfficeError),
    #[error("invalid relay URL: {0}")]
    InvalidRelayUrl(String),
    #[error("websocket error: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("timed out waiting for the presence snapshot")]
    Timeout,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relay health check returned HTTP {0}")]
    Unhealthy(u16),
}

// =============================================================================
// CHANNEL
// =============================================================================

/// Outbound queue drained by the writer task.
struct QueueChannel {
    tx: mpsc::UnboundedSender<Frame>,
}

impl Channel for QueueChannel {
    fn send(&mut self, frame: Frame) -> Result<(), ChannelError> {
        self.tx.send(frame).map_err(|e| ChannelError(e.to_string()))
    }
}

async fn write_frames(mut sink: SplitSink<WsStream, Message>, mut rx: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(Message::Binary(encode_frame(&frame).into())).await {
            warn!(error = %e, syscall = %frame.syscall, "websocket send failed");
            return;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "websocket close failed");
    }
}

// =============================================================================
// URLS
// =============================================================================

/// The `--relay-url` flag, falling back to `OFFICE_RELAY_URL`.
///
/// # Errors
///
/// [`OfficeError::ConfigMissing`] when neither is set.
pub fn resolve_relay_url(flag: Option<String>) -> Result<String, CliError> {
    match flag {
        Some(url) if !url.trim().is_empty() => Ok(url.trim().to_owned()),
        _ => Ok(relay_url_from_env()?),
    }
}

/// Relay websocket URL addressed to `room`.
///
/// # Errors
///
/// [`CliError::InvalidRelayUrl`] for anything but a `ws`/`wss` URL.
pub fn room_url(relay_url: &str, room: &RoomName) -> Result<String, CliError> {
    let url = Url::parse(relay_url).map_err(|e| CliError::InvalidRelayUrl(format!("{relay_url}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(CliError::InvalidRelayUrl(format!("{relay_url}: expected ws:// or wss://")));
    }
    Ok(share_link(relay_url, room)?)
}

/// HTTP health endpoint on the same host as the relay.
///
/// # Errors
///
/// [`CliError::InvalidRelayUrl`] when the URL does not parse or has an
/// unsupported scheme.
pub fn health_url(relay_url: &str) -> Result<String, CliError> {
    let mut url = Url::parse(relay_url).map_err(|e| CliError::InvalidRelayUrl(format!("{relay_url}: {e}")))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => return Err(CliError::InvalidRelayUrl(format!("{relay_url}: unsupported scheme {other}"))),
    };
    url.set_scheme(scheme).map_err(|()| CliError::InvalidRelayUrl(relay_url.to_owned()))?;
    url.set_path("/healthz");
    url.set_query(None);
    Ok(url.to_string())
}

// =============================================================================
// PING
// =============================================================================

pub async fn run_ping(relay_url: &str) -> Result<(), CliError> {
    let url = health_url(relay_url)?;
    let status = reqwest::get(&url).await?.status();
    if !status.is_success() {
        return Err(CliError::Unhealthy(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

// =============================================================================
// JOIN
// =============================================================================

#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub relay_url: String,
    pub room: RoomName,
    /// Falls back to the nickname saved by the last join.
    pub nickname: Option<String>,
    pub say: Option<String>,
    pub walk: Duration,
    pub linger: Duration,
    pub status_cycles: u32,
    pub state_file: PathBuf,
}

pub async fn run_join(opts: JoinOptions) -> Result<(), CliError> {
    let config = OfficeConfig::from_env()?;
    let url = room_url(&opts.relay_url, &opts.room)?;
    let store = JsonFileStore::open(&opts.state_file);
    info!(state_file = %store.path().display(), "loaded bot state");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut session = Session::new(config, opts.room.clone(), QueueChannel { tx }, store);
    session.set_connection_status(ConnectionStatus::Connecting);

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            session.set_connection_status(ConnectionStatus::Error);
            return Err(CliError::Ws(Box::new(e)));
        }
    };
    let (sink, mut source) = stream.split();
    let writer = tokio::spawn(write_frames(sink, rx));

    if let Err(e) = wait_for_sync(&mut session, &mut source).await {
        if matches!(e, CliError::Timeout) {
            session.set_connection_status(ConnectionStatus::TimedOut);
        }
        return Err(e);
    }

    let nickname = resolve_nickname(opts.nickname.as_deref(), session.saved_nickname())?;
    let report = session.join(&nickname, now_ms())?;
    print_report(&session, &report);
    if let Some(me) = session.roster().local() {
        println!("joined {} as {} at {} ({})", session.room(), me.name, describe_position(&me.position), me.client_id);
    }

    for _ in 0..opts.status_cycles {
        let me = session.client_id().clone();
        let report = session.cycle_status(&me, now_ms())?;
        print_report(&session, &report);
    }
    if let Some(text) = &opts.say {
        if let Some(message) = session.send_message(text, now_ms())? {
            println!("{}", format_message(&message));
        }
    }

    let outcome = drive(&mut session, &mut source, opts.walk, opts.linger).await;
    for line in format_roster(&session.snapshot()) {
        println!("{line}");
    }

    session.leave(now_ms());
    drop(session);
    match timeout(DRAIN_TIMEOUT, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "writer task failed"),
        Err(_) => warn!("timed out draining outbound frames"),
    }
    outcome
}

/// The `--nickname` flag, else the saved nickname.
///
/// # Errors
///
/// [`OfficeError::InvalidNickname`] when both are missing or blank.
pub fn resolve_nickname(flag: Option<&str>, saved: Option<&str>) -> Result<String, OfficeError> {
    [flag, saved]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or(OfficeError::InvalidNickname)
}

async fn wait_for_sync<C: Channel>(
    session: &mut Session<C, JsonFileStore>,
    source: &mut SplitStream<WsStream>,
) -> Result<(), CliError> {
    let result = timeout(SYNC_TIMEOUT, async {
        loop {
            let Some(frame) = next_frame(source).await? else {
                continue;
            };
            let is_sync = frame.syscall == PRESENCE_SYNC;
            let report = session.handle_frame(&frame, now_ms());
            print_report(session, &report);
            if is_sync {
                return Ok::<(), CliError>(());
            }
        }
    })
    .await;
    result.map_err(|_| CliError::Timeout)?
}

async fn drive<C: Channel>(
    session: &mut Session<C, JsonFileStore>,
    source: &mut SplitStream<WsStream>,
    walk: Duration,
    linger: Duration,
) -> Result<(), CliError> {
    let start = Instant::now();
    let walk_until = start + walk;
    let end = walk_until + linger;
    let mut next_turn = start;
    let mut walking = !walk.is_zero();
    let mut ticker = interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                if now >= end {
                    return Ok(());
                }
                if walking && now >= walk_until {
                    walking = false;
                    session.set_joystick(Vec2::default());
                } else if walking && now >= next_turn {
                    session.set_joystick(random_heading());
                    next_turn = now + TURN_INTERVAL;
                }
                let report = session.tick(now_ms());
                print_report(session, &report);
            }
            frame = next_frame(source) => {
                if let Some(frame) = frame? {
                    let report = session.handle_frame(&frame, now_ms());
                    print_report(session, &report);
                }
            }
        }
    }
}

/// Next decodable frame. `Ok(None)` for control messages and malformed
/// frames, which are dropped.
async fn next_frame(source: &mut SplitStream<WsStream>) -> Result<Option<Frame>, CliError> {
    let Some(message) = source.next().await else {
        return Err(CliError::WsClosed);
    };
    let decoded = match message.map_err(|e| CliError::Ws(Box::new(e)))? {
        Message::Binary(bytes) => decode_frame(&bytes),
        Message::Text(text) => decode_frame_json(text.as_str()),
        Message::Close(_) => return Err(CliError::WsClosed),
        _ => return Ok(None),
    };
    match decoded {
        Ok(frame) => Ok(Some(frame)),
        Err(e) => {
            debug!(error = %e, "dropping undecodable frame");
            Ok(None)
        }
    }
}

fn random_heading() -> Vec2 {
    let mut rng = rand::rng();
    Vec2::new(rng.random_range(-1.0..=1.0), rng.random_range(-1.0..=1.0))
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_report<C: Channel>(session: &Session<C, JsonFileStore>, report: &TickReport) {
    for change in &report.changes {
        if let Some(line) = describe_change(change, session.roster()) {
            println!("{line}");
        }
    }
    for warning in &report.warnings {
        match warning {
            MoveWarning::ZoneFull { room_id } => println!("! {room_id} is full"),
        }
    }
    for message in &report.new_messages {
        println!("{}", format_message(message));
    }
    for error in &report.errors {
        println!("! {error}");
    }
}

/// One output line for a roster change. Plain updates are not printed.
#[must_use]
pub fn describe_change(change: &RosterChange, roster: &Roster) -> Option<String> {
    match change {
        RosterChange::Joined(id) => {
            let who = roster.get(id)?;
            Some(format!("+ {} ({}) at {}", who.name, who.role, describe_position(&who.position)))
        }
        RosterChange::Left(id) => Some(format!("- {id}")),
        RosterChange::Updated(_) => None,
        RosterChange::LocalReassigned { from, to } => {
            Some(format!("! seat lost: {} -> {}", describe_position(from), describe_position(to)))
        }
        RosterChange::LocalEvicted(err) => Some(format!("! removed from room: {err}")),
    }
}

#[must_use]
pub fn describe_position(position: &Position) -> String {
    match position {
        Position::Seat { seat_id } => seat_id.clone(),
        Position::Point { x, y } => format!("({x:.0}, {y:.0})"),
        Position::Meeting { room_id, x_pct, y_pct } => format!("{room_id} [{x_pct:.0}%, {y_pct:.0}%]"),
    }
}

#[must_use]
pub fn format_message(message: &ChatMessage) -> String {
    format!("<{}> {}", message.nickname, message.text)
}

#[must_use]
pub fn format_roster(participants: &[Participant]) -> Vec<String> {
    participants
        .iter()
        .map(|p| {
            format!("{:<12} {:<8} {:<6} {}", p.name, p.role, p.status.label(), describe_position(&p.position))
        })
        .collect()
}
