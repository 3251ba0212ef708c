mod bot;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use office::room::{DEFAULT_ROOM, RoomName};
use tracing_subscriber::EnvFilter;

use crate::bot::{CliError, JoinOptions};
use crate::store::DEFAULT_STATE_FILE;

#[derive(Parser, Debug)]
#[command(name = "office-bot", about = "Headless virtual office participant")]
struct Cli {
    /// Relay websocket URL. Falls back to `OFFICE_RELAY_URL`.
    #[arg(long, global = true)]
    relay_url: Option<String>,

    /// Where the bot keeps its client id, nickname, and avatar.
    #[arg(long, global = true, env = "OFFICE_BOT_STATE", default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the relay's health endpoint.
    Ping,
    /// Print the share link for a room.
    Link {
        #[arg(long, default_value = DEFAULT_ROOM)]
        room: String,
        /// Page URL to attach the room to. Defaults to the relay URL.
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Join a room, optionally chat and walk around, then leave.
    Join {
        /// Defaults to the nickname from the previous join.
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long, default_value = DEFAULT_ROOM)]
        room: String,
        #[arg(long)]
        say: Option<String>,
        /// Seconds of random walking (free roam only).
        #[arg(long, default_value_t = 0)]
        walk: u64,
        /// Seconds to stay after walking.
        #[arg(long, default_value_t = 3)]
        linger: u64,
        #[arg(long, default_value_t = 0)]
        status_cycles: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ping => bot::run_ping(&bot::resolve_relay_url(cli.relay_url)?).await,
        Command::Link { room, base_url } => {
            let base = match base_url {
                Some(base) => base,
                None => bot::resolve_relay_url(cli.relay_url)?,
            };
            println!("{}", office::room::share_link(&base, &RoomName::sanitize(&room))?);
            Ok(())
        }
        Command::Join { nickname, room, say, walk, linger, status_cycles } => {
            let opts = JoinOptions {
                relay_url: bot::resolve_relay_url(cli.relay_url)?,
                room: RoomName::sanitize(&room),
                nickname,
                say,
                walk: Duration::from_secs(walk),
                linger: Duration::from_secs(linger),
                status_cycles,
                state_file: cli.state_file,
            };
            bot::run_join(opts).await
        }
    }
}
