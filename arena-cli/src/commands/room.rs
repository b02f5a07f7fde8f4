//! Interactive room session
//!
//! Enters one room over the push channel, prints room updates as they
//! arrive and turns stdin lines into room actions.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arena_core::{
    BearerToken, ConnectionManager, ConnectionState, HttpRoomApi, Identity, RoomUpdate, RoomView,
};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::config::ConfigLoader;

/// Room command arguments
#[derive(Args, Debug)]
pub struct RoomArgs {
    /// Room code to join
    pub code: String,

    /// Bearer token (JWT) for the push channel and REST API
    #[arg(long, env = "ARENA_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Start,
    End,
    Submitted,
    Chat(String),
    Open,
    Close,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Input {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Chat(line.to_string());
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));
        match name {
            "start" => Self::Start,
            "end" => Self::End,
            "submitted" => Self::Submitted,
            "chat" => Self::Chat(rest.to_string()),
            "open" => Self::Open,
            "close" => Self::Close,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

const HELP: &str = "\
Commands:
  /start        start the match (room creator only)
  /end          end the session early
  /submitted    report that your solution was submitted
  /chat <text>  send a chat message (plain text works too)
  /open         open the chat panel and clear unread
  /close        close the chat panel
  /quit         leave the room";

/// Run the room command
pub async fn run(args: RoomArgs, explicit_config: Option<&Path>) -> Result<()> {
    let token = BearerToken::from_optional(args.token)
        .context("A bearer token is required (pass --token or set ARENA_TOKEN)")?;
    let config = ConfigLoader::resolve(explicit_config)?;

    let api = HttpRoomApi::new(&config.api, &token).context("Failed to build REST client")?;
    let manager = ConnectionManager::websocket(&config);
    let handle = manager
        .connect(token)
        .await
        .with_context(|| format!("Failed to connect to {}", config.transport.endpoint))?;

    let view = RoomView::enter(handle, Arc::new(api), &args.code, &config.room);
    println!(
        "Joined room {} as {}. Type /help for commands.",
        view.room_code(),
        view.identity()
    );

    let mut updates = BroadcastStream::new(view.subscribe());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(Ok(update)) => {
                    if let Some(line) = render(&update, view.identity()) {
                        println!("{line}");
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "Display fell behind room updates");
                }
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                if !dispatch(&view, Input::parse(&line)).await {
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    view.close().await;
    println!("Left room {}", args.code);
    Ok(())
}

/// Apply one input to the view; false means the user asked to leave
async fn dispatch(view: &RoomView, input: Input) -> bool {
    let result = match input {
        Input::Start => view.start_match().await,
        Input::End => view.end_session().await,
        Input::Submitted => view.submission_completed().await,
        Input::Chat(text) => view.send_chat(text).await,
        Input::Open => view.open_chat(),
        Input::Close => view.close_chat(),
        Input::Help => {
            println!("{HELP}");
            Ok(())
        }
        Input::Quit => return false,
        Input::Empty => Ok(()),
        Input::Unknown(name) => {
            eprintln!("! Unknown command /{name}; try /help");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("! {e}");
    }
    true
}

/// Format an update for the terminal; `None` for updates not worth a line
fn render(update: &RoomUpdate, local: &Identity) -> Option<String> {
    match update {
        RoomUpdate::Phase(phase) => Some(format!("* Room is now {phase}")),
        RoomUpdate::Countdown { remaining_secs } => {
            let secs = *remaining_secs;
            (secs % 60 == 0 || secs <= 10).then(|| format!("* {} left", clock(secs)))
        }
        RoomUpdate::Connection(state) => Some(
            match state {
                ConnectionState::Connected => "* Connected",
                ConnectionState::Connecting => "* Reconnecting...",
                ConnectionState::Disconnected => "* Disconnected",
            }
            .to_string(),
        ),
        RoomUpdate::PlayerJoined { username } => Some(format!("* {username} joined")),
        RoomUpdate::Chat(message) if &message.sender == local => {
            Some(format!("<you> {}", message.content))
        }
        RoomUpdate::Chat(message) => Some(format!("<{}> {}", message.sender, message.content)),
        RoomUpdate::HistoryLoaded { count: 0 } => None,
        RoomUpdate::HistoryLoaded { count } => Some(format!("* Loaded {count} earlier messages")),
        RoomUpdate::Typing(typing) if typing.is_empty() => None,
        RoomUpdate::Typing(typing) => {
            let names: Vec<&str> = typing.iter().map(Identity::display_name).collect();
            Some(format!("* {} typing...", names.join(", ")))
        }
        RoomUpdate::Unread { badge, .. } => badge.as_ref().map(|b| format!("* {b} unread")),
        RoomUpdate::Completed(outcome) => {
            let mut line = format!("* Match over: {outcome}");
            if let Some(score) = outcome.local_score {
                line.push_str(&format!(", your score {score}"));
            }
            Some(line)
        }
        RoomUpdate::Notice(text) => Some(format!("! {text}")),
    }
}

fn clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
