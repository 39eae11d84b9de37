//! # Relay Chat
//!
//! Interactive terminal client for a Relay server.
//!
//! ```bash
//! relay-chat                          # ws://127.0.0.1:3000/ws
//! relay-chat ws://chat.example:3000/ws
//! ```
//!
//! Type `@<user> text` to message a user, `#<room> text` to message a room and
//! `/quit` to leave.

mod command;

use anyhow::{Context, Result};
use command::{parse_line, Command};
use futures_util::{SinkExt, StreamExt};
use relay_protocol::{Envelope, SocketEvent, Target};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_URL: &str = "ws://127.0.0.1:3000/ws";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_chat=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_URL.to_string());

    let (socket, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    println!("Connected to {url}");

    let (mut sink, mut stream) = socket.split();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut identity: Option<String> = None;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if identity.is_none() {
                        identity = welcome_identity(text.as_bytes());
                    }
                    println!("{}", render(text.as_bytes()));
                }
                Some(Ok(Message::Binary(data))) => println!("{}", render(&data)),
                Some(Ok(Message::Close(_))) | None => {
                    println!("* Server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Connection error");
                    break;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let envelope = match parse_line(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Empty) => continue,
                    Ok(Command::Direct { to, text }) => {
                        Envelope::direct(identity.clone().unwrap_or_default(), to, text)
                    }
                    Ok(Command::Room { room, text }) => {
                        Envelope::room(identity.clone().unwrap_or_default(), room, text)
                    }
                    Err(e) => {
                        eprintln!("! {e}");
                        continue;
                    }
                };
                let payload = relay_protocol::encode(&envelope)?;
                let text = String::from_utf8(payload.to_vec())?;
                debug!(bytes = text.len(), "Sending");
                sink.send(Message::Text(text)).await?;
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    Ok(())
}

/// Identity assigned by the server, if `frame` is the welcome notice.
fn welcome_identity(frame: &[u8]) -> Option<String> {
    let event = SocketEvent::from_bytes(frame)?;
    if !event.is_system() || event.action != relay_protocol::event::ACTION_WELCOME {
        return None;
    }
    event.data.get("user_id")?.as_str().map(str::to_string)
}

/// Format one inbound frame for the terminal.
fn render(frame: &[u8]) -> String {
    if let Some(event) = SocketEvent::from_bytes(frame) {
        if let Some(message) = event.message() {
            return format!("* {message}");
        }
    }

    match Envelope::parse(frame) {
        Ok(envelope) => match envelope.target() {
            Target::Room(room) => format!("[#{room}] {}: {}", envelope.from, envelope.data),
            _ => format!("{}: {}", envelope.from, envelope.data),
        },
        Err(_) => String::from_utf8_lossy(frame).into_owned(),
    }
}
