//! Server network layer handling WebSocket connections
//!
//! Each accepted socket is bound to one game session and one player
//! identity during the handshake. The connection then runs two halves:
//! a writer task draining the connection's outbound queue into the socket,
//! and a reader loop forwarding parsed moves to the session.

use crate::game::ConnectionId;
use crate::session_table::SessionTable;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, GameId, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const MAX_NAME_LENGTH: usize = 20;

/// Why a handshake was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("expected a path of the form /play/<game_id>/ws")]
    BadPath,
    #[error("missing player query parameter")]
    MissingPlayer,
    #[error("player names are 1-20 letters, digits or underscores")]
    BadPlayerName,
}

/// Returns true for names allowed by account registration: 1-20 ASCII
/// letters, digits or underscores.
pub fn valid_player_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extracts the game id and player identity from `/play/<id>/ws?player=<name>`
pub fn parse_target(path: &str, query: Option<&str>) -> Result<(GameId, PlayerId), HandshakeError> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let game_id = match segments.as_slice() {
        ["play", id, "ws"] => id.parse::<GameId>().map_err(|_| HandshakeError::BadPath)?,
        _ => return Err(HandshakeError::BadPath),
    };

    let player = query
        .unwrap_or("")
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "player")
        .map(|(_, value)| value)
        .ok_or(HandshakeError::MissingPlayer)?;

    if !valid_player_name(player) {
        return Err(HandshakeError::BadPlayerName);
    }

    Ok((game_id, player.to_string()))
}

/// Main server accepting WebSocket clients and routing them to sessions
pub struct Server {
    listener: TcpListener,
    sessions: SessionTable,
    next_connection_id: Arc<AtomicU64>,
}

impl Server {
    pub async fn new(addr: &str, queue_capacity: usize) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            sessions: SessionTable::new(queue_capacity),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Accept loop; runs until the listener fails
    pub async fn run(self) -> Result<(), BoxError> {
        info!("Server started successfully");

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let connection = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
            let sessions = self.sessions.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, connection, sessions).await {
                    warn!("Connection {} from {} failed: {}", connection, addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection: ConnectionId,
    sessions: SessionTable,
) -> Result<(), BoxError> {
    let mut target = None;
    let callback = |request: &Request, response: Response| {
        let uri = request.uri();
        match parse_target(uri.path(), uri.query()) {
            Ok(parsed) => {
                target = Some(parsed);
                Ok(response)
            }
            Err(e) => {
                let mut refusal = ErrorResponse::new(Some(e.to_string()));
                *refusal.status_mut() = StatusCode::BAD_REQUEST;
                Err(refusal)
            }
        }
    };

    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (game_id, player) = target.ok_or("handshake finished without a target")?;
    info!(
        "Connection {} from {} opened for {} in game {}",
        connection, addr, player, game_id
    );

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let session = match sessions.connect(game_id, connection, player.clone(), tx).await {
        Some(session) => session,
        None => {
            info!("{} may not join game {}", player, game_id);
            ws_tx.send(Message::Close(None)).await?;
            return Ok(());
        }
    };

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {}: {}", message.kind(), e);
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                debug!("Connection {} stopped accepting messages: {}", connection, e);
                return;
            }
        }
        // Session released this connection
        let _ = ws_tx.close().await;
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if !session.player_move(connection, player.clone(), message).await {
                        break;
                    }
                }
                Err(e) => debug!("Ignoring malformed message from {}: {}", player, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Connection {} read error: {}", connection, e);
                break;
            }
        }
    }

    session.disconnect(connection).await;
    let _ = writer.await;
    info!("Connection {} from {} closed", connection, addr);
    Ok(())
}
