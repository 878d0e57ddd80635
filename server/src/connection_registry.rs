//! Connection tracking and message fan-out for one game session
//!
//! This module handles the session-side view of connected transports:
//! - Registration and removal of connections, each tied to a player identity
//! - Multiple simultaneous connections per identity (tabs, devices)
//! - Broadcasting a message to every registered connection
//! - Deriving the set of distinct connected identities for the lobby
//!
//! The registry is owned by the session task, so registration changes and
//! broadcast iteration never interleave.

use crate::game::{ConnectionId, Outgoing};
use log::{debug, info};
use shared::{PlayerId, ServerMessage};
use tokio::sync::mpsc;

/// One registered transport
///
/// The sender feeds the connection's writer task. Sending never blocks, so a
/// slow socket only grows its own queue.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier assigned by the network layer
    pub id: ConnectionId,
    /// Identity established before the connection was registered
    pub player: PlayerId,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        player: PlayerId,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self { id, player, sender }
    }

    /// Queues a message for this connection
    ///
    /// Returns false if the transport has already gone away.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Multiset of (connection, identity) pairs for one session
///
/// Connections are kept in registration order, which also fixes the order
/// of the distinct identity list used to freeze the roster at game start.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
        }
    }

    /// Registers a connection
    ///
    /// Returns false if the connection ID is already registered, leaving
    /// the existing entry untouched.
    pub fn register(&mut self, connection: Connection) -> bool {
        if self.connections.iter().any(|c| c.id == connection.id) {
            return false;
        }

        info!(
            "Connection {} registered for {}",
            connection.id, connection.player
        );
        self.connections.push(connection);
        true
    }

    /// Removes a connection, returning the identity it belonged to
    ///
    /// Unknown IDs are ignored, so removing twice is harmless.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<PlayerId> {
        let index = self.connections.iter().position(|c| c.id == id)?;
        let connection = self.connections.remove(index);
        info!("Connection {} for {} closed", id, connection.player);
        Some(connection.player)
    }

    /// Distinct identities holding at least one connection, in order of
    /// their first registration
    pub fn players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = Vec::new();
        for connection in &self.connections {
            if !players.contains(&connection.player) {
                players.push(connection.player.clone());
            }
        }
        players
    }

    pub fn contains_player(&self, player: &PlayerId) -> bool {
        self.connections.iter().any(|c| c.player == *player)
    }

    /// Sends a message to every registered connection
    ///
    /// A connection whose transport has gone away is skipped; the others
    /// still receive the message. Returns the number of successful sends.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        self.connections
            .iter()
            .filter(|connection| Self::deliver_to(connection, message.clone()))
            .count()
    }

    /// Sends a message to every connection of one identity
    pub fn send_to_player(&self, player: &PlayerId, message: &ServerMessage) -> usize {
        self.connections
            .iter()
            .filter(|connection| connection.player == *player)
            .filter(|connection| Self::deliver_to(connection, message.clone()))
            .count()
    }

    /// Sends a message to a single connection
    pub fn send_to_connection(&self, id: ConnectionId, message: &ServerMessage) -> bool {
        self.connections
            .iter()
            .find(|connection| connection.id == id)
            .map(|connection| Self::deliver_to(connection, message.clone()))
            .unwrap_or(false)
    }

    /// Routes an engine delivery to its recipients
    pub fn deliver(&self, outgoing: &Outgoing) {
        match outgoing {
            Outgoing::Broadcast(message) => {
                self.broadcast(message);
            }
            Outgoing::ToPlayer(player, message) => {
                self.send_to_player(player, message);
            }
            Outgoing::ToConnection(id, message) => {
                self.send_to_connection(*id, message);
            }
        }
    }

    fn deliver_to(connection: &Connection, message: ServerMessage) -> bool {
        let sent = connection.send(message);
        if !sent {
            debug!("Connection {} dropped before delivery", connection.id);
        }
        sent
    }

    /// Returns the number of registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connections are registered
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Tests cover registration idempotency, multi-connection identities and
/// broadcast behaviour when some transports are gone.
#[cfg(test)]
mod tests {
    use super::*;

    fn connection(
        id: ConnectionId,
        player: &str,
    ) -> (Connection, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(id, player.to_string(), tx), rx)
    }

    fn lobby(players: &[&str]) -> ServerMessage {
        ServerMessage::LobbyUpdate {
            players: players.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.players().is_empty());
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (first, _rx1) = connection(1, "alice");
        let (again, _rx2) = connection(1, "alice");

        assert!(registry.register(first));
        assert!(!registry.register(again));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (conn, _rx) = connection(1, "alice");
        registry.register(conn);

        assert_eq!(registry.unregister(1), Some("alice".to_string()));
        assert_eq!(registry.unregister(1), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_players_are_distinct_identities() {
        let mut registry = ConnectionRegistry::new();
        let (a1, _rx1) = connection(1, "alice");
        let (b, _rx2) = connection(2, "bob");
        let (a2, _rx3) = connection(3, "alice");

        registry.register(a1);
        registry.register(b);
        registry.register(a2);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.players(), vec!["alice".to_string(), "bob".to_string()]);

        // Closing one of alice's tabs keeps her present
        registry.unregister(1);
        assert!(registry.contains_player(&"alice".to_string()));
        assert_eq!(registry.players(), vec!["bob".to_string(), "alice".to_string()]);

        registry.unregister(3);
        assert!(!registry.contains_player(&"alice".to_string()));
    }

    #[test]
    fn test_broadcast_reaches_every_connection() {
        let mut registry = ConnectionRegistry::new();
        let (a1, mut rx1) = connection(1, "alice");
        let (a2, mut rx2) = connection(2, "alice");
        let (b, mut rx3) = connection(3, "bob");
        registry.register(a1);
        registry.register(a2);
        registry.register(b);

        let message = lobby(&["alice", "bob"]);
        assert_eq!(registry.broadcast(&message), 3);

        assert_eq!(rx1.try_recv().unwrap(), message);
        assert_eq!(rx2.try_recv().unwrap(), message);
        assert_eq!(rx3.try_recv().unwrap(), message);
    }

    #[test]
    fn test_broadcast_skips_closed_transports() {
        let mut registry = ConnectionRegistry::new();
        let (a, rx1) = connection(1, "alice");
        let (b, mut rx2) = connection(2, "bob");
        registry.register(a);
        registry.register(b);

        drop(rx1);

        let message = lobby(&["alice", "bob"]);
        assert_eq!(registry.broadcast(&message), 1);
        assert_eq!(rx2.try_recv().unwrap(), message);
    }

    #[test]
    fn test_send_to_player_and_connection() {
        let mut registry = ConnectionRegistry::new();
        let (a1, mut rx1) = connection(1, "alice");
        let (a2, mut rx2) = connection(2, "alice");
        let (b, mut rx3) = connection(3, "bob");
        registry.register(a1);
        registry.register(a2);
        registry.register(b);

        let message = lobby(&["alice"]);
        assert_eq!(registry.send_to_player(&"alice".to_string(), &message), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());

        assert!(registry.send_to_connection(3, &message));
        assert!(!registry.send_to_connection(99, &message));
        assert_eq!(rx3.try_recv().unwrap(), message);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_deliver_routes_outgoing() {
        let mut registry = ConnectionRegistry::new();
        let (a, mut rx1) = connection(1, "alice");
        let (b, mut rx2) = connection(2, "bob");
        registry.register(a);
        registry.register(b);

        let message = lobby(&[]);
        registry.deliver(&Outgoing::ToConnection(2, message.clone()));
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), message);

        registry.deliver(&Outgoing::Broadcast(message.clone()));
        assert_eq!(rx1.try_recv().unwrap(), message);
        assert_eq!(rx2.try_recv().unwrap(), message);
    }
}
