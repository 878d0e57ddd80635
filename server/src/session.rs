//! Per-game session actor
//!
//! One tokio task owns the [`Game`] and its [`ConnectionRegistry`] and
//! consumes commands from a single queue. Every move, including the vote
//! that triggers a tally, is processed to completion before the next
//! command is read, so two final votes arriving together tally once.

use crate::connection_registry::{Connection, ConnectionRegistry};
use crate::game::{ConnectionId, Game};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientMessage, GameId, PlayerId, ServerMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Commands sent from connection tasks to a session
#[derive(Debug)]
pub enum SessionCommand {
    Connect {
        connection: ConnectionId,
        player: PlayerId,
        sender: mpsc::UnboundedSender<ServerMessage>,
        admitted: oneshot::Sender<bool>,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Move {
        connection: ConnectionId,
        player: PlayerId,
        message: ClientMessage,
    },
}

/// Cloneable handle used to talk to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    game_id: GameId,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// True once the session task has finished
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Returns true if both handles address the same session task
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        self.commands.same_channel(&other.commands)
    }

    /// Asks the session to admit a connection
    ///
    /// Returns `None` if the session has already ended, otherwise whether
    /// the identity was admitted.
    pub async fn connect(
        &self,
        connection: ConnectionId,
        player: PlayerId,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Option<bool> {
        let (admitted, reply) = oneshot::channel();
        let command = SessionCommand::Connect {
            connection,
            player,
            sender,
            admitted,
        };
        self.commands.send(command).await.ok()?;
        reply.await.ok()
    }

    pub async fn disconnect(&self, connection: ConnectionId) {
        // A finished session has already dropped every connection
        let _ = self
            .commands
            .send(SessionCommand::Disconnect { connection })
            .await;
    }

    /// Queues a move; returns false if the session has ended
    pub async fn player_move(
        &self,
        connection: ConnectionId,
        player: PlayerId,
        message: ClientMessage,
    ) -> bool {
        self.commands
            .send(SessionCommand::Move {
                connection,
                player,
                message,
            })
            .await
            .is_ok()
    }
}

/// State owned by the session task
pub struct Session {
    game_id: GameId,
    game: Game,
    registry: ConnectionRegistry,
    rng: StdRng,
    commands: mpsc::Receiver<SessionCommand>,
}

impl Session {
    /// Spawns a session task seeded from OS entropy
    ///
    /// `on_finished` runs exactly once, after the game reaches its end and
    /// every connection has been released.
    pub fn spawn<F>(
        game_id: GameId,
        capacity: usize,
        on_finished: F,
    ) -> (SessionHandle, JoinHandle<()>)
    where
        F: FnOnce(GameId) + Send + 'static,
    {
        Self::spawn_with_rng(game_id, capacity, StdRng::from_entropy(), on_finished)
    }

    pub fn spawn_with_rng<F>(
        game_id: GameId,
        capacity: usize,
        rng: StdRng,
        on_finished: F,
    ) -> (SessionHandle, JoinHandle<()>)
    where
        F: FnOnce(GameId) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Session {
            game_id,
            game: Game::new(),
            registry: ConnectionRegistry::new(),
            rng,
            commands: rx,
        };
        info!("Session {} created", game_id);

        let task = tokio::spawn(async move {
            session.run().await;
            on_finished(game_id);
        });

        (
            SessionHandle {
                game_id,
                commands: tx,
            },
            task,
        )
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle_command(command);

            if self.game.is_over() {
                break;
            }
        }

        info!(
            "Session {} finished, releasing {} connections",
            self.game_id,
            self.registry.len()
        );
        // Dropping the registry closes every writer queue once it drains
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect {
                connection,
                player,
                sender,
                admitted,
            } => {
                let accepted = self.game.can_join(&player);
                if accepted {
                    self.registry
                        .register(Connection::new(connection, player.clone(), sender));
                    for outgoing in self.game.join(&player) {
                        self.registry.deliver(&outgoing);
                    }
                } else {
                    info!(
                        "Session {} refused {}: not part of the running game",
                        self.game_id, player
                    );
                }

                if admitted.send(accepted).is_err() {
                    warn!("Connection {} went away while joining", connection);
                    self.disconnect(connection);
                }
            }
            SessionCommand::Disconnect { connection } => self.disconnect(connection),
            SessionCommand::Move {
                connection,
                player,
                message,
            } => {
                let connected = self.registry.players();
                match self
                    .game
                    .player_move(&player, connection, message, &connected, &mut self.rng)
                {
                    Ok(deliveries) => {
                        for outgoing in &deliveries {
                            self.registry.deliver(outgoing);
                        }
                    }
                    Err(rejection) => {
                        debug!(
                            "Session {} dropped move from {}: {}",
                            self.game_id, player, rejection
                        );
                    }
                }
            }
        }
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        if self.registry.unregister(connection).is_some() {
            let connected = self.registry.players();
            for outgoing in self.game.leave(&connected) {
                self.registry.deliver(&outgoing);
            }
        }
    }
}
