//! Owned table of live game sessions
//!
//! A session is created the first time its game id is addressed and removed
//! by its own completion hook once the game is over. Removal only touches
//! the entry if it still refers to the finished session, so an id that was
//! already reused for a fresh lobby is left alone.

use crate::game::ConnectionId;
use crate::session::{Session, SessionHandle};
use log::info;
use shared::{GameId, PlayerId, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Shared handle to the session table
#[derive(Debug, Clone)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<GameId, SessionHandle>>>,
    queue_capacity: usize,
}

impl SessionTable {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            queue_capacity,
        }
    }

    /// Returns the live session for `game_id`, creating it if needed
    pub async fn get_or_create(&self, game_id: GameId) -> SessionHandle {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(&game_id) {
                if !handle.is_closed() {
                    return handle.clone();
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(&game_id) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }

        let table = self.clone();
        let (handle, _task) = Session::spawn(game_id, self.queue_capacity, move |finished_id| {
            table.release(finished_id);
        });
        sessions.insert(game_id, handle.clone());
        handle
    }

    /// Admits a connection into the session for `game_id`
    ///
    /// Returns the session handle if the identity was admitted. A session
    /// that ends between lookup and admission is replaced once.
    pub async fn connect(
        &self,
        game_id: GameId,
        connection: ConnectionId,
        player: PlayerId,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Option<SessionHandle> {
        for _ in 0..2 {
            let handle = self.get_or_create(game_id).await;
            match handle
                .connect(connection, player.clone(), sender.clone())
                .await
            {
                Some(true) => return Some(handle),
                Some(false) => return None,
                None => continue,
            }
        }
        None
    }

    /// Completion hook: drops the table entry of a finished session
    fn release(&self, game_id: GameId) {
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let mut sessions = sessions.write().await;
            let finished = sessions
                .get(&game_id)
                .map(|handle| handle.is_closed())
                .unwrap_or(false);
            if finished {
                sessions.remove(&game_id);
                info!("Session {} destroyed", game_id);
            }
        });
    }

    pub async fn contains(&self, game_id: GameId) -> bool {
        self.sessions.read().await.contains_key(&game_id)
    }

    /// Returns the number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
