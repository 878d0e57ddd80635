//! # Game Server Library
//!
//! This library provides the authoritative server for a hidden-role voting
//! game played by five to ten players. It owns every game session, accepts
//! player moves, and broadcasts the resulting role-filtered state to all
//! connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State Machine
//! Each session runs the definitive version of the game: secret role
//! assignment, mission nomination, approval voting, mission execution and
//! win evaluation. Clients only ever see what their role allows.
//!
//! ### Connection Management
//! Handles the lifecycle of client connections including:
//! - Identity binding during the WebSocket handshake
//! - Several simultaneous connections per player (tabs, devices)
//! - Lobby membership derived from the distinct connected identities
//! - Resynchronising reconnecting clients through catch-up
//!
//! ### State Broadcasting
//! Every phase change is broadcast to all connections of a session. The
//! most recent phase change is retained so that a late client can rebuild
//! the current state without having seen earlier broadcasts.
//!
//! ## Architecture Design
//!
//! ### One Actor Per Session
//! Each session is a single tokio task consuming an ordered command queue.
//! Validation, tallying, state transitions and fan-out for one move finish
//! before the next move is read, so concurrent final votes cannot trigger
//! two tallies. Independent sessions share no mutable state.
//!
//! ### Non-Blocking Fan-Out
//! Every connection owns an unbounded outbound queue drained by its own
//! writer task. Broadcasting only enqueues, so a slow client never stalls
//! the session or other clients.
//!
//! ### Silent Rejection
//! Moves that do not fit the current phase, come from the wrong player or
//! carry a malformed payload are dropped without a reply and logged at
//! debug level. None of them can damage a session.
//!
//! ## Module Organization
//!
//! ### Rules Module (`rules`)
//! Mission size and fail tolerance tables, spy counts, majority and
//! termination arithmetic, random role and leader selection.
//!
//! ### Game Module (`game`)
//! The session state machine. Pure with respect to I/O: every operation
//! returns the deliveries it produced.
//!
//! ### Connection Registry Module (`connection_registry`)
//! Per-session multiset of connections and message fan-out.
//!
//! ### Session Module (`session`)
//! The per-session actor tying a game to its registry.
//!
//! ### Session Table Module (`session_table`)
//! Creates sessions on first use and releases them when a game ends.
//!
//! ### Network Module (`network`)
//! WebSocket accept loop, handshake parsing and per-connection tasks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::network::BoxError> {
//!     // Clients connect to ws://127.0.0.1:8080/play/<game_id>/ws?player=<name>
//!     let server = Server::new("127.0.0.1:8080", 1024).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod connection_registry;
pub mod game;
pub mod network;
pub mod rules;
pub mod session;
pub mod session_table;
