//! Authoritative state machine for one game session
//!
//! The engine never performs I/O. Every operation returns the ordered list
//! of deliveries it produced and the owning session routes them through its
//! connection registry. Moves that do not fit the current phase, come from
//! the wrong sender or carry a malformed payload are answered with a
//! [`Rejection`] and leave the game untouched.

use crate::rules;
use log::{debug, info};
use rand::Rng;
use shared::{ClientMessage, PlayerId, ServerMessage, MAX_REJECTED_NOMINATIONS};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Identifier of one transport connection inside a session.
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    NotStarted,
    Nominating,
    VotingMission,
    RunningMission,
    GameOver,
}

/// A message together with its intended recipients.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Every registered connection.
    Broadcast(ServerMessage),
    /// Every connection held by one identity.
    ToPlayer(PlayerId, ServerMessage),
    /// A single connection.
    ToConnection(ConnectionId, ServerMessage),
}

/// Why a move was dropped. Never sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{kind} is not accepted while {state:?}")]
    WrongPhase {
        kind: &'static str,
        state: GameState,
    },
    #[error("{0} is not the mission leader")]
    NotLeader(PlayerId),
    #[error("{0} is not playing in this game")]
    NotAPlayer(PlayerId),
    #[error("{0} is not on the current mission")]
    NotOnMission(PlayerId),
    #[error("nomination is not a list of player names")]
    NotASequence,
    #[error("nomination has {got} members, mission needs {expected}")]
    WrongTeamSize { expected: usize, got: usize },
    #[error("{0} is nominated more than once")]
    DuplicateMember(PlayerId),
    #[error("{0} is not part of the roster")]
    UnknownMember(PlayerId),
    #[error("cannot start with {0} connected players")]
    RosterSize(usize),
}

/// Outcome of one resolved mission, kept for catch-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionOutcome {
    pub round: usize,
    pub succeeded: bool,
    pub num_fails: usize,
}

impl MissionOutcome {
    fn message(&self) -> ServerMessage {
        ServerMessage::MissionResult {
            mission_number: self.round as u32 + 1,
            mission_succeeded: self.succeeded,
            num_fails: self.num_fails,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Game {
    state: GameState,
    lobby: Vec<PlayerId>,
    players: Vec<PlayerId>,
    spies: Vec<PlayerId>,
    mission_leader: usize,
    round_num: usize,
    successes: u32,
    mission: Option<Vec<PlayerId>>,
    nom_votes: BTreeMap<PlayerId, bool>,
    mission_votes: BTreeMap<PlayerId, bool>,
    nominations_rejected: u32,
    mission_results: Vec<MissionOutcome>,
    last_transition_message: Option<ServerMessage>,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    pub fn new() -> Self {
        Self {
            state: GameState::NotStarted,
            lobby: Vec::new(),
            players: Vec::new(),
            spies: Vec::new(),
            mission_leader: 0,
            round_num: 0,
            successes: 0,
            mission: None,
            nom_votes: BTreeMap::new(),
            mission_votes: BTreeMap::new(),
            nominations_rejected: 0,
            mission_results: Vec::new(),
            last_transition_message: None,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn is_over(&self) -> bool {
        self.state == GameState::GameOver
    }

    pub fn lobby(&self) -> &[PlayerId] {
        &self.lobby
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn spies(&self) -> &[PlayerId] {
        &self.spies
    }

    /// The identity expected to nominate next. `None` before the game starts.
    pub fn mission_leader(&self) -> Option<&PlayerId> {
        self.players.get(self.mission_leader)
    }

    pub fn round_num(&self) -> usize {
        self.round_num
    }

    pub fn successes(&self) -> u32 {
        self.successes
    }

    pub fn vote_track(&self) -> u32 {
        self.nominations_rejected
    }

    pub fn mission(&self) -> Option<&[PlayerId]> {
        self.mission.as_deref()
    }

    pub fn mission_results(&self) -> &[MissionOutcome] {
        &self.mission_results
    }

    pub fn has_player(&self, player: &PlayerId) -> bool {
        self.players.contains(player)
    }

    /// Whether a new connection for `player` may be admitted.
    ///
    /// Anyone may enter the lobby; once the roster is frozen only its
    /// members may reconnect.
    pub fn can_join(&self, player: &PlayerId) -> bool {
        match self.state {
            GameState::NotStarted => true,
            GameState::GameOver => false,
            _ => self.has_player(player),
        }
    }

    /// Adds a connecting identity to the lobby.
    pub fn join(&mut self, player: &PlayerId) -> Vec<Outgoing> {
        if self.state != GameState::NotStarted {
            return Vec::new();
        }

        if !self.lobby.contains(player) {
            self.lobby.push(player.clone());
        }

        vec![self.lobby_update()]
    }

    /// Recomputes the lobby from the identities that still hold a connection.
    ///
    /// Only membership matters; the lobby keeps its join order and nothing
    /// is broadcast while the set of identities is unchanged.
    pub fn leave(&mut self, connected: &[PlayerId]) -> Vec<Outgoing> {
        if self.state != GameState::NotStarted {
            return Vec::new();
        }

        let before = self.lobby.len();
        self.lobby.retain(|player| connected.contains(player));
        if self.lobby.len() == before {
            return Vec::new();
        }

        vec![self.lobby_update()]
    }

    fn lobby_update(&self) -> Outgoing {
        Outgoing::Broadcast(ServerMessage::LobbyUpdate {
            players: self.lobby.clone(),
        })
    }

    /// Routes one move to the handler of the current phase.
    ///
    /// `connected` is the set of distinct identities currently holding a
    /// connection, in registration order.
    pub fn player_move<R: Rng + ?Sized>(
        &mut self,
        sender: &PlayerId,
        connection: ConnectionId,
        message: ClientMessage,
        connected: &[PlayerId],
        rng: &mut R,
    ) -> Result<Vec<Outgoing>, Rejection> {
        let mut out = Vec::new();

        if let ClientMessage::CatchUp = message {
            out.extend(self.catch_up(sender, connection));
            return Ok(out);
        }

        match self.state {
            GameState::NotStarted => self.not_started(message, connected, rng, &mut out)?,
            GameState::Nominating => self.nominating(sender, message, &mut out)?,
            GameState::VotingMission => self.voting_mission(sender, message, &mut out)?,
            GameState::RunningMission => self.running_mission(sender, message, &mut out)?,
            GameState::GameOver => return Err(self.wrong_phase(&message)),
        }

        Ok(out)
    }

    fn wrong_phase(&self, message: &ClientMessage) -> Rejection {
        Rejection::WrongPhase {
            kind: message.kind(),
            state: self.state,
        }
    }

    fn not_started<R: Rng + ?Sized>(
        &mut self,
        message: ClientMessage,
        connected: &[PlayerId],
        rng: &mut R,
        out: &mut Vec<Outgoing>,
    ) -> Result<(), Rejection> {
        match message {
            ClientMessage::Start => self.start(connected, rng, out),
            other => Err(self.wrong_phase(&other)),
        }
    }

    fn start<R: Rng + ?Sized>(
        &mut self,
        connected: &[PlayerId],
        rng: &mut R,
        out: &mut Vec<Outgoing>,
    ) -> Result<(), Rejection> {
        let mut seen = HashSet::new();
        let players: Vec<PlayerId> = connected
            .iter()
            .filter(|player| seen.insert(*player))
            .cloned()
            .collect();

        if !rules::valid_player_count(players.len()) {
            return Err(Rejection::RosterSize(players.len()));
        }

        self.players = players;
        self.mission_leader = rules::choose_mission_leader(rng, self.players.len());
        self.spies = rules::assign_spies(rng, &self.players);
        info!(
            "Game starting with {} players and {} spies",
            self.players.len(),
            self.spies.len()
        );

        for player in &self.players {
            out.push(Outgoing::ToPlayer(
                player.clone(),
                self.game_start_message(player),
            ));
        }

        self.start_round(out);
        Ok(())
    }

    /// The role-specific start payload for one recipient.
    fn game_start_message(&self, player: &PlayerId) -> ServerMessage {
        let is_spy = self.spies.contains(player);
        ServerMessage::GameStart {
            players: self.players.clone(),
            num_players: self.players.len(),
            num_spies: self.spies.len(),
            agents_per_round: rules::agents_per_round(self.players.len()),
            is_spy,
            spies: is_spy.then(|| self.spies.clone()),
        }
    }

    fn mission_size(&self) -> usize {
        rules::mission_size(self.players.len(), self.round_num)
    }

    fn round_start_message(&self) -> ServerMessage {
        ServerMessage::RoundStart {
            mission_size: self.mission_size(),
            mission_number: self.round_num as u32 + 1,
        }
    }

    fn start_round(&mut self, out: &mut Vec<Outgoing>) {
        self.nominations_rejected = 0;
        info!("Round {} starting", self.round_num + 1);
        out.push(Outgoing::Broadcast(self.round_start_message()));
        self.start_nomination(out);
    }

    fn start_nomination(&mut self, out: &mut Vec<Outgoing>) {
        self.state = GameState::Nominating;
        let message = ServerMessage::NominationStart {
            mission_leader: self.players[self.mission_leader].clone(),
            vote_track: self.nominations_rejected,
        };
        self.transition(message, out);
    }

    /// Broadcasts a phase change and keeps it for late joiners.
    fn transition(&mut self, message: ServerMessage, out: &mut Vec<Outgoing>) {
        self.last_transition_message = Some(message.clone());
        out.push(Outgoing::Broadcast(message));
    }

    fn nominating(
        &mut self,
        sender: &PlayerId,
        message: ClientMessage,
        out: &mut Vec<Outgoing>,
    ) -> Result<(), Rejection> {
        let nomination = match message {
            ClientMessage::Nominate { nomination } => nomination,
            other => return Err(self.wrong_phase(&other)),
        };

        if self.players[self.mission_leader] != *sender {
            return Err(Rejection::NotLeader(sender.clone()));
        }

        let team = self.validate_mission(&nomination)?;

        self.mission_leader = rules::next_mission_leader(self.mission_leader, self.players.len());
        self.nom_votes.clear();
        self.mission = Some(team.clone());
        self.state = GameState::VotingMission;

        let message = ServerMessage::MissionNominated {
            mission: team,
            mission_leader: sender.clone(),
        };
        self.transition(message, out);
        Ok(())
    }

    /// Checks a proposed team: a list of distinct roster members of exactly
    /// the current mission size.
    pub fn validate_mission(
        &self,
        nomination: &serde_json::Value,
    ) -> Result<Vec<PlayerId>, Rejection> {
        let members = nomination.as_array().ok_or(Rejection::NotASequence)?;

        let expected = self.mission_size();
        if members.len() != expected {
            return Err(Rejection::WrongTeamSize {
                expected,
                got: members.len(),
            });
        }

        let mut team: Vec<PlayerId> = Vec::with_capacity(members.len());
        for member in members {
            let name = member.as_str().ok_or(Rejection::NotASequence)?;
            if !self.players.iter().any(|player| player == name) {
                return Err(Rejection::UnknownMember(name.to_string()));
            }
            if team.iter().any(|chosen| chosen == name) {
                return Err(Rejection::DuplicateMember(name.to_string()));
            }
            team.push(name.to_string());
        }

        Ok(team)
    }

    fn voting_mission(
        &mut self,
        sender: &PlayerId,
        message: ClientMessage,
        out: &mut Vec<Outgoing>,
    ) -> Result<(), Rejection> {
        let vote = match message {
            ClientMessage::NominationVote { vote } => vote,
            other => return Err(self.wrong_phase(&other)),
        };

        if !self.has_player(sender) {
            return Err(Rejection::NotAPlayer(sender.clone()));
        }

        debug!("{} voted on the nomination", sender);
        self.nom_votes.insert(sender.clone(), vote);

        if self.nom_votes.len() == self.players.len() {
            self.process_votes(out);
        }
        Ok(())
    }

    fn process_votes(&mut self, out: &mut Vec<Outgoing>) {
        let approvals = self.nom_votes.values().filter(|vote| **vote).count();
        let approved = rules::mission_approved(self.players.len(), approvals);
        let mission = self.mission.clone().unwrap_or_default();

        if !approved {
            self.nominations_rejected += 1;
        }
        info!(
            "Nomination {} with {}/{} approvals (vote track {})",
            if approved { "approved" } else { "rejected" },
            approvals,
            self.players.len(),
            self.nominations_rejected
        );

        out.push(Outgoing::Broadcast(ServerMessage::NominationVoteResults {
            results: self.nom_votes.clone(),
            approved,
            vote_track: self.nominations_rejected,
            mission: mission.clone(),
        }));

        if approved {
            self.mission_votes.clear();
            self.state = GameState::RunningMission;
            let message = ServerMessage::MissionStart {
                mission,
                mission_leader: self.previous_leader().clone(),
            };
            self.transition(message, out);
        } else if self.nominations_rejected >= MAX_REJECTED_NOMINATIONS {
            self.end_game(out);
        } else {
            self.start_nomination(out);
        }
    }

    /// The leader who nominated the team in flight. Rotation happens at
    /// nomination time, so this is one seat behind the current leader.
    fn previous_leader(&self) -> &PlayerId {
        let count = self.players.len();
        &self.players[(self.mission_leader + count - 1) % count]
    }

    fn running_mission(
        &mut self,
        sender: &PlayerId,
        message: ClientMessage,
        out: &mut Vec<Outgoing>,
    ) -> Result<(), Rejection> {
        let vote = match message {
            ClientMessage::MissionVote { vote } => vote,
            other => return Err(self.wrong_phase(&other)),
        };

        let team_size = match self.mission.as_deref() {
            Some(team) if team.contains(sender) => team.len(),
            _ => return Err(Rejection::NotOnMission(sender.clone())),
        };

        debug!("{} voted on the mission", sender);
        self.mission_votes.insert(sender.clone(), vote);

        if self.mission_votes.len() == team_size {
            self.process_mission(out);
        }
        Ok(())
    }

    fn process_mission(&mut self, out: &mut Vec<Outgoing>) {
        let num_fails = self.mission_votes.values().filter(|vote| !**vote).count();
        let outcome = MissionOutcome {
            round: self.round_num,
            succeeded: rules::mission_succeeds(self.players.len(), self.round_num, num_fails),
            num_fails,
        };
        info!(
            "Mission {} {} with {} fails",
            self.round_num + 1,
            if outcome.succeeded { "succeeded" } else { "failed" },
            num_fails
        );

        out.push(Outgoing::Broadcast(outcome.message()));
        if outcome.succeeded {
            self.successes += 1;
        }
        self.mission_results.push(outcome);

        if rules::game_over(self.round_num, self.successes) {
            self.end_game(out);
        } else {
            self.round_num += 1;
            self.start_round(out);
        }
    }

    fn end_game(&mut self, out: &mut Vec<Outgoing>) {
        self.state = GameState::GameOver;
        let resistance_won = rules::resistance_won(self.successes);
        info!(
            "Game over, {} won",
            if resistance_won { "resistance" } else { "spies" }
        );

        out.push(Outgoing::Broadcast(ServerMessage::GameOver {
            resistance_won,
            spies: self.spies.clone(),
        }));
    }

    /// Replays what a (re)connecting client needs to rebuild the current
    /// state, addressed to that connection only.
    pub fn catch_up(&self, player: &PlayerId, connection: ConnectionId) -> Vec<Outgoing> {
        if matches!(self.state, GameState::NotStarted | GameState::GameOver) {
            return Vec::new();
        }

        let mut out = vec![Outgoing::ToConnection(
            connection,
            self.game_start_message(player),
        )];
        out.extend(
            self.mission_results
                .iter()
                .map(|outcome| Outgoing::ToConnection(connection, outcome.message())),
        );
        out.push(Outgoing::ToConnection(connection, self.round_start_message()));
        if let Some(message) = &self.last_transition_message {
            out.push(Outgoing::ToConnection(connection, message.clone()));
        }
        out
    }
}
