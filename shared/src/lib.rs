use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_PLAYERS: usize = 5;
pub const MAX_PLAYERS: usize = 10;
pub const NUM_ROUNDS: usize = 5;
pub const MISSIONS_TO_WIN: u32 = 3;
pub const MAX_REJECTED_NOMINATIONS: u32 = 5;

/// Stable identity of a participant, supplied by the identity source before
/// any move is accepted.
pub type PlayerId = String;

/// Identifier a client uses to address a game session.
pub type GameId = u64;

/// Moves sent from a client to the server.
///
/// Every message is a JSON object with a `kind` discriminator, e.g.
/// `{"kind": "nomination_vote", "vote": true}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    Start,
    /// The payload is kept as raw JSON so that a malformed team reaches the
    /// server's team validation instead of failing the whole frame.
    Nominate {
        nomination: serde_json::Value,
    },
    NominationVote {
        vote: bool,
    },
    MissionVote {
        vote: bool,
    },
    CatchUp,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Start => "start",
            ClientMessage::Nominate { .. } => "nominate",
            ClientMessage::NominationVote { .. } => "nomination_vote",
            ClientMessage::MissionVote { .. } => "mission_vote",
            ClientMessage::CatchUp => "catch_up",
        }
    }
}

/// Messages sent from the server to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    LobbyUpdate {
        players: Vec<PlayerId>,
    },
    GameStart {
        players: Vec<PlayerId>,
        num_players: usize,
        num_spies: usize,
        agents_per_round: Vec<usize>,
        is_spy: bool,
        /// Only present for spies.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spies: Option<Vec<PlayerId>>,
    },
    RoundStart {
        mission_size: usize,
        mission_number: u32,
    },
    NominationStart {
        mission_leader: PlayerId,
        vote_track: u32,
    },
    MissionNominated {
        mission: Vec<PlayerId>,
        mission_leader: PlayerId,
    },
    NominationVoteResults {
        results: BTreeMap<PlayerId, bool>,
        approved: bool,
        vote_track: u32,
        mission: Vec<PlayerId>,
    },
    MissionStart {
        mission: Vec<PlayerId>,
        mission_leader: PlayerId,
    },
    MissionResult {
        mission_number: u32,
        mission_succeeded: bool,
        num_fails: usize,
    },
    GameOver {
        resistance_won: bool,
        spies: Vec<PlayerId>,
    },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::LobbyUpdate { .. } => "lobby_update",
            ServerMessage::GameStart { .. } => "game_start",
            ServerMessage::RoundStart { .. } => "round_start",
            ServerMessage::NominationStart { .. } => "nomination_start",
            ServerMessage::MissionNominated { .. } => "mission_nominated",
            ServerMessage::NominationVoteResults { .. } => "nomination_vote_results",
            ServerMessage::MissionStart { .. } => "mission_start",
            ServerMessage::MissionResult { .. } => "mission_result",
            ServerMessage::GameOver { .. } => "game_over",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_kinds_parse() {
        let start: ClientMessage = serde_json::from_value(json!({"kind": "start"})).unwrap();
        assert_eq!(start, ClientMessage::Start);

        let vote: ClientMessage =
            serde_json::from_value(json!({"kind": "nomination_vote", "vote": false})).unwrap();
        assert_eq!(vote, ClientMessage::NominationVote { vote: false });

        let catch_up: ClientMessage =
            serde_json::from_value(json!({"kind": "catch_up"})).unwrap();
        assert_eq!(catch_up.kind(), "catch_up");
    }

    #[test]
    fn test_nominate_keeps_raw_payload() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"kind": "nominate", "nomination": "alice"})).unwrap();

        match msg {
            ClientMessage::Nominate { nomination } => assert_eq!(nomination, json!("alice")),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_or_malformed_client_messages_fail() {
        assert!(serde_json::from_value::<ClientMessage>(json!({"kind": "cheat"})).is_err());
        assert!(serde_json::from_value::<ClientMessage>(json!({"vote": true})).is_err());
        assert!(serde_json::from_value::<ClientMessage>(
            json!({"kind": "mission_vote", "vote": "yes"})
        )
        .is_err());
    }

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::NominationStart {
            mission_leader: "alice".to_string(),
            vote_track: 2,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"kind": "nomination_start", "mission_leader": "alice", "vote_track": 2})
        );
        assert_eq!(msg.kind(), "nomination_start");
    }

    #[test]
    fn test_spy_list_only_serialized_for_spies() {
        let resistance = ServerMessage::GameStart {
            players: vec!["a".into(), "b".into()],
            num_players: 2,
            num_spies: 1,
            agents_per_round: vec![1],
            is_spy: false,
            spies: None,
        };
        let value = serde_json::to_value(&resistance).unwrap();
        assert!(value.get("spies").is_none());
        assert_eq!(value["is_spy"], json!(false));

        let spy = ServerMessage::GameStart {
            players: vec!["a".into(), "b".into()],
            num_players: 2,
            num_spies: 1,
            agents_per_round: vec![1],
            is_spy: true,
            spies: Some(vec!["b".into()]),
        };
        let value = serde_json::to_value(&spy).unwrap();
        assert_eq!(value["spies"], json!(["b"]));
    }
}
