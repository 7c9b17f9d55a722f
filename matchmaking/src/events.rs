//! Wire events between a client and the matchmaker.
//!
//! Both directions are JSON objects tagged by `type`:
//!
//! ```json
//! {"type":"enqueue","dare":"cold shower","wager_coins":20}
//! {"type":"match_found","session_id":7,"opponent":"bob", ...}
//! ```

use serde::{Deserialize, Serialize};

use dareduel_types::{BattleId, SessionId, Timestamp, UserId};

/// Client → server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Enqueue {
        dare: String,
        wager_coins: u64,
    },
    CancelEnqueue,
    /// `session_id` is optional; when present, an accept aimed at an older
    /// session is dropped instead of applied to the current one.
    AcceptMatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    DeclineMatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
}

/// Server → client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Queued {
        wager_coins: u64,
    },
    MatchFound {
        session_id: SessionId,
        opponent: UserId,
        opponent_display_name: String,
        /// The opponent's dare.
        dare: String,
        wager_coins: u64,
        deadline: Timestamp,
    },
    MatchTimeout {
        session_id: SessionId,
    },
    OpponentAccepted {
        session_id: SessionId,
    },
    OpponentDeclined {
        session_id: SessionId,
    },
    /// The client's original request is waiting in the queue again.
    Requeue {
        wager_coins: u64,
    },
    StartGame {
        battle_id: BattleId,
    },
    EnqueueCancelled,
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_commands_use_snake_case_type_tag() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"enqueue","dare":"run","wager_coins":20}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Enqueue {
                dare: "run".into(),
                wager_coins: 20
            }
        );
        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"accept_match"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::AcceptMatch { session_id: None });
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"decline_match","session_id":3}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::DeclineMatch {
                session_id: Some(SessionId::new(3))
            }
        );
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"dance"}"#).is_err());
    }

    #[test]
    fn server_events_render_flat_objects() {
        let json = serde_json::to_value(ServerEvent::StartGame {
            battle_id: BattleId::new([1; 16]),
        })
        .unwrap();
        assert_eq!(json["type"], "start_game");
        assert_eq!(json["battle_id"], "01".repeat(16));

        let json = serde_json::to_value(ServerEvent::error("already_queued", "x")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "already_queued");

        let json = serde_json::to_value(ServerEvent::EnqueueCancelled).unwrap();
        assert_eq!(json, serde_json::json!({"type": "enqueue_cancelled"}));
    }
}
