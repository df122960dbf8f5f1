use serde::{Deserialize, Serialize};

use crate::game::{GameType, UserId};
use crate::matchmaking::{MatchedPlayer, QueueStatus};
use crate::session::SessionId;
use crate::update::StateUpdate;

/// Roster entry for the per-session participants topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub position: u8,
    pub connected: bool,
}

/// The outbound logical message contract. The transport layer addresses
/// each notification by its `topic()`; the wire encoding belongs to the
/// transport, this enum only fixes the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    MatchFound {
        session_id: SessionId,
        game_type: GameType,
        players: Vec<MatchedPlayer>,
    },
    QueueStatus {
        status: QueueStatus,
    },
    QueueTimeout {
        message: String,
        alternatives: Vec<GameType>,
    },
    StateUpdate {
        session_id: SessionId,
        update: StateUpdate,
    },
    Participants {
        session_id: SessionId,
        roster: Vec<RosterEntry>,
    },
}

impl Notification {
    /// Logical topic the transport should deliver this on.
    pub fn topic(&self) -> String {
        match self {
            Self::MatchFound { .. } => "matchmaking/match-found".to_string(),
            Self::QueueStatus { .. } => "matchmaking/queue-status".to_string(),
            Self::QueueTimeout { .. } => "matchmaking/queue-timeout".to_string(),
            Self::StateUpdate { session_id, .. } => format!("session/{session_id}/state"),
            Self::Participants { session_id, .. } => format!("session/{session_id}/participants"),
        }
    }
}
