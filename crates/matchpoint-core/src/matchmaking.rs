use serde::{Deserialize, Serialize};

use crate::game::{GameType, SkillLevel, UserId};

/// Caller-facing snapshot of a user's place in matchmaking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub in_queue: bool,
    pub game_type: Option<GameType>,
    pub skill_level: Option<SkillLevel>,
    /// 1-based FIFO position; 0 when not queued.
    pub position: usize,
    pub estimated_wait_secs: u32,
    pub alternative_games: Vec<GameType>,
}

impl QueueStatus {
    pub fn not_queued() -> Self {
        Self {
            in_queue: false,
            game_type: None,
            skill_level: None,
            position: 0,
            estimated_wait_secs: 0,
            alternative_games: GameType::alternatives().to_vec(),
        }
    }
}

/// One entry of a match-found roster, in seat order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedPlayer {
    pub user_id: UserId,
    pub display_name: String,
    pub skill_level: SkillLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_queued_status_suggests_alternatives() {
        let status = QueueStatus::not_queued();
        assert!(!status.in_queue);
        assert_eq!(status.position, 0);
        assert_eq!(status.alternative_games, GameType::alternatives());
    }

    #[test]
    fn queue_status_serializes_wire_names() {
        let status = QueueStatus {
            in_queue: true,
            game_type: Some(GameType::Chess),
            skill_level: Some(SkillLevel::Beginner),
            position: 2,
            estimated_wait_secs: 20,
            alternative_games: vec![],
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["game_type"], "CHESS");
        assert_eq!(json["skill_level"], "BEGINNER");
        assert_eq!(json["position"], 2);
    }
}
