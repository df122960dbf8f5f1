use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::game::{GameType, UserId};

/// Unique identifier for a game session.
pub type SessionId = Uuid;

/// Session lifecycle. Transitions are forward-only; `Completed` and
/// `Cancelled` are terminal and freeze the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Waiting, SessionStatus::InProgress)
                | (SessionStatus::Waiting, SessionStatus::Cancelled)
                | (SessionStatus::InProgress, SessionStatus::Completed)
                | (SessionStatus::InProgress, SessionStatus::Cancelled)
        )
    }
}

/// Opaque, game-specific session state. Keys are defined by the game;
/// the coordinator interprets only the handful of well-known entries
/// exposed through the accessors below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameState(HashMap<String, Value>);

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Holder of the turn, for turn-based games.
    pub fn current_player(&self) -> Option<UserId> {
        self.0.get("currentPlayer").and_then(Value::as_u64)
    }

    pub fn set_current_player(&mut self, user_id: UserId) {
        self.0.insert("currentPlayer".to_string(), json!(user_id));
    }

    /// Fixed rotation order for turn advancement, seeded at session start.
    pub fn player_order(&self) -> Option<Vec<UserId>> {
        let order = self.0.get("playerOrder")?.as_array()?;
        order.iter().map(Value::as_u64).collect()
    }

    pub fn set_player_order(&mut self, order: &[UserId]) {
        self.0.insert("playerOrder".to_string(), json!(order));
    }

    /// Winner recorded by game-specific logic, if any.
    pub fn winner(&self) -> Option<UserId> {
        self.0.get("winner").and_then(Value::as_u64)
    }

    /// A player's entry in the per-player score map, if present.
    pub fn score(&self, user_id: UserId) -> Option<i64> {
        self.0
            .get("scores")?
            .as_object()?
            .get(&user_id.to_string())?
            .as_i64()
    }

    pub fn mark_forfeited(&mut self, user_id: UserId) {
        self.0.insert(format!("forfeit_{user_id}"), json!(true));
    }

    pub fn is_forfeited(&self, user_id: UserId) -> bool {
        self.0.contains_key(&format!("forfeit_{user_id}"))
    }
}

/// Authoritative record of one live or finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: SessionId,
    pub session_code: String,
    pub game_type: GameType,
    pub status: SessionStatus,
    pub max_players: u8,
    pub current_players: u8,
    pub state: GameState,
    pub winner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl GameSession {
    pub fn new(game_type: GameType, session_code: String) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            session_code,
            game_type,
            status: SessionStatus::Waiting,
            max_players: game_type.max_players(),
            current_players: 0,
            state: GameState::new(),
            winner_id: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// One row per (session, user). `final_score` is written once, when the
/// session completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub position: u8,
    pub final_score: i64,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(session_id: SessionId, user_id: UserId, position: u8) -> Self {
        Self {
            session_id,
            user_id,
            position,
            final_score: 0,
            joined_at: Utc::now(),
        }
    }
}

/// Generate a human-readable session code, e.g. `"KQXR-4821"`.
pub fn generate_session_code() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let letters: String = (0..4)
        .map(|_| (b'A' + rng.random_range(0..26)) as char)
        .collect();
    format!("{letters}-{:04}", rng.random_range(0..10_000u32))
}

/// Check the `XXXX-0000` session code shape.
pub fn is_valid_session_code(code: &str) -> bool {
    let mut parts = code.split('-');
    let (Some(letters), Some(digits), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    letters.len() == 4
        && letters.chars().all(|c| c.is_ascii_uppercase())
        && digits.len() == 4
        && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_forward_only() {
        use SessionStatus::*;
        assert!(Waiting.can_transition_to(InProgress));
        assert!(Waiting.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Cancelled));

        assert!(!Waiting.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Waiting));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Cancelled.can_transition_to(Completed));
        assert!(Completed.is_terminal());
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn new_session_starts_waiting_and_empty() {
        let session = GameSession::new(GameType::Chess, generate_session_code());
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.max_players, 2);
        assert_eq!(session.current_players, 0);
        assert!(session.state.is_empty());
        assert!(session.winner_id.is_none());
        assert!(session.started_at.is_none());
    }

    #[test]
    fn session_ids_are_unique() {
        let a = GameSession::new(GameType::Uno, generate_session_code());
        let b = GameSession::new(GameType::Uno, generate_session_code());
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn session_code_shape() {
        for _ in 0..100 {
            let code = generate_session_code();
            assert!(is_valid_session_code(&code), "bad code: {code}");
        }
        assert!(!is_valid_session_code("kqxr-4821"));
        assert!(!is_valid_session_code("KQXR4821"));
        assert!(!is_valid_session_code("KQXR-48210"));
    }

    #[test]
    fn turn_accessors() {
        let mut state = GameState::new();
        assert_eq!(state.current_player(), None);
        assert_eq!(state.player_order(), None);

        state.set_player_order(&[7, 8, 9]);
        state.set_current_player(8);
        assert_eq!(state.player_order(), Some(vec![7, 8, 9]));
        assert_eq!(state.current_player(), Some(8));
    }

    #[test]
    fn forfeit_flags() {
        let mut state = GameState::new();
        assert!(!state.is_forfeited(42));
        state.mark_forfeited(42);
        assert!(state.is_forfeited(42));
        assert!(!state.is_forfeited(43));
    }

    #[test]
    fn score_lookup_reads_nested_map() {
        let mut state = GameState::new();
        assert_eq!(state.score(1), None);
        state.insert("scores", json!({"1": 120, "2": 95}));
        assert_eq!(state.score(1), Some(120));
        assert_eq!(state.score(2), Some(95));
        assert_eq!(state.score(3), None);
    }

    #[test]
    fn state_serializes_transparently() {
        let mut state = GameState::new();
        state.insert("checkmate", json!(true));
        let serialized = serde_json::to_string(&state).unwrap();
        assert_eq!(serialized, r#"{"checkmate":true}"#);
        let back: GameState = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn session_round_trips_through_json() {
        let mut session = GameSession::new(GameType::CarRacing, generate_session_code());
        session.state.insert("raceFinished", json!(true));
        let serialized = serde_json::to_string(&session).unwrap();
        let back: GameSession = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back.session_id, session.session_id);
        assert_eq!(back.game_type, GameType::CarRacing);
        assert_eq!(back.state, session.state);
    }
}
