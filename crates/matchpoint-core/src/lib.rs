pub mod game;
pub mod matchmaking;
pub mod notify;
pub mod rules;
pub mod session;
pub mod update;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::game::{GameType, UserId};
    use crate::session::{GameSession, GameState, Participant, SessionId, generate_session_code};

    /// Create `n` participants for `session_id` with user ids starting at 1
    /// and 1-based positions.
    pub fn make_participants(session_id: SessionId, n: usize) -> Vec<Participant> {
        (0..n)
            .map(|i| Participant::new(session_id, (i + 1) as UserId, (i + 1) as u8))
            .collect()
    }

    /// Create a fresh session with a generated code.
    pub fn make_session(game_type: GameType) -> GameSession {
        GameSession::new(game_type, generate_session_code())
    }

    /// Build a turn-based state with the given rotation, turn on the first.
    pub fn turn_state(order: &[UserId]) -> GameState {
        let mut state = GameState::new();
        state.set_player_order(order);
        if let Some(&first) = order.first() {
            state.set_current_player(first);
        }
        state
    }
}
