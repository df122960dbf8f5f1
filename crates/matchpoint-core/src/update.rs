use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::game::UserId;
use crate::session::GameState;

/// Discriminator for a session state update. The first four are
/// player-originated moves; the rest are coordinator-originated events
/// fanned out on the same per-session topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateType {
    Move,
    PositionUpdate,
    CardPlay,
    ScoreUpdate,
    Chat,
    PlayerConnected,
    PlayerDisconnected,
    PlayerForfeit,
    GameEnd,
}

/// One state change applied to (or emitted by) a session. Ephemeral:
/// broadcast to participants, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    pub acting_user_id: UserId,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl StateUpdate {
    pub fn new(update_type: UpdateType, acting_user_id: UserId, payload: Value) -> Self {
        Self {
            update_type,
            acting_user_id,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Fold a committed update into the session state map.
///
/// Merge rules are keyed by update type; types that carry no durable state
/// (chat, presence events) only refresh the `lastUpdate` stamp.
pub fn fold_update(state: &mut GameState, update: &StateUpdate) {
    match update.update_type {
        UpdateType::Move => {
            state.insert("lastMove", update.payload.clone());
            state.insert("lastMovePlayer", json!(update.acting_user_id));
            state.insert("lastMoveTime", json!(update.timestamp.to_rfc3339()));
        },
        UpdateType::PositionUpdate => {
            upsert_player_entry(state, "positions", update.acting_user_id, &update.payload);
        },
        UpdateType::CardPlay => {
            state.insert("lastCard", update.payload.clone());
            if let Some(next) = next_player(state, update.acting_user_id) {
                state.set_current_player(next);
            }
        },
        UpdateType::ScoreUpdate => {
            upsert_player_entry(state, "scores", update.acting_user_id, &update.payload);
        },
        _ => {},
    }
    if matches!(
        update.update_type,
        UpdateType::Move | UpdateType::PositionUpdate | UpdateType::CardPlay | UpdateType::ScoreUpdate
    ) {
        promote_terminal_flags(state, &update.payload);
    }
    state.insert("lastUpdate", json!(update.timestamp.to_rfc3339()));
}

/// State keys that end-condition detection reads. A player move whose
/// payload carries one of these lifts it to the top of the state map, so
/// a game client can report `checkmate` or `raceFinished` on its final
/// move.
const TERMINAL_FLAGS: &[&str] = &["checkmate", "stalemate", "raceFinished", "winner"];

fn promote_terminal_flags(state: &mut GameState, payload: &Value) {
    let Some(object) = payload.as_object() else {
        return;
    };
    for &flag in TERMINAL_FLAGS {
        if let Some(value) = object.get(flag) {
            state.insert(flag, value.clone());
        }
    }
}

/// Upsert `payload` into the per-player object under `key`.
fn upsert_player_entry(state: &mut GameState, key: &str, user_id: UserId, payload: &Value) {
    let mut map = state
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    map.insert(user_id.to_string(), payload.clone());
    state.insert(key.to_string(), Value::Object(map));
}

/// Next holder of the turn in the fixed rotation order. `None` when the
/// session has no recorded order (turnless game or pre-start state).
fn next_player(state: &GameState, current: UserId) -> Option<UserId> {
    let order = state.player_order()?;
    if order.is_empty() {
        return None;
    }
    match order.iter().position(|&u| u == current) {
        Some(i) => Some(order[(i + 1) % order.len()]),
        None => Some(order[0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_records_last_move_fields() {
        let mut state = GameState::new();
        let update = StateUpdate::new(UpdateType::Move, 5, json!({"from": "e2", "to": "e4"}));
        fold_update(&mut state, &update);

        assert_eq!(state.get("lastMove"), Some(&json!({"from": "e2", "to": "e4"})));
        assert_eq!(state.get("lastMovePlayer"), Some(&json!(5)));
        assert!(state.contains_key("lastMoveTime"));
        assert!(state.contains_key("lastUpdate"));
    }

    #[test]
    fn position_update_upserts_per_player() {
        let mut state = GameState::new();
        fold_update(
            &mut state,
            &StateUpdate::new(UpdateType::PositionUpdate, 1, json!({"lap": 2, "x": 10.5})),
        );
        fold_update(
            &mut state,
            &StateUpdate::new(UpdateType::PositionUpdate, 2, json!({"lap": 1, "x": 3.0})),
        );
        fold_update(
            &mut state,
            &StateUpdate::new(UpdateType::PositionUpdate, 1, json!({"lap": 3, "x": 0.0})),
        );

        let positions = state.get("positions").unwrap().as_object().unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions["1"], json!({"lap": 3, "x": 0.0}));
        assert_eq!(positions["2"], json!({"lap": 1, "x": 3.0}));
    }

    #[test]
    fn card_play_advances_rotation() {
        let mut state = GameState::new();
        state.set_player_order(&[10, 20, 30]);
        state.set_current_player(20);

        fold_update(&mut state, &StateUpdate::new(UpdateType::CardPlay, 20, json!("R5")));
        assert_eq!(state.current_player(), Some(30));
        assert_eq!(state.get("lastCard"), Some(&json!("R5")));

        // Rotation wraps from the last player back to the first.
        fold_update(&mut state, &StateUpdate::new(UpdateType::CardPlay, 30, json!("G2")));
        assert_eq!(state.current_player(), Some(10));
    }

    #[test]
    fn card_play_without_order_leaves_turn_unset() {
        let mut state = GameState::new();
        fold_update(&mut state, &StateUpdate::new(UpdateType::CardPlay, 1, json!("B9")));
        assert_eq!(state.current_player(), None);
        assert_eq!(state.get("lastCard"), Some(&json!("B9")));
    }

    #[test]
    fn score_update_feeds_score_lookup() {
        let mut state = GameState::new();
        fold_update(&mut state, &StateUpdate::new(UpdateType::ScoreUpdate, 7, json!(450)));
        assert_eq!(state.score(7), Some(450));
    }

    #[test]
    fn chat_only_stamps_last_update() {
        let mut state = GameState::new();
        fold_update(&mut state, &StateUpdate::new(UpdateType::Chat, 1, json!("gg")));
        assert!(state.contains_key("lastUpdate"));
        assert!(!state.contains_key("lastMove"));
    }

    #[test]
    fn final_move_promotes_terminal_flags() {
        let mut state = GameState::new();
        let update = StateUpdate::new(
            UpdateType::Move,
            5,
            json!({"from": "h5", "to": "f7", "checkmate": true, "winner": 5}),
        );
        fold_update(&mut state, &update);

        assert_eq!(state.get("checkmate"), Some(&json!(true)));
        assert_eq!(state.winner(), Some(5));
        // The full payload still lands under lastMove.
        assert_eq!(state.get("lastMove").unwrap()["from"], json!("h5"));
    }

    #[test]
    fn chat_payload_never_promotes_flags() {
        let mut state = GameState::new();
        let update = StateUpdate::new(UpdateType::Chat, 1, json!({"winner": 1}));
        fold_update(&mut state, &update);
        assert_eq!(state.winner(), None);
    }

    #[test]
    fn update_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&UpdateType::PositionUpdate).unwrap(),
            "\"POSITION_UPDATE\""
        );
        assert_eq!(serde_json::to_string(&UpdateType::GameEnd).unwrap(), "\"GAME_END\"");
        let parsed: UpdateType = serde_json::from_str("\"CARD_PLAY\"").unwrap();
        assert_eq!(parsed, UpdateType::CardPlay);
    }
}
