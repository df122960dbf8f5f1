use std::collections::HashMap;

use crate::game::{GameType, UserId};
use crate::session::GameState;
use crate::update::{StateUpdate, UpdateType};

/// Result of a positive end-condition detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOutcome {
    pub winner_id: Option<UserId>,
}

/// Why a rule set rejected a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    OutOfTurn,
    WrongUpdateType,
}

impl std::fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfTurn => write!(f, "not this player's turn"),
            Self::WrongUpdateType => write!(f, "update type not accepted by this game"),
        }
    }
}

/// Per-game-type strategy: the minimal validation and end detection the
/// coordinator needs. Full rules engines plug in behind this trait.
pub trait GameRules: Send + Sync {
    /// Reject a player move before it touches the state map.
    fn validate_move(&self, state: &GameState, update: &StateUpdate) -> Result<(), MoveRejection>;

    /// Inspect the post-update state for a finished game.
    fn detect_end(&self, state: &GameState) -> Option<GameOutcome>;
}

/// Turn-based games: the acting player must hold the recorded turn. The
/// game ends when any of `end_flags` appears in the state; the winner is
/// whatever the game wrote under `winner`.
pub struct TurnOrderRules {
    end_flags: &'static [&'static str],
}

impl TurnOrderRules {
    pub fn new(end_flags: &'static [&'static str]) -> Self {
        Self { end_flags }
    }
}

impl GameRules for TurnOrderRules {
    fn validate_move(&self, state: &GameState, update: &StateUpdate) -> Result<(), MoveRejection> {
        match state.current_player() {
            Some(current) if current != update.acting_user_id => Err(MoveRejection::OutOfTurn),
            _ => Ok(()),
        }
    }

    fn detect_end(&self, state: &GameState) -> Option<GameOutcome> {
        if self.end_flags.iter().any(|flag| state.contains_key(flag)) {
            Some(GameOutcome {
                winner_id: state.winner(),
            })
        } else {
            None
        }
    }
}

/// Turnless position-streaming games: any participant may report, but only
/// position and score updates make sense.
pub struct RacingRules;

impl GameRules for RacingRules {
    fn validate_move(&self, _state: &GameState, update: &StateUpdate) -> Result<(), MoveRejection> {
        match update.update_type {
            UpdateType::PositionUpdate | UpdateType::ScoreUpdate => Ok(()),
            _ => Err(MoveRejection::WrongUpdateType),
        }
    }

    fn detect_end(&self, state: &GameState) -> Option<GameOutcome> {
        state.contains_key("raceFinished").then(|| GameOutcome {
            winner_id: state.winner(),
        })
    }
}

/// Catch-all for catalogue entries without dedicated rules: every
/// participant update is accepted, the game ends when a winner is written.
pub struct OpenPlayRules;

impl GameRules for OpenPlayRules {
    fn validate_move(&self, _state: &GameState, _update: &StateUpdate) -> Result<(), MoveRejection> {
        Ok(())
    }

    fn detect_end(&self, state: &GameState) -> Option<GameOutcome> {
        state.contains_key("winner").then(|| GameOutcome {
            winner_id: state.winner(),
        })
    }
}

static OPEN_PLAY: OpenPlayRules = OpenPlayRules;

/// Registry mapping game types to their rule strategies.
pub struct RulesRegistry {
    rules: HashMap<GameType, Box<dyn GameRules>>,
}

impl Default for RulesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            rules: HashMap::new(),
        };
        registry.register_defaults();
        registry
    }

    fn register_defaults(&mut self) {
        self.register(
            GameType::Chess,
            Box::new(TurnOrderRules::new(&["checkmate", "stalemate"])),
        );
        self.register(GameType::Uno, Box::new(TurnOrderRules::new(&["winner"])));
        self.register(GameType::CarRacing, Box::new(RacingRules));
        for &gt in GameType::ALL {
            if !self.rules.contains_key(&gt) {
                self.register(gt, Box::new(OpenPlayRules));
            }
        }
    }

    /// Replace or add the rules for one game type.
    pub fn register(&mut self, game_type: GameType, rules: Box<dyn GameRules>) {
        self.rules.insert(game_type, rules);
    }

    pub fn get(&self, game_type: GameType) -> &dyn GameRules {
        self.rules
            .get(&game_type)
            .map(|rules| &**rules)
            .unwrap_or(&OPEN_PLAY)
    }

    /// Number of registered game types.
    pub fn registered_games(&self) -> usize {
        self.rules.len()
    }
}
