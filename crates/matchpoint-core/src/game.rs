use serde::{Deserialize, Serialize};

/// Unique identifier for a platform user. Issued and authenticated by the
/// external account layer; the coordinator only ever sees resolved ids.
pub type UserId = u64;

/// The game catalogue. Player counts and wait weights are fixed per type;
/// this table is the single source of truth for both matching and session
/// capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameType {
    CarRacing,
    Chess,
    Uno,
    Rummy,
    Ludo,
    TruthDare,
    MemeBattle,
    BubbleBlast,
    Fighting,
    MathMaster,
}

impl GameType {
    pub const ALL: &[GameType] = &[
        GameType::CarRacing,
        GameType::Chess,
        GameType::Uno,
        GameType::Rummy,
        GameType::Ludo,
        GameType::TruthDare,
        GameType::MemeBattle,
        GameType::BubbleBlast,
        GameType::Fighting,
        GameType::MathMaster,
    ];

    /// Parse the canonical wire name, e.g. `"CAR_RACING"`.
    pub fn from_str_opt(s: &str) -> Option<GameType> {
        match s {
            "CAR_RACING" => Some(GameType::CarRacing),
            "CHESS" => Some(GameType::Chess),
            "UNO" => Some(GameType::Uno),
            "RUMMY" => Some(GameType::Rummy),
            "LUDO" => Some(GameType::Ludo),
            "TRUTH_DARE" => Some(GameType::TruthDare),
            "MEME_BATTLE" => Some(GameType::MemeBattle),
            "BUBBLE_BLAST" => Some(GameType::BubbleBlast),
            "FIGHTING" => Some(GameType::Fighting),
            "MATH_MASTER" => Some(GameType::MathMaster),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameType::CarRacing => "CAR_RACING",
            GameType::Chess => "CHESS",
            GameType::Uno => "UNO",
            GameType::Rummy => "RUMMY",
            GameType::Ludo => "LUDO",
            GameType::TruthDare => "TRUTH_DARE",
            GameType::MemeBattle => "MEME_BATTLE",
            GameType::BubbleBlast => "BUBBLE_BLAST",
            GameType::Fighting => "FIGHTING",
            GameType::MathMaster => "MATH_MASTER",
        }
    }

    /// Minimum players required before a match can be materialized.
    pub fn min_players(self) -> u8 {
        match self {
            GameType::BubbleBlast | GameType::MathMaster => 1,
            _ => 2,
        }
    }

    /// Session capacity; matching never gathers more candidates than this.
    pub fn max_players(self) -> u8 {
        match self {
            GameType::Chess | GameType::Fighting => 2,
            GameType::Uno | GameType::Ludo | GameType::BubbleBlast => 4,
            GameType::Rummy => 6,
            GameType::CarRacing | GameType::MathMaster => 8,
            GameType::TruthDare | GameType::MemeBattle => 4,
        }
    }

    /// Estimated queue wait in seconds for a 1-based queue position.
    ///
    /// Deterministic: 15 s per position ahead, shifted by a fixed
    /// popularity weight per game. Monotonically non-decreasing in
    /// position.
    pub fn estimated_wait_secs(self, position: usize) -> u32 {
        let base = (position as u32) * 15;
        match self {
            GameType::Chess | GameType::Uno => base.saturating_sub(10).max(10),
            GameType::CarRacing | GameType::Fighting => base,
            GameType::Rummy | GameType::Ludo => base + 15,
            _ => base + 30,
        }
    }

    /// Games with the shortest expected waits, suggested to users queued
    /// for unpopular types or evicted on queue timeout.
    pub fn alternatives() -> &'static [GameType] {
        &[
            GameType::Chess,
            GameType::Uno,
            GameType::CarRacing,
            GameType::BubbleBlast,
        ]
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported skill bracket used for match compatibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}
