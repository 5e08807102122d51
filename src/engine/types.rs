use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)] // Serialize directly as the inner UUID string
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(Uuid);

impl GameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a game as recorded by the store. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Active,
    Paused,
    Finished,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Active => "active",
            GameStatus::Paused => "paused",
            GameStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(GameStatus::Waiting),
            "active" => Some(GameStatus::Active),
            "paused" => Some(GameStatus::Paused),
            "finished" => Some(GameStatus::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BINGO column letter. Each letter owns a fixed 15-number band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    B,
    I,
    N,
    G,
    O,
}

impl Letter {
    /// Map a raw drawn number into its letter: 1-15 B, 16-30 I, 31-45 N,
    /// 46-60 G, 61-75 O. Anything outside 1..=75 has no letter.
    pub fn for_number(number: u8) -> Option<Letter> {
        match number {
            1..=15 => Some(Letter::B),
            16..=30 => Some(Letter::I),
            31..=45 => Some(Letter::N),
            46..=60 => Some(Letter::G),
            61..=75 => Some(Letter::O),
            _ => None,
        }
    }

    /// Column index of this letter on a card (B=0 .. O=4).
    pub fn column(&self) -> usize {
        match self {
            Letter::B => 0,
            Letter::I => 1,
            Letter::N => 2,
            Letter::G => 3,
            Letter::O => 4,
        }
    }

    /// Audio clip stem for this letter.
    pub fn clip_name(&self) -> &'static str {
        match self {
            Letter::B => "b",
            Letter::I => "i",
            Letter::N => "n",
            Letter::G => "g",
            Letter::O => "o",
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Letter::B => "B",
            Letter::I => "I",
            Letter::N => "N",
            Letter::G => "G",
            Letter::O => "O",
        })
    }
}

/// Per-game settings fixed at creation time. Currency amounts are integer
/// cents so prize arithmetic stays exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    pub interval_seconds: u64,
    pub entry_fee_cents: u64,
    pub fee_percent: u8,
    #[serde(default)]
    pub multiple_winners: bool,
}

/// Store-owned view of a game. The engine never mutates this directly; it
/// transitions it through store operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub tenant_id: TenantId,
    pub game_id: GameId,
    pub status: GameStatus,
    pub interval_seconds: u64,
    pub entry_fee_cents: u64,
    pub fee_percent: u8,
    pub multiple_winners: bool,
    pub called_count: u8,
    pub current_number: Option<u8>,
    pub player_count: u32,
}

/// A player enrolled in one game, identified within the game by card number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub card_number: u16,
    pub card: crate::engine::card::BingoCard,
    #[serde(default)]
    pub is_winner: bool,
    #[serde(default)]
    pub winning_pattern: Option<String>,
    /// Manually daubed cell positions (row-major, 0..25).
    #[serde(default)]
    pub manual_marks: Vec<u8>,
}

/// Fixed spoken phrases, distinct from letter+number calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrase {
    GameStarted,
    GameOver,
}

impl Phrase {
    pub fn clip_name(&self) -> &'static str {
        match self {
            Phrase::GameStarted => "game_started",
            Phrase::GameOver => "game_over",
        }
    }
}

/// One unit of spoken output. Serialized per tenant, never overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementRequest {
    Phrase(Phrase),
    Call { letter: Letter, number: u8 },
}

/// Events fanned out to UI subscribers. Display-only: subscribers never
/// drive timing decisions.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    GameStarted {
        game_id: GameId,
    },
    NumberCalled {
        letter: Letter,
        number: u8,
        total_called: u8,
    },
    WinnerDeclared {
        player: String,
        card_number: u16,
        pattern: String,
        prize_cents: u64,
    },
    GameOver {
        game_id: GameId,
        reason: GameOverReason,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Exhausted,
    Winner,
}
