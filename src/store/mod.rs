//! The GameStore boundary.
//!
//! The store is the single source of truth for game state and the only
//! place where atomicity lives: uniqueness of drawn numbers, the minimum
//! call interval, and the winner-finalization guard are all enforced
//! store-side, because multiple tabs and devices may hit these operations
//! concurrently. The engine is a client of this trait and holds no
//! correctness-bearing state of its own.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::engine::types::{GameId, GameSession, GameSettings, GameStatus, Player, TenantId};
use crate::error::AppError;

pub use memory::MemoryGameStore;
pub use redis::RedisGameStore;

/// Raw reply from the store's draw operation, before letter mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDraw {
    /// A fresh number was selected.
    Drawn { number: u8, total_called: u8 },
    /// The minimum interval has not elapsed yet.
    Wait { seconds: u64 },
    /// The game is not in `active` status.
    NotActive,
    /// All 75 numbers have been drawn; the store has finished the game.
    Exhausted,
}

/// Reply from the guarded winner finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Finalized,
    /// Another card already finished this game; the existing winner record
    /// is untouched.
    AlreadyFinished,
}

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Create a game in `waiting` status with a full 75-number pool.
    async fn create_game(
        &self,
        tenant_id: TenantId,
        settings: GameSettings,
    ) -> Result<GameSession, AppError>;

    /// Current session snapshot.
    async fn game_status(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<GameSession, AppError>;

    /// Move a game into `active`, optionally updating its call interval.
    /// Activating an already-active game is a no-op; activating a finished
    /// game fails with [`AppError::GameFinished`].
    async fn activate_game(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        interval_seconds: Option<u64>,
    ) -> Result<GameSession, AppError>;

    /// Move an `active` game into `paused`. The store's next-allowed-call
    /// bookkeeping is deliberately left untouched. Idempotent on a game
    /// already paused; fails on a finished game.
    async fn suspend_game(&self, tenant_id: TenantId, game_id: GameId) -> Result<(), AppError>;

    /// Atomically select the next number, or report why none was selected.
    /// Calling this more often than the allowed cadence is safe: the store
    /// answers `Wait` instead of drawing early, and a drawn number can
    /// never repeat.
    async fn draw_next_number(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<RawDraw, AppError>;

    /// All numbers called so far, in call order.
    async fn called_numbers(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<Vec<u8>, AppError>;

    /// Enroll a player. Fails with [`AppError::CardTaken`] if the card
    /// number is already held.
    async fn add_player(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        name: String,
        card_number: u16,
    ) -> Result<Player, AppError>;

    async fn get_player(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
    ) -> Result<Option<Player>, AppError>;

    async fn list_players(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<Vec<Player>, AppError>;

    /// Record a manual daub on a player's card.
    async fn mark_cell(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
        position: u8,
    ) -> Result<(), AppError>;

    /// Guarded winner declaration: records the winner and finishes the
    /// game in one atomic step that fails closed if the game is already
    /// finished. With `multiple_winners` set on the game, the status is
    /// left open and additional winners are recorded.
    async fn finalize_winner(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
        pattern: &str,
    ) -> Result<FinalizeOutcome, AppError>;
}

/// Validated status transition shared by store implementations.
pub(crate) fn checked_transition(
    current: GameStatus,
    target: GameStatus,
    game_id: GameId,
) -> Result<GameStatus, AppError> {
    match (current, target) {
        (GameStatus::Finished, _) => Err(AppError::GameFinished(game_id)),
        (_, target) => Ok(target),
    }
}
