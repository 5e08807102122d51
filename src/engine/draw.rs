//! Thin, stateless wrapper around the store's draw operation.
//!
//! The coordinator holds no state of its own: uniqueness and cadence are
//! store-enforced, so calling `draw` more often than the allowed rate is
//! harmless. Its job is to turn the store's raw reply into an exhaustive
//! tagged outcome and attach the BINGO letter.

use std::sync::Arc;

use crate::engine::types::{GameId, Letter, TenantId};
use crate::store::{GameStore, RawDraw};

/// Everything a draw attempt can come back as. The scheduler branches on
/// this exhaustively; only `Failure` is worth an error log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    Success {
        number: u8,
        letter: Letter,
        total_called: u8,
    },
    /// Too early; retry on a later tick.
    Backpressure { wait_seconds: u64 },
    /// Game is not in `active` status.
    NotActive,
    /// All 75 numbers drawn; terminal.
    Exhausted,
    /// Store or network failure; the next tick retries naturally.
    Failure { detail: String },
}

#[derive(Clone)]
pub struct DrawCoordinator {
    store: Arc<dyn GameStore>,
}

impl DrawCoordinator {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }

    pub async fn draw(&self, tenant_id: TenantId, game_id: GameId) -> DrawOutcome {
        match self.store.draw_next_number(tenant_id, game_id).await {
            Ok(RawDraw::Drawn { number, total_called }) => match Letter::for_number(number) {
                Some(letter) => DrawOutcome::Success { number, letter, total_called },
                None => DrawOutcome::Failure {
                    detail: format!("store drew out-of-range number {}", number),
                },
            },
            Ok(RawDraw::Wait { seconds }) => DrawOutcome::Backpressure { wait_seconds: seconds },
            Ok(RawDraw::NotActive) => DrawOutcome::NotActive,
            Ok(RawDraw::Exhausted) => DrawOutcome::Exhausted,
            Err(e) => DrawOutcome::Failure { detail: e.to_string() },
        }
    }
}
