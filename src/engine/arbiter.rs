//! Winner verification and the prize split.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::engine::pattern::{PatternProgress, PatternSet};
use crate::engine::types::{GameId, TenantId};
use crate::error::AppError;
use crate::store::{FinalizeOutcome, GameStore};

/// Pot arithmetic in integer cents; no floating point anywhere near
/// currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrizeBreakdown {
    pub pot_cents: u64,
    pub platform_fee_cents: u64,
    pub prize_cents: u64,
}

/// `pot = players * entry_fee`; the platform keeps `fee_percent` of it
/// (truncated toward zero) and the winner takes the rest.
pub fn prize_split(player_count: u64, entry_fee_cents: u64, fee_percent: u8) -> PrizeBreakdown {
    let pot_cents = player_count * entry_fee_cents;
    let platform_fee_cents = pot_cents * u64::from(fee_percent) / 100;
    PrizeBreakdown {
        pot_cents,
        platform_fee_cents,
        prize_cents: pot_cents - platform_fee_cents,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// No active pattern is fully covered; `closest` carries completion
    /// percentages for operator feedback.
    NoWin { closest: Vec<PatternProgress> },
    Winner {
        player: String,
        card_number: u16,
        pattern: String,
        prize: PrizeBreakdown,
    },
    /// Lost the declaration race: another card already finished the game.
    /// Informational, not an error; the first winner's record is intact.
    AlreadyFinished,
}

#[derive(Clone)]
pub struct WinnerArbiter {
    store: Arc<dyn GameStore>,
    patterns: Arc<PatternSet>,
}

impl WinnerArbiter {
    pub fn new(store: Arc<dyn GameStore>, patterns: Arc<PatternSet>) -> Self {
        Self { store, patterns }
    }

    /// Check one card against the called numbers and, on a match, finalize
    /// the game through the store's guarded update.
    #[tracing::instrument(skip(self))]
    pub async fn verify(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
    ) -> Result<VerifyOutcome, AppError> {
        let player = self
            .store
            .get_player(tenant_id, game_id, card_number)
            .await?
            .ok_or(AppError::PlayerNotFound(card_number))?;
        let called: HashSet<u8> = self
            .store
            .called_numbers(tenant_id, game_id)
            .await?
            .into_iter()
            .collect();

        let marked = player.card.marked_positions(&called, &player.manual_marks);
        let Some(pattern) = self.patterns.match_card(&marked) else {
            return Ok(VerifyOutcome::NoWin {
                closest: self.patterns.completion(&marked),
            });
        };

        match self
            .store
            .finalize_winner(tenant_id, game_id, card_number, &pattern.name)
            .await?
        {
            FinalizeOutcome::AlreadyFinished => {
                tracing::info!(
                    tenant_id = %tenant_id, game_id = %game_id, card_number,
                    "Winner declaration lost the race; game already finished"
                );
                Ok(VerifyOutcome::AlreadyFinished)
            }
            FinalizeOutcome::Finalized => {
                tracing::info!(
                    tenant_id = %tenant_id, game_id = %game_id, card_number,
                    pattern = %pattern.name, "Winner declared"
                );
                // Count the pot only after the guard: an enrollment landing
                // while the declaration was in flight still pays in.
                let session = self.store.game_status(tenant_id, game_id).await?;
                Ok(VerifyOutcome::Winner {
                    player: player.name,
                    card_number,
                    pattern: pattern.name.clone(),
                    prize: prize_split(
                        u64::from(session.player_count),
                        session.entry_fee_cents,
                        session.fee_percent,
                    ),
                })
            }
        }
    }

    /// Check every player, finalizing the first match found. Returns
    /// `None` when nobody is winning yet. Used by the caller loop when
    /// auto-verification is on.
    #[tracing::instrument(skip(self))]
    pub async fn verify_all(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<Option<VerifyOutcome>, AppError> {
        let players = self.store.list_players(tenant_id, game_id).await?;
        let called: HashSet<u8> = self
            .store
            .called_numbers(tenant_id, game_id)
            .await?
            .into_iter()
            .collect();

        for player in players {
            // A card already on the winners list stays there; re-declaring
            // it every draw would spam the feed in multiple-winner games.
            if player.is_winner {
                continue;
            }
            let marked = player.card.marked_positions(&called, &player.manual_marks);
            if self.patterns.match_card(&marked).is_some() {
                return Ok(Some(
                    self.verify(tenant_id, game_id, player.card_number).await?,
                ));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{GameSession, GameSettings, Player};
    use crate::store::{MemoryGameStore, RawDraw};
    use async_trait::async_trait;

    #[test]
    fn test_prize_split_is_exact() {
        // 10 players at fee 20, platform keeps 20%.
        let prize = prize_split(10, 20, 20);
        assert_eq!(prize.pot_cents, 200);
        assert_eq!(prize.platform_fee_cents, 40);
        assert_eq!(prize.prize_cents, 160);

        // Truncation toward zero, never a lost cent overall.
        let prize = prize_split(3, 33, 10);
        assert_eq!(prize.pot_cents, 99);
        assert_eq!(prize.platform_fee_cents, 9);
        assert_eq!(prize.prize_cents, 90);
    }

    fn settings() -> GameSettings {
        GameSettings {
            interval_seconds: 0,
            entry_fee_cents: 2000,
            fee_percent: 20,
            multiple_winners: false,
        }
    }

    async fn setup() -> (Arc<MemoryGameStore>, WinnerArbiter, TenantId, GameId) {
        let store = Arc::new(MemoryGameStore::new());
        let arbiter = WinnerArbiter::new(store.clone(), Arc::new(PatternSet::builtin()));
        let tenant = TenantId::new();
        let session = store.create_game(tenant, settings()).await.unwrap();
        (store, arbiter, tenant, session.game_id)
    }

    /// Draw all 75 numbers but stop short of the Exhausted reply, so the
    /// game is still active when a winner is declared.
    async fn drain_all_numbers(store: &MemoryGameStore, tenant: TenantId, game: GameId) {
        store.activate_game(tenant, game, None).await.unwrap();
        loop {
            match store.draw_next_number(tenant, game).await.unwrap() {
                RawDraw::Drawn { total_called: 75, .. } => break,
                RawDraw::Drawn { .. } => {}
                other => panic!("unexpected draw reply: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_verify_unknown_card_fails() {
        let (_, arbiter, tenant, game) = setup().await;
        let err = arbiter.verify(tenant, game, 404).await.unwrap_err();
        assert!(matches!(err, AppError::PlayerNotFound(404)));
    }

    #[tokio::test]
    async fn test_verify_reports_progress_when_not_winning() {
        let (store, arbiter, tenant, game) = setup().await;
        store.add_player(tenant, game, "Ana".to_string(), 11).await.unwrap();

        match arbiter.verify(tenant, game, 11).await.unwrap() {
            VerifyOutcome::NoWin { closest } => {
                assert!(!closest.is_empty());
                // Only the free cell is marked; nothing can be complete.
                assert!(closest.iter().all(|p| p.percent_complete < 100));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_declaration_loses_the_race() {
        let (store, arbiter, tenant, game) = setup().await;
        store.add_player(tenant, game, "Ana".to_string(), 11).await.unwrap();
        store.add_player(tenant, game, "Bo".to_string(), 22).await.unwrap();
        drain_all_numbers(&store, tenant, game).await;

        match arbiter.verify(tenant, game, 11).await.unwrap() {
            VerifyOutcome::Winner { player, card_number, pattern, prize } => {
                assert_eq!(player, "Ana");
                assert_eq!(card_number, 11);
                // With every number called, the lowest-priority pattern wins.
                assert_eq!(pattern, "Top Row");
                assert_eq!(prize.pot_cents, 4000);
                assert_eq!(prize.platform_fee_cents, 800);
                assert_eq!(prize.prize_cents, 3200);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        // The loser of the race gets an informational reply and the first
        // winner's record stands.
        assert_eq!(
            arbiter.verify(tenant, game, 22).await.unwrap(),
            VerifyOutcome::AlreadyFinished
        );
        let winner = store.get_player(tenant, game, 11).await.unwrap().unwrap();
        assert!(winner.is_winner);
        assert_eq!(winner.winning_pattern.as_deref(), Some("Top Row"));
    }

    #[tokio::test]
    async fn test_manual_marks_count_toward_patterns() {
        let (store, arbiter, tenant, game) = setup().await;
        store.add_player(tenant, game, "Ana".to_string(), 11).await.unwrap();

        // Daub the whole top row by hand; no numbers called at all.
        for position in 0..5 {
            store.mark_cell(tenant, game, 11, position).await.unwrap();
        }
        match arbiter.verify(tenant, game, 11).await.unwrap() {
            VerifyOutcome::Winner { pattern, .. } => assert_eq!(pattern, "Top Row"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    /// Store double whose finalization races with an enrollment: a third
    /// player joins while the winning declaration is in flight.
    struct LateEnrollStore {
        inner: Arc<MemoryGameStore>,
    }

    #[async_trait]
    impl GameStore for LateEnrollStore {
        async fn create_game(
            &self,
            tenant_id: TenantId,
            settings: GameSettings,
        ) -> Result<GameSession, AppError> {
            self.inner.create_game(tenant_id, settings).await
        }

        async fn game_status(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
        ) -> Result<GameSession, AppError> {
            self.inner.game_status(tenant_id, game_id).await
        }

        async fn activate_game(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
            interval_seconds: Option<u64>,
        ) -> Result<GameSession, AppError> {
            self.inner.activate_game(tenant_id, game_id, interval_seconds).await
        }

        async fn suspend_game(&self, tenant_id: TenantId, game_id: GameId) -> Result<(), AppError> {
            self.inner.suspend_game(tenant_id, game_id).await
        }

        async fn draw_next_number(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
        ) -> Result<RawDraw, AppError> {
            self.inner.draw_next_number(tenant_id, game_id).await
        }

        async fn called_numbers(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
        ) -> Result<Vec<u8>, AppError> {
            self.inner.called_numbers(tenant_id, game_id).await
        }

        async fn add_player(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
            name: String,
            card_number: u16,
        ) -> Result<Player, AppError> {
            self.inner.add_player(tenant_id, game_id, name, card_number).await
        }

        async fn get_player(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
            card_number: u16,
        ) -> Result<Option<Player>, AppError> {
            self.inner.get_player(tenant_id, game_id, card_number).await
        }

        async fn list_players(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
        ) -> Result<Vec<Player>, AppError> {
            self.inner.list_players(tenant_id, game_id).await
        }

        async fn mark_cell(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
            card_number: u16,
            position: u8,
        ) -> Result<(), AppError> {
            self.inner.mark_cell(tenant_id, game_id, card_number, position).await
        }

        async fn finalize_winner(
            &self,
            tenant_id: TenantId,
            game_id: GameId,
            card_number: u16,
            pattern: &str,
        ) -> Result<FinalizeOutcome, AppError> {
            self.inner
                .add_player(tenant_id, game_id, "Cy".to_string(), 33)
                .await?;
            self.inner
                .finalize_winner(tenant_id, game_id, card_number, pattern)
                .await
        }
    }

    #[tokio::test]
    async fn test_prize_counts_enrollments_up_to_finalization() {
        let inner = Arc::new(MemoryGameStore::new());
        let store = Arc::new(LateEnrollStore { inner: inner.clone() });
        let arbiter = WinnerArbiter::new(store, Arc::new(PatternSet::builtin()));
        let tenant = TenantId::new();
        let game = inner.create_game(tenant, settings()).await.unwrap().game_id;
        inner.add_player(tenant, game, "Ana".to_string(), 11).await.unwrap();
        inner.add_player(tenant, game, "Bo".to_string(), 22).await.unwrap();
        drain_all_numbers(&inner, tenant, game).await;

        match arbiter.verify(tenant, game, 11).await.unwrap() {
            VerifyOutcome::Winner { prize, .. } => {
                // Three entry fees in the pot, the race-time join included.
                assert_eq!(prize.pot_cents, 6000);
                assert_eq!(prize.platform_fee_cents, 1200);
                assert_eq!(prize.prize_cents, 4800);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verify_all_skips_already_declared_winners() {
        let store = Arc::new(MemoryGameStore::new());
        let arbiter = WinnerArbiter::new(store.clone(), Arc::new(PatternSet::builtin()));
        let tenant = TenantId::new();
        let game = store
            .create_game(
                tenant,
                GameSettings {
                    multiple_winners: true,
                    ..settings()
                },
            )
            .await
            .unwrap()
            .game_id;
        store.add_player(tenant, game, "Ana".to_string(), 11).await.unwrap();
        store.add_player(tenant, game, "Bo".to_string(), 22).await.unwrap();
        drain_all_numbers(&store, tenant, game).await;

        match arbiter.verify_all(tenant, game).await.unwrap() {
            Some(VerifyOutcome::Winner { card_number, .. }) => assert_eq!(card_number, 11),
            other => panic!("unexpected outcome: {:?}", other),
        }
        // Ana is on the winners list now, so the sweep moves on to Bo
        // instead of re-declaring her.
        match arbiter.verify_all(tenant, game).await.unwrap() {
            Some(VerifyOutcome::Winner { card_number, .. }) => assert_eq!(card_number, 22),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(arbiter.verify_all(tenant, game).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_verify_all_finds_the_first_winner() {
        let (store, arbiter, tenant, game) = setup().await;
        store.add_player(tenant, game, "Ana".to_string(), 11).await.unwrap();
        store.add_player(tenant, game, "Bo".to_string(), 22).await.unwrap();

        assert_eq!(arbiter.verify_all(tenant, game).await.unwrap(), None);

        drain_all_numbers(&store, tenant, game).await;
        match arbiter.verify_all(tenant, game).await.unwrap() {
            Some(VerifyOutcome::Winner { card_number, .. }) => assert_eq!(card_number, 11),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
