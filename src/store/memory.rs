//! In-process GameStore used by tests and local development. Semantics
//! mirror the Redis binding: draws are random, unique, and interval
//! gated; finalization is guarded by game status.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::engine::card::BingoCard;
use crate::engine::types::{GameId, GameSession, GameSettings, GameStatus, Player, TenantId};
use crate::error::AppError;

use super::{checked_transition, FinalizeOutcome, GameStore, RawDraw};

struct GameRecord {
    settings: GameSettings,
    status: GameStatus,
    remaining: Vec<u8>,
    called: Vec<u8>,
    players: HashMap<u16, Player>,
    next_call_at: Option<Instant>,
    rng: StdRng,
}

impl GameRecord {
    fn session(&self, tenant_id: TenantId, game_id: GameId) -> GameSession {
        GameSession {
            tenant_id,
            game_id,
            status: self.status,
            interval_seconds: self.settings.interval_seconds,
            entry_fee_cents: self.settings.entry_fee_cents,
            fee_percent: self.settings.fee_percent,
            multiple_winners: self.settings.multiple_winners,
            called_count: self.called.len() as u8,
            current_number: self.called.last().copied(),
            player_count: self.players.len() as u32,
        }
    }
}

#[derive(Default)]
pub struct MemoryGameStore {
    games: RwLock<HashMap<(TenantId, GameId), GameRecord>>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn create_game(
        &self,
        tenant_id: TenantId,
        settings: GameSettings,
    ) -> Result<GameSession, AppError> {
        let game_id = GameId::new();
        let record = GameRecord {
            settings,
            status: GameStatus::Waiting,
            remaining: (1..=75).collect(),
            called: Vec::new(),
            players: HashMap::new(),
            next_call_at: None,
            rng: StdRng::from_os_rng(),
        };
        let session = record.session(tenant_id, game_id);
        self.games.write().await.insert((tenant_id, game_id), record);
        Ok(session)
    }

    async fn game_status(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<GameSession, AppError> {
        let games = self.games.read().await;
        let record = games
            .get(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        Ok(record.session(tenant_id, game_id))
    }

    async fn activate_game(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        interval_seconds: Option<u64>,
    ) -> Result<GameSession, AppError> {
        let mut games = self.games.write().await;
        let record = games
            .get_mut(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        record.status = checked_transition(record.status, GameStatus::Active, game_id)?;
        if let Some(interval) = interval_seconds {
            record.settings.interval_seconds = interval;
        }
        Ok(record.session(tenant_id, game_id))
    }

    async fn suspend_game(&self, tenant_id: TenantId, game_id: GameId) -> Result<(), AppError> {
        let mut games = self.games.write().await;
        let record = games
            .get_mut(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        record.status = checked_transition(record.status, GameStatus::Paused, game_id)?;
        Ok(())
    }

    async fn draw_next_number(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<RawDraw, AppError> {
        let mut games = self.games.write().await;
        let record = games
            .get_mut(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;

        if record.status != GameStatus::Active {
            return Ok(RawDraw::NotActive);
        }
        // Exhaustion outranks the interval gate, so a retry straight after
        // the 75th call terminates instead of waiting.
        if record.remaining.is_empty() {
            record.status = GameStatus::Finished;
            return Ok(RawDraw::Exhausted);
        }
        let now = Instant::now();
        if let Some(at) = record.next_call_at {
            if now < at {
                let wait = (at - now).as_secs_f64().ceil() as u64;
                return Ok(RawDraw::Wait { seconds: wait.max(1) });
            }
        }

        let idx = record.rng.random_range(0..record.remaining.len());
        let number = record.remaining.swap_remove(idx);
        record.called.push(number);
        record.next_call_at =
            Some(now + std::time::Duration::from_secs(record.settings.interval_seconds));

        Ok(RawDraw::Drawn {
            number,
            total_called: record.called.len() as u8,
        })
    }

    async fn called_numbers(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<Vec<u8>, AppError> {
        let games = self.games.read().await;
        let record = games
            .get(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        Ok(record.called.clone())
    }

    async fn add_player(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        name: String,
        card_number: u16,
    ) -> Result<Player, AppError> {
        let mut games = self.games.write().await;
        let record = games
            .get_mut(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        if record.status == GameStatus::Finished {
            return Err(AppError::GameFinished(game_id));
        }
        if record.players.contains_key(&card_number) {
            return Err(AppError::CardTaken(card_number));
        }
        let player = Player {
            name,
            card_number,
            card: BingoCard::generate(card_number),
            is_winner: false,
            winning_pattern: None,
            manual_marks: Vec::new(),
        };
        record.players.insert(card_number, player.clone());
        Ok(player)
    }

    async fn get_player(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
    ) -> Result<Option<Player>, AppError> {
        let games = self.games.read().await;
        let record = games
            .get(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        Ok(record.players.get(&card_number).cloned())
    }

    async fn list_players(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<Vec<Player>, AppError> {
        let games = self.games.read().await;
        let record = games
            .get(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        let mut players: Vec<Player> = record.players.values().cloned().collect();
        players.sort_by_key(|p| p.card_number);
        Ok(players)
    }

    async fn mark_cell(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
        position: u8,
    ) -> Result<(), AppError> {
        let mut games = self.games.write().await;
        let record = games
            .get_mut(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        let player = record
            .players
            .get_mut(&card_number)
            .ok_or(AppError::PlayerNotFound(card_number))?;
        if !player.manual_marks.contains(&position) {
            player.manual_marks.push(position);
        }
        Ok(())
    }

    async fn finalize_winner(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
        pattern: &str,
    ) -> Result<FinalizeOutcome, AppError> {
        let mut games = self.games.write().await;
        let record = games
            .get_mut(&(tenant_id, game_id))
            .ok_or(AppError::GameNotFound(game_id))?;
        if !record.players.contains_key(&card_number) {
            return Err(AppError::PlayerNotFound(card_number));
        }
        if record.status == GameStatus::Finished && !record.settings.multiple_winners {
            return Ok(FinalizeOutcome::AlreadyFinished);
        }
        let player = record
            .players
            .get_mut(&card_number)
            .expect("player checked above");
        player.is_winner = true;
        player.winning_pattern = Some(pattern.to_string());
        if !record.settings.multiple_winners {
            record.status = GameStatus::Finished;
        }
        Ok(FinalizeOutcome::Finalized)
    }
}
