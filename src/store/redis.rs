//! Redis binding of the GameStore.
//!
//! All multi-step operations that must be atomic run as Lua scripts, so
//! concurrent tabs and devices cannot draw a duplicate number or finish a
//! game twice:
//! - the remaining-number pool is a Redis SET and draws `SPOP` it
//!   (random, unique, atomic);
//! - the minimum interval is enforced against Redis server `TIME`, never
//!   against a client clock;
//! - winner finalization is a compare-and-set on the status key.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script, Value};
use serde::{Deserialize, Serialize};

use crate::engine::card::BingoCard;
use crate::engine::types::{GameId, GameSession, GameSettings, GameStatus, Player, TenantId};
use crate::error::AppError;

use super::{FinalizeOutcome, GameStore, RawDraw};

const DRAW_SCRIPT: &str = r#"
local st = redis.call('GET', KEYS[1])
if not st then return {'not_found'} end
if st ~= 'active' then return {'not_active'} end
if redis.call('SCARD', KEYS[3]) == 0 then
  redis.call('SET', KEYS[1], 'finished')
  return {'exhausted'}
end
local t = redis.call('TIME')
local now = tonumber(t[1])
local next_at = tonumber(redis.call('GET', KEYS[5]) or '0')
if now < next_at then return {'wait', next_at - now} end
local n = redis.call('SPOP', KEYS[3])
redis.call('RPUSH', KEYS[4], n)
local total = redis.call('LLEN', KEYS[4])
local interval = tonumber(redis.call('GET', KEYS[2]) or '0')
redis.call('SET', KEYS[5], now + interval)
return {'drawn', tonumber(n), total}
"#;

const TRANSITION_SCRIPT: &str = r#"
local st = redis.call('GET', KEYS[1])
if not st then return 'not_found' end
if st == 'finished' then return 'finished' end
if ARGV[2] ~= '' then redis.call('SET', KEYS[2], ARGV[2]) end
redis.call('SET', KEYS[1], ARGV[1])
return 'ok'
"#;

const FINALIZE_SCRIPT: &str = r#"
local st = redis.call('GET', KEYS[1])
if not st then return 'not_found' end
if st == 'finished' and ARGV[3] == '0' then return 'already_finished' end
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
if ARGV[3] == '0' then redis.call('SET', KEYS[1], 'finished') end
return 'finalized'
"#;

/// Static per-game settings persisted as JSON. Status, interval, called
/// numbers, winners, and marks live in their own keys so the Lua scripts
/// never have to decode JSON.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    tenant_id: TenantId,
    game_id: GameId,
    entry_fee_cents: u64,
    fee_percent: u8,
    multiple_winners: bool,
}

pub struct RedisGameStore {
    client: redis::Client,
    draw_script: Script,
    transition_script: Script,
    finalize_script: Script,
}

impl RedisGameStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            draw_script: Script::new(DRAW_SCRIPT),
            transition_script: Script::new(TRANSITION_SCRIPT),
            finalize_script: Script::new(FINALIZE_SCRIPT),
        }
    }

    async fn conn(&self) -> Result<MultiplexedConnection, AppError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn key(tenant_id: TenantId, game_id: GameId, suffix: &str) -> String {
        format!("hall:{}:{}:{}", tenant_id, game_id, suffix)
    }

    async fn load_record(
        &self,
        conn: &mut MultiplexedConnection,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<SessionRecord, AppError> {
        let raw: Option<String> = conn.get(Self::key(tenant_id, game_id, "session")).await?;
        let raw = raw.ok_or(AppError::GameNotFound(game_id))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn assemble_player(
        &self,
        conn: &mut MultiplexedConnection,
        tenant_id: TenantId,
        game_id: GameId,
        raw: &str,
    ) -> Result<Player, AppError> {
        let mut player: Player = serde_json::from_str(raw)?;
        let pattern: Option<String> = conn
            .hget(
                Self::key(tenant_id, game_id, "winners"),
                player.card_number,
            )
            .await?;
        let marks: Vec<u8> = conn
            .smembers(Self::key(
                tenant_id,
                game_id,
                &format!("marks:{}", player.card_number),
            ))
            .await?;
        player.is_winner = pattern.is_some();
        player.winning_pattern = pattern;
        player.manual_marks = marks;
        Ok(player)
    }
}

#[async_trait]
impl GameStore for RedisGameStore {
    #[tracing::instrument(skip(self, settings))]
    async fn create_game(
        &self,
        tenant_id: TenantId,
        settings: GameSettings,
    ) -> Result<GameSession, AppError> {
        let game_id = GameId::new();
        let record = SessionRecord {
            tenant_id,
            game_id,
            entry_fee_cents: settings.entry_fee_cents,
            fee_percent: settings.fee_percent,
            multiple_winners: settings.multiple_winners,
        };
        let pool: Vec<u8> = (1..=75).collect();

        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .set(
                Self::key(tenant_id, game_id, "session"),
                serde_json::to_string(&record)?,
            )
            .set(Self::key(tenant_id, game_id, "status"), "waiting")
            .set(
                Self::key(tenant_id, game_id, "interval"),
                settings.interval_seconds,
            )
            .set(Self::key(tenant_id, game_id, "next_at"), 0)
            .del(Self::key(tenant_id, game_id, "remaining"))
            .del(Self::key(tenant_id, game_id, "called"))
            .del(Self::key(tenant_id, game_id, "winners"))
            .sadd(Self::key(tenant_id, game_id, "remaining"), pool)
            .query_async::<()>(&mut conn)
            .await?;

        tracing::info!(tenant_id = %tenant_id, game_id = %game_id, "Game created");
        self.game_status(tenant_id, game_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn game_status(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<GameSession, AppError> {
        let mut conn = self.conn().await?;
        let record = self.load_record(&mut conn, tenant_id, game_id).await?;

        let (status, interval, called_count, current_number, player_count): (
            Option<String>,
            Option<u64>,
            u8,
            Option<u8>,
            u32,
        ) = redis::pipe()
            .get(Self::key(tenant_id, game_id, "status"))
            .get(Self::key(tenant_id, game_id, "interval"))
            .llen(Self::key(tenant_id, game_id, "called"))
            .lindex(Self::key(tenant_id, game_id, "called"), -1)
            .hlen(Self::key(tenant_id, game_id, "players"))
            .query_async(&mut conn)
            .await?;

        let status = status
            .as_deref()
            .and_then(GameStatus::parse)
            .ok_or_else(|| AppError::StoreProtocol("missing or invalid status".to_string()))?;

        Ok(GameSession {
            tenant_id,
            game_id,
            status,
            interval_seconds: interval.unwrap_or(0),
            entry_fee_cents: record.entry_fee_cents,
            fee_percent: record.fee_percent,
            multiple_winners: record.multiple_winners,
            called_count,
            current_number,
            player_count,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn activate_game(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        interval_seconds: Option<u64>,
    ) -> Result<GameSession, AppError> {
        let mut conn = self.conn().await?;
        let interval_arg = interval_seconds
            .map(|v| v.to_string())
            .unwrap_or_default();
        let reply: String = self
            .transition_script
            .key(Self::key(tenant_id, game_id, "status"))
            .key(Self::key(tenant_id, game_id, "interval"))
            .arg("active")
            .arg(interval_arg)
            .invoke_async(&mut conn)
            .await?;
        match reply.as_str() {
            "ok" => self.game_status(tenant_id, game_id).await,
            "not_found" => Err(AppError::GameNotFound(game_id)),
            "finished" => Err(AppError::GameFinished(game_id)),
            other => Err(AppError::StoreProtocol(other.to_string())),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn suspend_game(&self, tenant_id: TenantId, game_id: GameId) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let reply: String = self
            .transition_script
            .key(Self::key(tenant_id, game_id, "status"))
            .key(Self::key(tenant_id, game_id, "interval"))
            .arg("paused")
            .arg("")
            .invoke_async(&mut conn)
            .await?;
        match reply.as_str() {
            "ok" => Ok(()),
            "not_found" => Err(AppError::GameNotFound(game_id)),
            "finished" => Err(AppError::GameFinished(game_id)),
            other => Err(AppError::StoreProtocol(other.to_string())),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn draw_next_number(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<RawDraw, AppError> {
        let mut conn = self.conn().await?;
        let reply: Value = self
            .draw_script
            .key(Self::key(tenant_id, game_id, "status"))
            .key(Self::key(tenant_id, game_id, "interval"))
            .key(Self::key(tenant_id, game_id, "remaining"))
            .key(Self::key(tenant_id, game_id, "called"))
            .key(Self::key(tenant_id, game_id, "next_at"))
            .invoke_async(&mut conn)
            .await?;
        parse_draw_reply(reply, game_id)
    }

    #[tracing::instrument(skip(self))]
    async fn called_numbers(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<Vec<u8>, AppError> {
        let mut conn = self.conn().await?;
        // Distinguish an empty game from a missing one.
        self.load_record(&mut conn, tenant_id, game_id).await?;
        Ok(conn
            .lrange(Self::key(tenant_id, game_id, "called"), 0, -1)
            .await?)
    }

    #[tracing::instrument(skip(self, name))]
    async fn add_player(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        name: String,
        card_number: u16,
    ) -> Result<Player, AppError> {
        let mut conn = self.conn().await?;
        self.load_record(&mut conn, tenant_id, game_id).await?;

        let status: Option<String> = conn.get(Self::key(tenant_id, game_id, "status")).await?;
        if status.as_deref() == Some("finished") {
            return Err(AppError::GameFinished(game_id));
        }

        let player = Player {
            name,
            card_number,
            card: BingoCard::generate(card_number),
            is_winner: false,
            winning_pattern: None,
            manual_marks: Vec::new(),
        };
        // HSETNX makes card assignment first-writer-wins under concurrency.
        let added: bool = conn
            .hset_nx(
                Self::key(tenant_id, game_id, "players"),
                card_number,
                serde_json::to_string(&player)?,
            )
            .await?;
        if !added {
            return Err(AppError::CardTaken(card_number));
        }
        tracing::info!(tenant_id = %tenant_id, game_id = %game_id, card_number, "Player added");
        Ok(player)
    }

    #[tracing::instrument(skip(self))]
    async fn get_player(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
    ) -> Result<Option<Player>, AppError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .hget(Self::key(tenant_id, game_id, "players"), card_number)
            .await?;
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(
                self.assemble_player(&mut conn, tenant_id, game_id, &raw)
                    .await?,
            )),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_players(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
    ) -> Result<Vec<Player>, AppError> {
        let mut conn = self.conn().await?;
        let raw: std::collections::HashMap<String, String> =
            conn.hgetall(Self::key(tenant_id, game_id, "players")).await?;
        let mut players = Vec::with_capacity(raw.len());
        for value in raw.values() {
            players.push(
                self.assemble_player(&mut conn, tenant_id, game_id, value)
                    .await?,
            );
        }
        players.sort_by_key(|p| p.card_number);
        Ok(players)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_cell(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
        position: u8,
    ) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let exists: bool = conn
            .hexists(Self::key(tenant_id, game_id, "players"), card_number)
            .await?;
        if !exists {
            return Err(AppError::PlayerNotFound(card_number));
        }
        let _: () = conn
            .sadd(
                Self::key(tenant_id, game_id, &format!("marks:{}", card_number)),
                position,
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn finalize_winner(
        &self,
        tenant_id: TenantId,
        game_id: GameId,
        card_number: u16,
        pattern: &str,
    ) -> Result<FinalizeOutcome, AppError> {
        let mut conn = self.conn().await?;
        let record = self.load_record(&mut conn, tenant_id, game_id).await?;
        let exists: bool = conn
            .hexists(Self::key(tenant_id, game_id, "players"), card_number)
            .await?;
        if !exists {
            return Err(AppError::PlayerNotFound(card_number));
        }

        let reply: String = self
            .finalize_script
            .key(Self::key(tenant_id, game_id, "status"))
            .key(Self::key(tenant_id, game_id, "winners"))
            .arg(card_number)
            .arg(pattern)
            .arg(if record.multiple_winners { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;
        match reply.as_str() {
            "finalized" => Ok(FinalizeOutcome::Finalized),
            "already_finished" => Ok(FinalizeOutcome::AlreadyFinished),
            "not_found" => Err(AppError::GameNotFound(game_id)),
            other => Err(AppError::StoreProtocol(other.to_string())),
        }
    }
}

fn parse_draw_reply(value: Value, game_id: GameId) -> Result<RawDraw, AppError> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(AppError::StoreProtocol(format!("{:?}", other))),
    };
    let tag = match items.first() {
        Some(Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
        Some(Value::SimpleString(s)) => s.clone(),
        other => return Err(AppError::StoreProtocol(format!("{:?}", other))),
    };
    let int_at = |idx: usize| -> Result<i64, AppError> {
        match items.get(idx) {
            Some(Value::Int(v)) => Ok(*v),
            other => Err(AppError::StoreProtocol(format!("{:?}", other))),
        }
    };
    match tag.as_str() {
        "drawn" => Ok(RawDraw::Drawn {
            number: int_at(1)? as u8,
            total_called: int_at(2)? as u8,
        }),
        "wait" => Ok(RawDraw::Wait {
            seconds: int_at(1)?.max(1) as u64,
        }),
        "not_active" => Ok(RawDraw::NotActive),
        "exhausted" => Ok(RawDraw::Exhausted),
        "not_found" => Err(AppError::GameNotFound(game_id)),
        other => Err(AppError::StoreProtocol(other.to_string())),
    }
}
