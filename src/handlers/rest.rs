use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::{
    engine::arbiter::VerifyOutcome,
    engine::caller::CallerStatus,
    engine::types::{
        EngineEvent, GameId, GameOverReason, GameSession, GameSettings, GameStatus, Letter,
        Player, TenantId,
    },
    error::AppError,
    state::SharedState,
};

// ==============================================================================
// === DTOs
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    pub interval_seconds: u64,
    pub entry_fee_cents: u64,
    pub fee_percent: u8,
    #[serde(default)]
    pub multiple_winners: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddPlayerRequest {
    pub name: String,
    pub card_number: u16,
}

#[derive(Debug, Deserialize)]
pub struct StartCallerRequest {
    pub game_id: GameId,
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MarkCellRequest {
    pub position: u8,
}

#[derive(Debug, serde::Serialize)]
pub struct CalledNumber {
    pub letter: Option<Letter>,
    pub number: u8,
}

// ==============================================================================
// === Game handlers
// =============================================================================

#[instrument(skip(state))]
pub async fn create_game_handler(
    State(state): State<SharedState>,
    Path(tenant_id): Path<TenantId>,
    Json(payload): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<GameSession>), AppError> {
    let session = state
        .store
        .create_game(
            tenant_id,
            GameSettings {
                interval_seconds: payload.interval_seconds,
                entry_fee_cents: payload.entry_fee_cents,
                fee_percent: payload.fee_percent,
                multiple_winners: payload.multiple_winners,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(skip(state))]
pub async fn get_game_handler(
    State(state): State<SharedState>,
    Path((tenant_id, game_id)): Path<(TenantId, GameId)>,
) -> Result<Json<GameSession>, AppError> {
    let session = state.store.game_status(tenant_id, game_id).await?;
    Ok(Json(session))
}

#[instrument(skip(state))]
pub async fn add_player_handler(
    State(state): State<SharedState>,
    Path((tenant_id, game_id)): Path<(TenantId, GameId)>,
    Json(payload): Json<AddPlayerRequest>,
) -> Result<(StatusCode, Json<Player>), AppError> {
    let player = state
        .store
        .add_player(tenant_id, game_id, payload.name, payload.card_number)
        .await?;
    Ok((StatusCode::CREATED, Json(player)))
}

#[instrument(skip(state))]
pub async fn list_players_handler(
    State(state): State<SharedState>,
    Path((tenant_id, game_id)): Path<(TenantId, GameId)>,
) -> Result<Json<Vec<Player>>, AppError> {
    Ok(Json(state.store.list_players(tenant_id, game_id).await?))
}

#[instrument(skip(state))]
pub async fn called_numbers_handler(
    State(state): State<SharedState>,
    Path((tenant_id, game_id)): Path<(TenantId, GameId)>,
) -> Result<Json<Vec<CalledNumber>>, AppError> {
    let numbers = state.store.called_numbers(tenant_id, game_id).await?;
    let called = numbers
        .into_iter()
        .map(|number| CalledNumber { letter: Letter::for_number(number), number })
        .collect();
    Ok(Json(called))
}

#[instrument(skip(state))]
pub async fn mark_cell_handler(
    State(state): State<SharedState>,
    Path((tenant_id, game_id, card_number)): Path<(TenantId, GameId, u16)>,
    Json(payload): Json<MarkCellRequest>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .mark_cell(tenant_id, game_id, card_number, payload.position)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn verify_winner_handler(
    State(state): State<SharedState>,
    Path((tenant_id, game_id, card_number)): Path<(TenantId, GameId, u16)>,
) -> Result<Json<VerifyOutcome>, AppError> {
    let outcome = state.arbiter.verify(tenant_id, game_id, card_number).await?;

    if let VerifyOutcome::Winner { player, card_number, pattern, prize } = &outcome {
        state
            .hubs
            .broadcast(
                tenant_id,
                EngineEvent::WinnerDeclared {
                    player: player.clone(),
                    card_number: *card_number,
                    pattern: pattern.clone(),
                    prize_cents: prize.prize_cents,
                },
            )
            .await;

        // When the declaration finished the game, wind the caller down
        // too (but only if it is calling this very game).
        let session = state.store.game_status(tenant_id, game_id).await?;
        if session.status == GameStatus::Finished {
            if let Some(status) = state.registry.status(tenant_id).await {
                if status.game_id == game_id {
                    state.registry.stop(tenant_id).await;
                }
            }
            state
                .hubs
                .broadcast(
                    tenant_id,
                    EngineEvent::GameOver { game_id, reason: GameOverReason::Winner },
                )
                .await;
        }
    }

    Ok(Json(outcome))
}

// ==============================================================================
// === Caller handlers
// =============================================================================

#[instrument(skip(state))]
pub async fn start_caller_handler(
    State(state): State<SharedState>,
    Path(tenant_id): Path<TenantId>,
    Json(payload): Json<StartCallerRequest>,
) -> Result<Json<CallerStatus>, AppError> {
    state
        .registry
        .start(tenant_id, payload.game_id, payload.interval_seconds)
        .await?;
    state
        .registry
        .status(tenant_id)
        .await
        .map(Json)
        .ok_or(AppError::CallerInactive(tenant_id))
}

#[instrument(skip(state))]
pub async fn pause_caller_handler(
    State(state): State<SharedState>,
    Path(tenant_id): Path<TenantId>,
) -> Result<StatusCode, AppError> {
    state.registry.pause(tenant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn resume_caller_handler(
    State(state): State<SharedState>,
    Path(tenant_id): Path<TenantId>,
) -> Result<StatusCode, AppError> {
    state.registry.resume(tenant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn stop_caller_handler(
    State(state): State<SharedState>,
    Path(tenant_id): Path<TenantId>,
) -> Json<serde_json::Value> {
    let stopped = state.registry.stop(tenant_id).await;
    Json(json!({ "stopped": stopped }))
}

#[instrument(skip(state))]
pub async fn caller_status_handler(
    State(state): State<SharedState>,
    Path(tenant_id): Path<TenantId>,
) -> Result<Json<CallerStatus>, AppError> {
    state
        .registry
        .status(tenant_id)
        .await
        .map(Json)
        .ok_or(AppError::CallerInactive(tenant_id))
}
