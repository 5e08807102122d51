use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use crate::engine::types::{GameId, TenantId};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Game with ID {0} not found")]
    GameNotFound(GameId),

    #[error("No player holds card {0} in this game")]
    PlayerNotFound(u16),

    #[error("Card {0} is already taken in this game")]
    CardTaken(u16),

    #[error("Game {0} is already finished")]
    GameFinished(GameId),

    #[error("No active caller for tenant {0}")]
    CallerInactive(TenantId),

    #[error("Invalid card data: {0}")]
    InvalidCard(String),

    #[error("Unexpected store reply: {0}")]
    StoreProtocol(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal database error occurred".to_string())
            }
            AppError::Serde(e) => {
                tracing::error!("Serialization error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal serialization error occurred".to_string())
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal I/O error occurred".to_string())
            }
            AppError::StoreProtocol(detail) => {
                tracing::error!("Unexpected store reply: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal store error occurred".to_string())
            }
            AppError::GameNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Game with id {} not found", id))
            }
            AppError::PlayerNotFound(card) => {
                (StatusCode::NOT_FOUND, format!("No player holds card {}", card))
            }
            AppError::CallerInactive(tenant) => {
                (StatusCode::NOT_FOUND, format!("No active caller for tenant {}", tenant))
            }
            AppError::CardTaken(card) => {
                (StatusCode::CONFLICT, format!("Card {} is already taken", card))
            }
            AppError::GameFinished(id) => {
                (StatusCode::CONFLICT, format!("Game {} is already finished", id))
            }
            AppError::InvalidCard(detail) => {
                (StatusCode::BAD_REQUEST, format!("Invalid card data: {}", detail))
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
