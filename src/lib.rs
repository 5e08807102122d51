pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod state;
pub mod store;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use config::Config;
use engine::announcer::{ClipPlayer, FsClipPlayer};
use engine::arbiter::WinnerArbiter;
use engine::caller::CallerRegistry;
use engine::pattern::PatternSet;
use handlers::{rest, ws};
use state::{AppState, TenantHubs};
use std::{path::PathBuf, sync::Arc, time::Duration};
use store::{GameStore, RedisGameStore};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};

pub fn create_app(config: Config) -> Router {
    let client = redis::Client::open(config.store.redis_url.clone()).expect("Invalid Redis URL");
    let store: Arc<dyn GameStore> = Arc::new(RedisGameStore::new(client));

    let clip_player: Arc<dyn ClipPlayer> = Arc::new(FsClipPlayer::new(
        PathBuf::from(config.audio.assets_dir.clone()),
        Duration::from_millis(config.audio.clip_millis),
    ));

    create_app_with(config, store, clip_player)
}

/// Router assembly with the store and clip player injected, so tests can
/// swap in in-memory stands-ins.
pub fn create_app_with(
    config: Config,
    store: Arc<dyn GameStore>,
    clip_player: Arc<dyn ClipPlayer>,
) -> Router {
    let patterns = match &config.patterns_file {
        Some(path) => Arc::new(
            PatternSet::load(std::path::Path::new(path)).expect("Failed to load patterns file"),
        ),
        None => Arc::new(PatternSet::builtin()),
    };

    let config = Arc::new(config);
    let hubs = Arc::new(TenantHubs::new());
    let arbiter = WinnerArbiter::new(store.clone(), patterns);
    let registry = CallerRegistry::new(
        store.clone(),
        arbiter.clone(),
        hubs.clone(),
        clip_player,
        config.clone(),
    );

    let state = Arc::new(AppState { store, registry, arbiter, hubs, config });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/tenant/{tenant_id}/game", post(rest::create_game_handler))
        .route("/tenant/{tenant_id}/game/{game_id}", get(rest::get_game_handler))
        .route(
            "/tenant/{tenant_id}/game/{game_id}/players",
            post(rest::add_player_handler).get(rest::list_players_handler),
        )
        .route("/tenant/{tenant_id}/game/{game_id}/called", get(rest::called_numbers_handler))
        .route(
            "/tenant/{tenant_id}/game/{game_id}/players/{card_number}/marks",
            post(rest::mark_cell_handler),
        )
        .route(
            "/tenant/{tenant_id}/game/{game_id}/verify/{card_number}",
            post(rest::verify_winner_handler),
        )
        .route("/tenant/{tenant_id}/caller/start", post(rest::start_caller_handler))
        .route("/tenant/{tenant_id}/caller/pause", post(rest::pause_caller_handler))
        .route("/tenant/{tenant_id}/caller/resume", post(rest::resume_caller_handler))
        .route("/tenant/{tenant_id}/caller/stop", post(rest::stop_caller_handler))
        .route("/tenant/{tenant_id}/caller", get(rest::caller_status_handler))
        .route("/ws/tenant/{tenant_id}", get(ws::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioConfig, CallerConfig, LoggingConfig, ServerConfig, StoreConfig};
    use crate::store::MemoryGameStore;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    struct SilentPlayer;

    #[async_trait]
    impl ClipPlayer for SilentPlayer {
        async fn play(&self, _clip: &str) {}
    }

    fn test_config() -> Config {
        Config {
            server: ServerConfig { addr: "0.0.0.0:0".to_string() },
            store: StoreConfig { redis_url: "redis://127.0.0.1:6379/".to_string() },
            logging: LoggingConfig { level: "info".to_string() },
            audio: AudioConfig {
                assets_dir: "assets".to_string(),
                clip_millis: 0,
                gap_millis: 0,
                settle_millis: 0,
            },
            caller: CallerConfig {
                tick_millis: 10,
                draw_timeout_secs: 10,
                speak_timeout_secs: 10,
                teardown_timeout_secs: 2,
                auto_verify: true,
            },
            patterns_file: None,
        }
    }

    fn test_app() -> Router {
        create_app_with(test_config(), Arc::new(MemoryGameStore::new()), Arc::new(SilentPlayer))
    }

    #[tokio::test]
    async fn test_create_app_initialization() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_create_then_get_game_over_http() {
        let app = test_app();
        let tenant = engine::TenantId::new();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/tenant/{}/game", tenant))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"interval_seconds":6,"entry_fee_cents":500,"fee_percent":10}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let session: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let game_id = session["game_id"].as_str().unwrap();
        assert_eq!(session["status"], "waiting");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/tenant/{}/game/{}", tenant, game_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_game_is_not_found() {
        let app = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!(
                        "/tenant/{}/game/{}",
                        engine::TenantId::new(),
                        engine::GameId::new()
                    ))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
