use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::instrument;

use crate::{
    engine::types::{EngineEvent, TenantId},
    state::SharedState,
};

// ==============================================================================
// === Websocket Handlers
// =============================================================================

#[instrument(skip(ws, state))]
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(tenant_id): Path<TenantId>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    tracing::info!(tenant_id = %tenant_id, "WebSocket upgrade requested.");
    ws.on_upgrade(move |socket| handle_socket(socket, tenant_id, state))
}

/// Forwards the tenant's event feed until either side hangs up. The feed
/// is one-directional; inbound frames other than close are ignored.
async fn handle_socket(socket: WebSocket, tenant_id: TenantId, state: SharedState) {
    tracing::info!(tenant_id = %tenant_id, "WebSocket connected.");

    let mut events = state.hubs.subscribe(tenant_id).await;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(tenant_id = %tenant_id, skipped, "Event feed lagged; dropping missed events.");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(frame) = event_frame(&event) else {
                continue;
            };
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    tracing::info!(tenant_id = %tenant_id, "WebSocket disconnected.");
    send_task.abort();
}

/// Encode one event as a text frame, dropping it rather than sending an
/// empty frame if encoding fails.
fn event_frame(event: &EngineEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Dropping unserializable event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{GameId, Letter};

    #[test]
    fn test_event_frames_are_tagged_json() {
        let frame = event_frame(&EngineEvent::GameStarted { game_id: GameId::new() }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "game_started");

        let frame = event_frame(&EngineEvent::NumberCalled {
            letter: Letter::G,
            number: 53,
            total_called: 12,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "number_called");
        assert_eq!(value["number"], 53);
    }
}
