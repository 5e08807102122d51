use std::{collections::HashMap, sync::Arc};
use tokio::sync::{broadcast, RwLock};

use crate::config::Config;
use crate::engine::arbiter::WinnerArbiter;
use crate::engine::caller::CallerRegistry;
use crate::engine::types::{EngineEvent, TenantId};
use crate::store::GameStore;

const HUB_CAPACITY: usize = 64;

/// Per-tenant broadcast hubs for UI notifications. Hubs are created
/// lazily on first use and are fully independent across tenants.
#[derive(Default)]
pub struct TenantHubs {
    hubs: RwLock<HashMap<TenantId, broadcast::Sender<EngineEvent>>>,
}

impl TenantHubs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one tenant's events.
    pub async fn subscribe(&self, tenant_id: TenantId) -> broadcast::Receiver<EngineEvent> {
        if let Some(sender) = self.hubs.read().await.get(&tenant_id) {
            return sender.subscribe();
        }
        let mut hubs = self.hubs.write().await;
        hubs.entry(tenant_id)
            .or_insert_with(|| broadcast::channel(HUB_CAPACITY).0)
            .subscribe()
    }

    /// Fan an event out to the tenant's subscribers, ignoring delivery
    /// errors (no subscriber is a normal condition).
    pub async fn broadcast(&self, tenant_id: TenantId, event: EngineEvent) {
        if let Some(sender) = self.hubs.read().await.get(&tenant_id) {
            let _ = sender.send(event);
        }
    }
}

pub struct AppState {
    pub store: Arc<dyn GameStore>,
    pub registry: Arc<CallerRegistry>,
    pub arbiter: WinnerArbiter,
    pub hubs: Arc<TenantHubs>,
    pub config: Arc<Config>,
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::GameId;

    #[tokio::test]
    async fn test_hubs_are_tenant_isolated() {
        let hubs = TenantHubs::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        let mut rx_a = hubs.subscribe(tenant_a).await;
        let mut rx_b = hubs.subscribe(tenant_b).await;

        let event = EngineEvent::GameStarted { game_id: GameId::new() };
        hubs.broadcast(tenant_a, event.clone()).await;

        assert_eq!(rx_a.recv().await.unwrap(), event);
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_a_noop() {
        let hubs = TenantHubs::new();
        hubs.broadcast(TenantId::new(), EngineEvent::GameStarted { game_id: GameId::new() })
            .await;
    }
}
