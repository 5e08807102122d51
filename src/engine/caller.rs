//! The per-tenant calling loop.
//!
//! A tenant has at most one live caller at any instant: `start` always
//! tears the previous one down, fully, before the new loop spawns. The
//! loop's periodic tick is only a trigger; the store enforces the real
//! call cadence and number uniqueness, so a stalled or over-eager client
//! can never corrupt a game.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::Config;
use crate::engine::announcer::{AnnouncementSequencer, ClipPlayer};
use crate::engine::arbiter::{VerifyOutcome, WinnerArbiter};
use crate::engine::draw::{DrawCoordinator, DrawOutcome};
use crate::engine::types::{
    AnnouncementRequest, EngineEvent, GameId, GameOverReason, Phrase, TenantId,
};
use crate::error::AppError;
use crate::state::TenantHubs;
use crate::store::GameStore;

/// Snapshot of one tenant's caller, for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CallerStatus {
    pub game_id: GameId,
    pub paused: bool,
    pub speaking: bool,
    pub call_count: u32,
}

struct CallerState {
    tenant_id: TenantId,
    game_id: GameId,
    /// With multiple winners allowed, a declaration does not end the game;
    /// the loop keeps calling until the pool runs out.
    multiple_winners: bool,
    paused: AtomicBool,
    call_count: AtomicU32,
    /// In-flight guard: held while a draw (and its announcement) is
    /// outstanding.
    draw_gate: Mutex<()>,
    cancel: watch::Sender<bool>,
}

struct CallerEntry {
    state: Arc<CallerState>,
    sequencer: Arc<AnnouncementSequencer>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Explicit registry of live callers, keyed by tenant and owned by the
/// application state. Tenants never contend with each other here beyond
/// the map locks.
pub struct CallerRegistry {
    callers: RwLock<HashMap<TenantId, Arc<CallerEntry>>>,
    /// Serializes start/stop so rapid re-starts (multiple admin tabs)
    /// cannot interleave into two live loops.
    start_gate: Mutex<()>,
    store: Arc<dyn GameStore>,
    arbiter: WinnerArbiter,
    hubs: Arc<TenantHubs>,
    clip_player: Arc<dyn ClipPlayer>,
    config: Arc<Config>,
}

impl CallerRegistry {
    pub fn new(
        store: Arc<dyn GameStore>,
        arbiter: WinnerArbiter,
        hubs: Arc<TenantHubs>,
        clip_player: Arc<dyn ClipPlayer>,
        config: Arc<Config>,
    ) -> Arc<Self> {
        Arc::new(Self {
            callers: RwLock::new(HashMap::new()),
            start_gate: Mutex::new(()),
            store,
            arbiter,
            hubs,
            clip_player,
            config,
        })
    }

    /// Start calling a game for a tenant, replacing any caller already
    /// running for that tenant.
    #[tracing::instrument(skip(self))]
    pub async fn start(
        self: &Arc<Self>,
        tenant_id: TenantId,
        game_id: GameId,
        interval_seconds: Option<u64>,
    ) -> Result<(), AppError> {
        let _gate = self.start_gate.lock().await;
        self.stop_locked(tenant_id).await;

        let session = self
            .store
            .activate_game(tenant_id, game_id, interval_seconds)
            .await?;

        let (cancel, _) = watch::channel(false);
        let state = Arc::new(CallerState {
            tenant_id,
            game_id,
            multiple_winners: session.multiple_winners,
            paused: AtomicBool::new(false),
            call_count: AtomicU32::new(0),
            draw_gate: Mutex::new(()),
            cancel,
        });
        let sequencer = Arc::new(AnnouncementSequencer::new(
            self.clip_player.clone(),
            Duration::from_millis(self.config.audio.gap_millis),
        ));
        let entry = Arc::new(CallerEntry {
            state: state.clone(),
            sequencer: sequencer.clone(),
            handle: std::sync::Mutex::new(None),
        });
        self.callers.write().await.insert(tenant_id, entry.clone());

        let handle = tokio::spawn(run_loop(self.clone(), state, sequencer));
        *entry.handle.lock().unwrap() = Some(handle);

        tracing::info!(tenant_id = %tenant_id, game_id = %game_id, "Caller started");
        Ok(())
    }

    /// Stop the tenant's caller, if any. Idempotent; returns whether a
    /// caller was actually torn down.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self, tenant_id: TenantId) -> bool {
        let _gate = self.start_gate.lock().await;
        self.stop_locked(tenant_id).await
    }

    async fn stop_locked(&self, tenant_id: TenantId) -> bool {
        let entry = self.callers.write().await.remove(&tenant_id);
        let Some(entry) = entry else {
            return false;
        };

        let _ = entry.state.cancel.send(true);
        entry.sequencer.stop_all();

        let handle = entry.handle.lock().unwrap().take();
        if let Some(mut handle) = handle {
            let teardown = Duration::from_secs(self.config.caller.teardown_timeout_secs);
            if timeout(teardown, &mut handle).await.is_err() {
                tracing::warn!(tenant_id = %tenant_id, "Caller task did not wind down in time; aborting it");
                handle.abort();
            }
        }
        tracing::info!(tenant_id = %tenant_id, game_id = %entry.state.game_id, "Caller stopped");
        true
    }

    /// Suspend the polling loop. The store's next-allowed-call bookkeeping
    /// is untouched, so resuming does not reset the cadence.
    pub async fn pause(&self, tenant_id: TenantId) -> Result<(), AppError> {
        let entry = self.entry(tenant_id).await.ok_or(AppError::CallerInactive(tenant_id))?;
        entry.state.paused.store(true, Ordering::Relaxed);
        self.store.suspend_game(tenant_id, entry.state.game_id).await?;
        tracing::info!(tenant_id = %tenant_id, "Caller paused");
        Ok(())
    }

    pub async fn resume(&self, tenant_id: TenantId) -> Result<(), AppError> {
        let entry = self.entry(tenant_id).await.ok_or(AppError::CallerInactive(tenant_id))?;
        self.store
            .activate_game(tenant_id, entry.state.game_id, None)
            .await?;
        entry.state.paused.store(false, Ordering::Relaxed);
        tracing::info!(tenant_id = %tenant_id, "Caller resumed");
        Ok(())
    }

    pub async fn is_active(&self, tenant_id: TenantId) -> bool {
        self.callers.read().await.contains_key(&tenant_id)
    }

    pub async fn status(&self, tenant_id: TenantId) -> Option<CallerStatus> {
        let entry = self.entry(tenant_id).await?;
        Some(CallerStatus {
            game_id: entry.state.game_id,
            paused: entry.state.paused.load(Ordering::Relaxed),
            speaking: entry.sequencer.is_speaking(),
            call_count: entry.state.call_count.load(Ordering::Relaxed),
        })
    }

    async fn entry(&self, tenant_id: TenantId) -> Option<Arc<CallerEntry>> {
        self.callers.read().await.get(&tenant_id).cloned()
    }

    /// Remove a caller that ended on its own, unless a newer caller has
    /// already taken the slot.
    async fn retire(&self, tenant_id: TenantId, state: &Arc<CallerState>) {
        let mut callers = self.callers.write().await;
        if let Some(entry) = callers.get(&tenant_id) {
            if Arc::ptr_eq(&entry.state, state) {
                callers.remove(&tenant_id);
            }
        }
    }
}

async fn run_loop(
    registry: Arc<CallerRegistry>,
    state: Arc<CallerState>,
    sequencer: Arc<AnnouncementSequencer>,
) {
    let tenant_id = state.tenant_id;
    let game_id = state.game_id;
    let cfg = registry.config.clone();
    let coordinator = DrawCoordinator::new(registry.store.clone());
    let mut cancel = state.cancel.subscribe();
    let draw_timeout = Duration::from_secs(cfg.caller.draw_timeout_secs);
    let speak_timeout = Duration::from_secs(cfg.caller.speak_timeout_secs);

    // Opening phrase, then a settle delay before the first number.
    tokio::select! {
        _ = cancel.changed() => return,
        spoken = timeout(speak_timeout, sequencer.speak(AnnouncementRequest::Phrase(Phrase::GameStarted))) => {
            if spoken.is_err() {
                tracing::warn!(tenant_id = %tenant_id, "Opening announcement stalled past safety timeout");
            }
        }
    }
    registry
        .hubs
        .broadcast(tenant_id, EngineEvent::GameStarted { game_id })
        .await;
    tokio::select! {
        _ = cancel.changed() => return,
        _ = tokio::time::sleep(Duration::from_millis(cfg.audio.settle_millis)) => {}
    }

    let mut tick = interval(Duration::from_millis(cfg.caller.tick_millis));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let reason = loop {
        tokio::select! {
            _ = cancel.changed() => return, // stop() owns the cleanup
            _ = tick.tick() => {}
        }
        if state.paused.load(Ordering::Relaxed) {
            continue;
        }

        // The in-flight guard is a scoped lock: it is released on every
        // exit from this iteration, timeouts included, so one bad draw
        // can never wedge the loop for good.
        let Ok(_in_flight) = state.draw_gate.try_lock() else {
            continue;
        };

        let outcome = match timeout(draw_timeout, coordinator.draw(tenant_id, game_id)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    tenant_id = %tenant_id, game_id = %game_id,
                    "Draw stalled past safety timeout; releasing in-flight guard"
                );
                continue;
            }
        };

        match outcome {
            DrawOutcome::Success { number, letter, total_called } => {
                state.call_count.fetch_add(1, Ordering::Relaxed);
                // Announce before the next tick may draw again: draws and
                // announcements interleave strictly, never pipeline.
                let spoken = timeout(
                    speak_timeout,
                    sequencer.speak(AnnouncementRequest::Call { letter, number }),
                )
                .await;
                if spoken.is_err() {
                    tracing::warn!(tenant_id = %tenant_id, "Announcement stalled past safety timeout");
                }
                registry
                    .hubs
                    .broadcast(tenant_id, EngineEvent::NumberCalled { letter, number, total_called })
                    .await;
                tracing::info!(
                    tenant_id = %tenant_id, game_id = %game_id,
                    %letter, number, total_called, "Number called"
                );

                if cfg.caller.auto_verify {
                    match registry.arbiter.verify_all(tenant_id, game_id).await {
                        Ok(Some(VerifyOutcome::Winner { player, card_number, pattern, prize })) => {
                            registry
                                .hubs
                                .broadcast(
                                    tenant_id,
                                    EngineEvent::WinnerDeclared {
                                        player,
                                        card_number,
                                        pattern,
                                        prize_cents: prize.prize_cents,
                                    },
                                )
                                .await;
                            if !state.multiple_winners {
                                break GameOverReason::Winner;
                            }
                        }
                        Ok(Some(VerifyOutcome::AlreadyFinished)) => break GameOverReason::Winner,
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(tenant_id = %tenant_id, error = %e, "Auto-verification failed")
                        }
                    }
                }
                if total_called >= 75 {
                    // One more draw trips the store's terminal transition.
                    let _ = coordinator.draw(tenant_id, game_id).await;
                    break GameOverReason::Exhausted;
                }
            }
            DrawOutcome::Backpressure { wait_seconds } => {
                // Expected and frequent; the next tick retries.
                tracing::debug!(tenant_id = %tenant_id, wait_seconds, "Too early to draw");
            }
            DrawOutcome::NotActive => {
                tracing::debug!(tenant_id = %tenant_id, game_id = %game_id, "Game not active; pausing loop");
                state.paused.store(true, Ordering::Relaxed);
            }
            DrawOutcome::Exhausted => break GameOverReason::Exhausted,
            DrawOutcome::Failure { detail } => {
                tracing::error!(
                    tenant_id = %tenant_id, game_id = %game_id,
                    %detail, "Draw failed; next tick retries"
                );
            }
        }
    };

    // Natural end of game, as opposed to an external stop().
    let _ = timeout(
        speak_timeout,
        sequencer.speak(AnnouncementRequest::Phrase(Phrase::GameOver)),
    )
    .await;
    registry
        .hubs
        .broadcast(tenant_id, EngineEvent::GameOver { game_id, reason })
        .await;
    registry.retire(tenant_id, &state).await;
    tracing::info!(tenant_id = %tenant_id, game_id = %game_id, ?reason, "Caller loop ended");
}
