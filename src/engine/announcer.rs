//! Serialized spoken output.
//!
//! One sequencer exists per tenant, so one tenant's speech never blocks
//! another's. Within a tenant, `speak` calls complete strictly in
//! submission order with no temporal overlap; this is what prevents audio
//! echo when the caller loop ticks faster than real speech.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use super::types::AnnouncementRequest;

/// Plays a single named clip to completion.
///
/// Implementations own the degrade path for missing assets: a missing
/// clip must still consume an equivalent duration of silence, so the
/// caller's timing assumptions hold regardless of asset availability.
#[async_trait]
pub trait ClipPlayer: Send + Sync {
    async fn play(&self, clip: &str);
}

/// Clip player backed by an asset directory. Playback itself happens on
/// the listening clients; this player paces the loop for the clip's
/// nominal duration and substitutes timed silence when the asset file is
/// absent.
pub struct FsClipPlayer {
    assets_dir: PathBuf,
    clip_duration: Duration,
}

impl FsClipPlayer {
    pub fn new(assets_dir: PathBuf, clip_duration: Duration) -> Self {
        Self { assets_dir, clip_duration }
    }
}

#[async_trait]
impl ClipPlayer for FsClipPlayer {
    async fn play(&self, clip: &str) {
        let path = self.assets_dir.join(format!("{}.mp3", clip));
        if !path.exists() {
            tracing::warn!(clip, path = %path.display(), "Clip asset missing; playing silence");
        }
        tokio::time::sleep(self.clip_duration).await;
    }
}

/// Per-tenant announcement queue: Idle -> Speaking -> Idle.
pub struct AnnouncementSequencer {
    player: Arc<dyn ClipPlayer>,
    gap: Duration,
    speaking: AtomicBool,
    // Fair mutex, so queued speak calls run in submission order.
    slot: Mutex<()>,
    // Bumped by stop_all; interrupts the in-flight announcement and
    // abandons everything still queued behind it.
    stop_epoch: watch::Sender<u64>,
}

impl AnnouncementSequencer {
    pub fn new(player: Arc<dyn ClipPlayer>, gap: Duration) -> Self {
        let (stop_epoch, _) = watch::channel(0);
        Self {
            player,
            gap,
            speaking: AtomicBool::new(false),
            slot: Mutex::new(()),
            stop_epoch,
        }
    }

    /// Speak one announcement, waiting first for any in-flight one to
    /// finish. Returns once the announcement has fully played (or was
    /// abandoned by `stop_all`).
    pub async fn speak(&self, request: AnnouncementRequest) {
        let mut stop_rx = self.stop_epoch.subscribe();
        let epoch = *stop_rx.borrow();

        let _slot = self.slot.lock().await;
        if *stop_rx.borrow() != epoch {
            tracing::debug!(?request, "Announcement abandoned by stop");
            return;
        }

        self.speaking.store(true, Ordering::SeqCst);
        tokio::select! {
            _ = self.pronounce(request) => {}
            _ = stop_rx.changed() => {
                tracing::debug!(?request, "Announcement interrupted by stop");
            }
        }
        self.speaking.store(false, Ordering::SeqCst);
    }

    async fn pronounce(&self, request: AnnouncementRequest) {
        match request {
            AnnouncementRequest::Phrase(phrase) => {
                self.player.play(phrase.clip_name()).await;
            }
            AnnouncementRequest::Call { letter, number } => {
                // Two sequential clips with a fixed gap for intelligibility.
                self.player.play(letter.clip_name()).await;
                tokio::time::sleep(self.gap).await;
                self.player.play(&number.to_string()).await;
            }
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Interrupt the in-flight announcement and abandon queued ones.
    pub fn stop_all(&self) {
        self.stop_epoch.send_modify(|epoch| *epoch += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Letter, Phrase};
    use tokio::time::Instant;

    /// Test player that records which clips played and when.
    struct RecordingPlayer {
        clip_duration: Duration,
        played: std::sync::Mutex<Vec<(String, Instant, Instant)>>,
    }

    impl RecordingPlayer {
        fn new(clip_duration: Duration) -> Arc<Self> {
            Arc::new(Self {
                clip_duration,
                played: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn played(&self) -> Vec<(String, Instant, Instant)> {
            self.played.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClipPlayer for RecordingPlayer {
        async fn play(&self, clip: &str) {
            let start = Instant::now();
            tokio::time::sleep(self.clip_duration).await;
            self.played
                .lock()
                .unwrap()
                .push((clip.to_string(), start, Instant::now()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_plays_letter_then_number_with_gap() {
        let player = RecordingPlayer::new(Duration::from_millis(400));
        let seq = AnnouncementSequencer::new(player.clone(), Duration::from_millis(200));

        seq.speak(AnnouncementRequest::Call { letter: Letter::G, number: 53 }).await;

        let played = player.played();
        assert_eq!(played.len(), 2);
        assert_eq!(played[0].0, "g");
        assert_eq!(played[1].0, "53");
        // The number clip starts one gap after the letter clip ends.
        assert_eq!(played[1].1 - played[0].2, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_speaks_never_overlap() {
        let player = RecordingPlayer::new(Duration::from_millis(400));
        let seq = Arc::new(AnnouncementSequencer::new(
            player.clone(),
            Duration::from_millis(200),
        ));

        let first = {
            let seq = seq.clone();
            tokio::spawn(async move {
                seq.speak(AnnouncementRequest::Call { letter: Letter::B, number: 7 }).await;
            })
        };
        tokio::task::yield_now().await;
        let second = {
            let seq = seq.clone();
            tokio::spawn(async move {
                seq.speak(AnnouncementRequest::Call { letter: Letter::I, number: 20 }).await;
            })
        };

        first.await.unwrap();
        second.await.unwrap();

        let played = player.played();
        let names: Vec<&str> = played.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "7", "i", "20"]);
        // Submission order, no temporal overlap anywhere.
        for pair in played.windows(2) {
            assert!(pair[1].1 >= pair[0].2);
        }
        assert!(!seq.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_speaking_tracks_in_flight_announcement() {
        let player = RecordingPlayer::new(Duration::from_millis(400));
        let seq = Arc::new(AnnouncementSequencer::new(
            player.clone(),
            Duration::from_millis(200),
        ));

        let handle = {
            let seq = seq.clone();
            tokio::spawn(async move {
                seq.speak(AnnouncementRequest::Phrase(Phrase::GameStarted)).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(seq.is_speaking());

        handle.await.unwrap();
        assert!(!seq.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_interrupts_and_abandons_queue() {
        let player = RecordingPlayer::new(Duration::from_millis(400));
        let seq = Arc::new(AnnouncementSequencer::new(
            player.clone(),
            Duration::from_millis(200),
        ));

        let first = {
            let seq = seq.clone();
            tokio::spawn(async move {
                seq.speak(AnnouncementRequest::Call { letter: Letter::O, number: 70 }).await;
            })
        };
        tokio::task::yield_now().await;
        let second = {
            let seq = seq.clone();
            tokio::spawn(async move {
                seq.speak(AnnouncementRequest::Call { letter: Letter::N, number: 33 }).await;
            })
        };
        tokio::task::yield_now().await;

        seq.stop_all();
        first.await.unwrap();
        second.await.unwrap();

        // Neither announcement completed a full clip.
        assert!(player.played().is_empty());
        assert!(!seq.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_asset_degrades_to_timed_silence() {
        let player = FsClipPlayer::new(
            PathBuf::from("/nonexistent/assets"),
            Duration::from_millis(900),
        );
        let start = Instant::now();
        player.play("42").await;
        assert_eq!(start.elapsed(), Duration::from_millis(900));
    }
}
