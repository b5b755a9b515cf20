use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants::FADE_STEP_MILLIS;

/// Owns the player volume (0.0 to 1.0) and moves it in cancellable linear fades
#[derive(Debug, Clone)]
pub struct Fader {
    volume: Arc<watch::Sender<f32>>,
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl Fader {
    pub fn new(initial: f32) -> Self {
        let (volume, _) = watch::channel(initial.clamp(0.0, 1.0));

        Self {
            volume: Arc::new(volume),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn volume(&self) -> f32 {
        *self.volume.borrow()
    }

    /// Observes every volume change
    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.volume.subscribe()
    }

    /// Starts a fade toward `target`, cancelling any fade already running
    pub async fn fade(&self, target: f32, over: Duration) -> JoinHandle<()> {
        let target = target.clamp(0.0, 1.0);
        let token = CancellationToken::new();

        let start = {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.replace(token.clone()) {
                debug!("superseding fade in progress");
                previous.cancel();
            }
            self.volume()
        };

        let volume = self.volume.clone();
        let active = self.active.clone();
        let steps = (over.as_millis() / FADE_STEP_MILLIS as u128).max(1) as u32;
        info!(start, target, steps, "volume fade started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(FADE_STEP_MILLIS));
            ticker.tick().await;

            for step in 1..=steps {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        debug!(step, volume = *volume.borrow(), "fade cancelled");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let value = match step == steps {
                    true => target,
                    false => start + (target - start) * (step as f32 / steps as f32),
                };

                // cancellation and the write are ordered by the same lock `abort` takes
                let _guard = active.lock().await;
                if token.is_cancelled() {
                    debug!(step, "fade cancelled before write");
                    return;
                }
                volume.send_replace(value);
            }

            debug!(target, "fade complete");
        })
    }

    /// Stops the running fade, leaving the volume wherever it got to
    pub async fn abort(&self) -> f32 {
        let mut active = self.active.lock().await;
        if let Some(token) = active.take() {
            token.cancel();
        }

        let current = self.volume();
        drop(active);
        info!(volume = current, "volume fade aborted");
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fade_reaches_target() {
        let fader = Fader::new(1.0);

        fader.fade(0.0, Duration::from_secs(1)).await.await.unwrap();
        assert_eq!(fader.volume(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_keeps_current_value() {
        let fader = Fader::new(1.0);
        let handle = fader.fade(0.0, Duration::from_secs(1)).await;

        tokio::time::sleep(Duration::from_millis(510)).await;
        let stopped = fader.abort().await;
        handle.await.unwrap();

        assert!(stopped > 0.0 && stopped < 1.0, "stopped at {}", stopped);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fader.volume(), stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_on_step_boundary_is_final() {
        for _ in 0..40 {
            let fader = Fader::new(1.0);
            let handle = fader.fade(0.0, Duration::from_secs(1)).await;

            // 500ms is exactly a step deadline, so the step and the abort are both ready
            tokio::time::sleep(Duration::from_millis(500)).await;
            let stopped = fader.abort().await;
            handle.await.unwrap();

            assert_eq!(fader.volume(), stopped);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_fade_supersedes_old() {
        let fader = Fader::new(0.0);
        let first = fader.fade(1.0, Duration::from_secs(10)).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = fader.fade(0.5, Duration::from_millis(100)).await;

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(fader.volume(), 0.5);
    }

    #[tokio::test]
    async fn test_target_is_clamped() {
        let fader = Fader::new(0.2);
        fader.fade(7.0, Duration::ZERO).await.await.unwrap();

        assert_eq!(fader.volume(), 1.0);
    }
}
