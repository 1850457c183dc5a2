//! Best-effort capture of the active surface.
//!
//! Captures never fail loudly: every problem (disabled, surface no longer
//! active, still loading, URL changed, uncapturable URL, timeout, host error)
//! yields `None` and the caller keeps whatever snapshot it already had.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tabtime_core::{EngineConfig, Millis, SurfaceId, WindowId, urls};

use crate::clock::{Clock, millis};
use crate::host::{Host, LoadStatus};

/// Rate-limited, time-bounded snapshot capture.
#[derive(Debug)]
pub struct SnapshotService<H> {
    host: Arc<H>,
    clock: Arc<dyn Clock>,
    enabled: AtomicBool,
    last_attempt: Mutex<Option<Millis>>,
    throttle_ms: Millis,
    timeout: Duration,
}

impl<H: Host> SnapshotService<H> {
    pub fn new(host: Arc<H>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            host,
            clock,
            enabled: AtomicBool::new(true),
            last_attempt: Mutex::new(None),
            throttle_ms: config.snapshot_throttle_ms,
            timeout: millis(config.capture_timeout_ms),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            tracing::info!(enabled, "snapshot capture toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Captures `surface` if it is still the active, loaded surface of
    /// `window` and still shows `expected_url`.
    pub async fn capture(
        &self,
        surface: SurfaceId,
        window: WindowId,
        expected_url: &str,
    ) -> Option<String> {
        if !self.is_enabled() {
            tracing::debug!(%surface, "snapshots disabled, skipping capture");
            return None;
        }

        let active = match self.host.active_surface(Some(window)).await {
            Ok(active) => active,
            Err(err) => {
                tracing::debug!(%surface, %window, error = %err, "could not verify active surface");
                return None;
            }
        };
        let Some(active) = active.filter(|active| active.id == surface) else {
            tracing::debug!(
                %surface,
                %window,
                "surface not active in its window, skipping capture"
            );
            return None;
        };
        if active.status != LoadStatus::Complete {
            tracing::debug!(%surface, "surface still loading, skipping capture");
            return None;
        }
        let url = active.url.unwrap_or_default();
        if url != expected_url {
            tracing::debug!(
                %surface,
                expected = expected_url,
                current = %url,
                "URL changed, skipping capture"
            );
            return None;
        }
        if !urls::is_capturable_url(&url) {
            tracing::debug!(%surface, %url, "URL not capturable");
            return None;
        }

        match tokio::time::timeout(self.timeout, self.host.capture_visible(window)).await {
            Ok(Ok(Some(snapshot))) if !snapshot.is_empty() => {
                tracing::debug!(%surface, bytes = snapshot.len(), "captured snapshot");
                Some(snapshot)
            }
            Ok(Ok(_)) => {
                tracing::debug!(%surface, "capture produced no data");
                None
            }
            Ok(Err(err)) => {
                tracing::debug!(%surface, error = %err, "capture failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    %surface,
                    timeout_ms = self.timeout.as_millis(),
                    "capture timed out"
                );
                None
            }
        }
    }

    /// Like [`capture`](Self::capture), but at most once per throttle period.
    pub async fn capture_throttled(
        &self,
        surface: SurfaceId,
        window: WindowId,
        expected_url: &str,
    ) -> Option<String> {
        let now = self.clock.now_millis();
        {
            let mut last = self.last_attempt.lock().unwrap_or_else(PoisonError::into_inner);
            if last.is_some_and(|last| now - last < self.throttle_ms) {
                tracing::debug!(%surface, "capture throttled");
                return None;
            }
            *last = Some(now);
        }
        self.capture(surface, window, expected_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::ManualClock;
    use crate::sim::ScriptedHost;

    const URL: &str = "https://x.com/home";

    fn service() -> (Arc<ScriptedHost>, Arc<ManualClock>, SnapshotService<ScriptedHost>) {
        let host = Arc::new(ScriptedHost::new());
        host.open(SurfaceId(1), WindowId(1), URL, "Home");
        let clock = Arc::new(ManualClock::new(0));
        let service = SnapshotService::new(host.clone(), clock.clone(), &EngineConfig::default());
        (host, clock, service)
    }

    #[tokio::test]
    async fn captures_active_loaded_surface() {
        let (host, _, service) = service();
        let snapshot = service.capture(SurfaceId(1), WindowId(1), URL).await;
        assert_eq!(snapshot.as_deref(), Some("data:image/jpeg;base64,snapshot-1"));
        assert_eq!(host.capture_count(), 1);
    }

    #[tokio::test]
    async fn revalidation_rejects_stale_targets() {
        let (host, _, service) = service();
        assert!(service.capture(SurfaceId(1), WindowId(1), "https://x.com/other").await.is_none());

        host.navigate(SurfaceId(1), URL, "Home");
        assert!(service.capture(SurfaceId(1), WindowId(1), URL).await.is_none());

        host.loaded(SurfaceId(1));
        host.open(SurfaceId(2), WindowId(1), "https://y.com/", "Y");
        assert!(service.capture(SurfaceId(1), WindowId(1), URL).await.is_none());
        assert_eq!(host.capture_count(), 0);
    }

    #[tokio::test]
    async fn disabled_service_never_captures() {
        let (host, _, service) = service();
        service.set_enabled(false);
        assert!(service.capture(SurfaceId(1), WindowId(1), URL).await.is_none());
        assert_eq!(host.capture_count(), 0);
    }

    #[tokio::test]
    async fn throttle_limits_attempts() {
        let (host, clock, service) = service();
        assert!(service.capture_throttled(SurfaceId(1), WindowId(1), URL).await.is_some());
        clock.advance(2_999);
        assert!(service.capture_throttled(SurfaceId(1), WindowId(1), URL).await.is_none());
        clock.advance(1);
        assert!(service.capture_throttled(SurfaceId(1), WindowId(1), URL).await.is_some());
        assert_eq!(host.capture_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_capture_times_out() {
        let (host, _, service) = service();
        host.set_capture_delay(Some(Duration::from_secs(10)));
        assert!(service.capture(SurfaceId(1), WindowId(1), URL).await.is_none());
    }

    #[tokio::test]
    async fn host_failures_yield_nothing() {
        let (host, _, service) = service();
        host.set_failing(true);
        assert!(service.capture(SurfaceId(1), WindowId(1), URL).await.is_none());
    }
}
