//! Liveness reporter, independent of playback.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use signwall_shared::ScreenId;

use crate::backend::Backend;

/// Ping the backend every `period` until the returned task is aborted.
///
/// The first ping goes out one period after start. Failures are logged and
/// otherwise ignored.
pub fn spawn_heartbeat<B>(backend: Arc<B>, screen_id: ScreenId, period: Duration) -> JoinHandle<()>
where
    B: Backend + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match backend.heartbeat(&screen_id).await {
                Ok(()) => debug!(screen = %screen_id, "Heartbeat sent"),
                Err(e) => warn!(screen = %screen_id, error = %e, "Heartbeat failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::tests::MockBackend;

    #[tokio::test(start_paused = true)]
    async fn pings_on_a_fixed_interval() {
        let backend = Arc::new(MockBackend::default());
        let handle = spawn_heartbeat(backend.clone(), ScreenId::from("s0"), Duration::from_secs(300));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(backend.state().heartbeats, 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.state().heartbeats, 1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(backend.state().heartbeats, 3);

        handle.abort();
    }
}
