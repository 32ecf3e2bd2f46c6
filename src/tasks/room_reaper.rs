use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RoomsConfig;
use crate::fanout::RoomRegistry;

/// Background task that evicts rooms nobody has been subscribed to for a while
pub struct RoomReaperTask {
    config: RoomsConfig,
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
}

impl RoomReaperTask {
    pub fn new(config: RoomsConfig, registry: Arc<RoomRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    pub async fn run(self) {
        let mut reap_timer = tokio::time::interval(self.config.reap_interval());
        let grace = self.config.idle_grace();

        // Skip immediate first tick
        reap_timer.tick().await;

        tracing::info!(
            reap_interval_secs = self.config.reap_interval().as_secs(),
            idle_grace_secs = self.config.idle_grace_secs,
            "Room reaper started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Room reaper received shutdown signal");
                    break;
                }
                _ = reap_timer.tick() => {
                    let reaped = self.registry.reap_idle(grace);
                    if reaped > 0 {
                        tracing::info!(
                            reaped = reaped,
                            remaining = self.registry.len(),
                            "Reaped idle rooms"
                        );
                    }
                }
            }
        }

        tracing::info!("Room reaper stopped");
    }
}
