//! Graceful shutdown handling.
//!
//! Cancelling the root token ends every serving loop with a "going away"
//! close and stops background tasks; shutdown then waits, bounded, for the
//! subscribers to drain out of their rooms.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::fanout::RoomRegistry;

/// How often the drain wait re-checks the registry
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for serving loops to close their connections (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of a graceful shutdown
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Subscribers registered when shutdown began
    pub subscribers_at_start: usize,
    /// Subscribers still registered when the drain wait ended
    pub subscribers_remaining: usize,
    pub duration: Duration,
}

impl ShutdownResult {
    pub fn drained(&self) -> bool {
        self.subscribers_remaining == 0
    }
}

/// Coordinates shutdown of live connections
pub struct GracefulShutdown {
    registry: Arc<RoomRegistry>,
    token: CancellationToken,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<RoomRegistry>, token: CancellationToken) -> Self {
        Self {
            registry,
            token,
            config: ShutdownConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ShutdownConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancel all serving loops and wait for them to leave their rooms
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        let subscribers_at_start = self.registry.stats().subscribers;

        tracing::info!(
            reason = %reason,
            subscribers = subscribers_at_start,
            "Starting graceful shutdown"
        );
        self.token.cancel();

        let deadline = start + self.config.drain_timeout;
        let mut remaining = subscribers_at_start;
        while remaining > 0 && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            remaining = self.registry.stats().subscribers;
        }

        let result = ShutdownResult {
            subscribers_at_start,
            subscribers_remaining: remaining,
            duration: start.elapsed(),
        };

        if result.drained() {
            tracing::info!(
                duration_ms = result.duration.as_millis() as u64,
                "Graceful shutdown completed"
            );
        } else {
            tracing::warn!(
                remaining = result.subscribers_remaining,
                drain_timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "Shutdown drain timed out with subscribers still registered"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::{ConversationKey, ParticipantId};

    #[tokio::test]
    async fn test_shutdown_with_no_connections() {
        let registry = Arc::new(RoomRegistry::new(4));
        let token = CancellationToken::new();
        let shutdown = GracefulShutdown::new(registry, token.clone());

        let result = shutdown.execute("test").await;
        assert!(result.drained());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_subscriber() {
        let registry = Arc::new(RoomRegistry::new(4));
        let key = ConversationKey::from_ids("a", "b").unwrap();
        // Registered but never served, so nothing removes it
        let _held = registry
            .subscribe(&key, ParticipantId::new("a").unwrap())
            .unwrap();

        let shutdown = GracefulShutdown::new(registry, CancellationToken::new()).with_config(
            ShutdownConfig {
                drain_timeout: Duration::from_millis(100),
            },
        );

        let result = shutdown.execute("test").await;
        assert_eq!(result.subscribers_at_start, 1);
        assert_eq!(result.subscribers_remaining, 1);
        assert!(!result.drained());
    }
}
