use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::fanout::RoomRegistry;
use crate::persistence::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<RoomRegistry>,
    pub store: Arc<dyn MessageStore>,
    /// Parent of every serving loop's token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn MessageStore>) -> Self {
        let registry = Arc::new(RoomRegistry::new(settings.websocket.queue_capacity));

        Self {
            settings: Arc::new(settings),
            registry,
            store,
            shutdown: CancellationToken::new(),
        }
    }
}
