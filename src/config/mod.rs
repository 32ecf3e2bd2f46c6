mod settings;

pub use settings::{
    IdentityConfig, LoggingConfig, PersistenceConfig, RoomsConfig, ServerConfig, Settings,
    WebSocketConfig,
};
