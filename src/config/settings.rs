use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub rooms: RoomsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Outbound queue capacity per subscriber
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Deadline for a single frame write, in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    /// Largest accepted message body, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomsConfig {
    /// How long a room may sit without subscribers before it is reaped, in seconds
    #[serde(default = "default_idle_grace")]
    pub idle_grace_secs: u64,
    /// Reaper interval in seconds
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Memory backend only: accept unknown participants, using their id as display name
    #[serde(default = "default_auto_register")]
    pub auto_register_users: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Header carrying the participant id set by the upstream gateway
    #[serde(default = "default_identity_header")]
    pub header: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_queue_capacity() -> usize {
    16
}

fn default_write_timeout() -> u64 {
    5
}

fn default_max_body_bytes() -> usize {
    8192
}

fn default_idle_grace() -> u64 {
    300 // 5 minutes
}

fn default_reap_interval() -> u64 {
    60
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_auto_register() -> bool {
    true
}

fn default_identity_header() -> String {
    "x-participant-id".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("websocket.queue_capacity", default_queue_capacity() as i64)?
            .set_default("websocket.write_timeout_secs", default_write_timeout() as i64)?
            .set_default("rooms.idle_grace_secs", default_idle_grace() as i64)?
            .set_default("rooms.reap_interval_secs", default_reap_interval() as i64)?
            .set_default("persistence.backend", default_backend())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Environment, e.g. PAIRWIRE__SERVER__PORT, PAIRWIRE__PERSISTENCE__DATABASE_URL
            .add_source(
                Environment::with_prefix("PAIRWIRE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl WebSocketConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl RoomsConfig {
    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            write_timeout_secs: default_write_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_grace_secs: default_idle_grace(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: None,
            pool_size: default_pool_size(),
            auto_register_users: default_auto_register(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            header: default_identity_header(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.websocket.queue_capacity, 16);
        assert_eq!(settings.websocket.write_timeout(), Duration::from_secs(5));
        assert_eq!(settings.persistence.backend, "memory");
        assert_eq!(settings.identity.header, "x-participant-id");
    }

    #[test]
    fn test_reap_interval_never_zero() {
        let rooms = RoomsConfig {
            idle_grace_secs: 0,
            reap_interval_secs: 0,
        };
        assert_eq!(rooms.reap_interval(), Duration::from_secs(1));
        assert_eq!(rooms.idle_grace(), Duration::ZERO);
    }
}
