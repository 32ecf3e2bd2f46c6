//! Message store factory

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use crate::config::PersistenceConfig;

use super::backend::{MessageStore, StoreError};
use super::memory_backend::MemoryMessageStore;
use super::postgres_backend::PostgresMessageStore;

/// Create a message store based on configuration.
///
/// - `"postgres"`: connects to `database_url` and prepares the schema; falls
///   back to memory when no URL is configured
/// - `"memory"` (default): a process-local store
pub async fn create_message_store(
    config: &PersistenceConfig,
) -> Result<Arc<dyn MessageStore>, StoreError> {
    match config.backend.as_str() {
        "postgres" => {
            let Some(url) = config.database_url.as_deref() else {
                tracing::warn!(
                    "PostgreSQL backend requested but no database_url configured, falling back to memory"
                );
                return Ok(memory_store(config));
            };

            let pool = PgPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await?;

            tracing::info!(
                backend = "postgres",
                pool_size = config.pool_size,
                "Creating PostgreSQL message store"
            );

            let store = PostgresMessageStore::new(pool);
            store.init_schema().await?;
            Ok(Arc::new(store))
        }
        _ => Ok(memory_store(config)),
    }
}

fn memory_store(config: &PersistenceConfig) -> Arc<dyn MessageStore> {
    tracing::info!(
        backend = "memory",
        auto_register_users = config.auto_register_users,
        "Creating memory message store"
    );
    if config.auto_register_users {
        Arc::new(MemoryMessageStore::with_auto_register())
    } else {
        Arc::new(MemoryMessageStore::new())
    }
}
