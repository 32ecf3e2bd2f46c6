//! Durable message storage the fan-out layer publishes after.
//!
//! Backends:
//! - `memory`: process-local store, for development and tests
//! - `postgres`: `users` + `direct_message` tables

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;

pub use backend::{MessageStore, StoreError};
pub use factory::create_message_store;
pub use memory_backend::MemoryMessageStore;
pub use postgres_backend::PostgresMessageStore;
