// Core fan-out engine
pub mod fanout;

// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod persistence;

// Application layer
pub mod api;
pub mod identity;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
