//! Prometheus metrics for the direct message service.
//!
//! - Room and subscriber gauges
//! - Publish / delivery / slow-consumer counters
//! - Serving loop exits by reason
//! - WebSocket connection lifecycle

mod helpers;

pub use helpers::{encode_metrics, FanoutMetrics, StoreMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "pairwire";

lazy_static! {
    // ============================================================================
    // Room Metrics
    // ============================================================================

    /// Rooms currently held by the registry
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of conversation rooms held by the registry"
    ).unwrap();

    /// Rooms evicted after being idle
    pub static ref ROOMS_REAPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_rooms_reaped_total", METRIC_PREFIX),
        "Total rooms evicted after their idle grace period"
    ).unwrap();

    /// Live subscribers across all rooms (refreshed on scrape)
    pub static ref SUBSCRIBERS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_subscribers_active", METRIC_PREFIX),
        "Number of registered live subscribers"
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Broadcasts performed over a room
    pub static ref PUBLISHES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_publishes_total", METRIC_PREFIX),
        "Total room broadcasts"
    ).unwrap();

    /// Frames queued to subscribers
    pub static ref FRAMES_QUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_queued_total", METRIC_PREFIX),
        "Total frames queued onto subscriber queues"
    ).unwrap();

    /// Frames written to transports
    pub static ref FRAMES_WRITTEN_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_written_total", METRIC_PREFIX),
        "Total frames written to subscriber transports"
    ).unwrap();

    /// Subscribers disconnected for a full queue
    pub static ref SLOW_CONSUMER_DISCONNECTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_slow_consumer_disconnects_total", METRIC_PREFIX),
        "Total subscribers disconnected because their queue was full"
    ).unwrap();

    /// Serving loop exits by close reason
    pub static ref SERVE_EXITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_serve_exits_total", METRIC_PREFIX),
        "Total serving loop exits",
        &["reason"]
    ).unwrap();

    /// Messages durably stored
    pub static ref MESSAGES_STORED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_stored_total", METRIC_PREFIX),
        "Total messages written to the message store"
    ).unwrap();

    /// Message store failures
    pub static ref STORE_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_store_errors_total", METRIC_PREFIX),
        "Total message store operation failures"
    ).unwrap();

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    /// WebSocket connections opened
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// WebSocket connections closed
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// WebSocket connection duration
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();
}
