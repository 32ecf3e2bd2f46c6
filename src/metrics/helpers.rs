//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::fanout::PublishReport;

use super::{
    FRAMES_QUEUED_TOTAL, FRAMES_WRITTEN_TOTAL, MESSAGES_STORED_TOTAL, PUBLISHES_TOTAL,
    ROOMS_REAPED_TOTAL, SERVE_EXITS_TOTAL, SLOW_CONSUMER_DISCONNECTS_TOTAL, STORE_ERRORS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording fan-out metrics
pub struct FanoutMetrics;

impl FanoutMetrics {
    /// Record the outcome of one room broadcast
    pub fn record_publish(report: &PublishReport) {
        PUBLISHES_TOTAL.inc();
        FRAMES_QUEUED_TOTAL.inc_by(report.delivered as u64);
        if report.disconnected > 0 {
            SLOW_CONSUMER_DISCONNECTS_TOTAL.inc_by(report.disconnected as u64);
        }
    }

    /// Record a frame written to a transport
    pub fn record_frame_written() {
        FRAMES_WRITTEN_TOTAL.inc();
    }

    /// Record a serving loop exit
    pub fn record_serve_exit(reason: &str) {
        SERVE_EXITS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record rooms evicted by the reaper
    pub fn record_rooms_reaped(count: u64) {
        ROOMS_REAPED_TOTAL.inc_by(count);
    }
}

/// Helper struct for recording message store metrics
pub struct StoreMetrics;

impl StoreMetrics {
    pub fn record_stored() {
        MESSAGES_STORED_TOTAL.inc();
    }

    pub fn record_error() {
        STORE_ERRORS_TOTAL.inc();
    }
}
