//! Prometheus metrics for the detection pipeline.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Worker pool
    pub const POOL_TASKS_SUBMITTED_TOTAL: &str = "nvr_pool_tasks_submitted_total";
    pub const POOL_TASKS_REJECTED_TOTAL: &str = "nvr_pool_tasks_rejected_total";
    pub const POOL_TASKS_COMPLETED_TOTAL: &str = "nvr_pool_tasks_completed_total";
    pub const POOL_TASKS_FAILED_TOTAL: &str = "nvr_pool_tasks_failed_total";
    pub const POOL_ACTIVE_WORKERS: &str = "nvr_pool_active_workers";

    // Monitors
    pub const SEGMENTS_PROCESSED_TOTAL: &str = "nvr_segments_processed_total";
    pub const DECODE_FAILURES_TOTAL: &str = "nvr_decode_failures_total";
    pub const DECODE_DURATION_SECONDS: &str = "nvr_decode_duration_seconds";
    pub const DETECTIONS_RAW_TOTAL: &str = "nvr_detections_raw_total";
    pub const DETECTIONS_ACCEPTED_TOTAL: &str = "nvr_detections_accepted_total";
    pub const MODEL_LOAD_FAILURES_TOTAL: &str = "nvr_model_load_failures_total";
    pub const TRANSPORT_RESTARTS_TOTAL: &str = "nvr_transport_restarts_total";
    pub const MONITORS_ACTIVE: &str = "nvr_monitors_active";

    // Recording
    pub const RECORDINGS_STARTED_TOTAL: &str = "nvr_recordings_started_total";
    pub const RECORDINGS_COMPLETED_TOTAL: &str = "nvr_recordings_completed_total";
    pub const FILE_ROTATIONS_TOTAL: &str = "nvr_file_rotations_total";
    pub const PREROLL_PACKETS_TOTAL: &str = "nvr_preroll_packets_total";
    pub const RECORDING_STATE: &str = "nvr_recording_state";
    pub const BUFFER_BYTES: &str = "nvr_buffer_bytes";
}

/// Record a pool submission and whether it was accepted.
pub fn record_pool_submission(kind: &str, accepted: bool) {
    let labels = [("kind", kind.to_string())];
    if accepted {
        counter!(names::POOL_TASKS_SUBMITTED_TOTAL, &labels).increment(1);
    } else {
        counter!(names::POOL_TASKS_REJECTED_TOTAL, &labels).increment(1);
    }
}

/// Record a pool task that ran to completion.
pub fn record_pool_task_done(kind: &str, success: bool) {
    let labels = [("kind", kind.to_string())];
    if success {
        counter!(names::POOL_TASKS_COMPLETED_TOTAL, &labels).increment(1);
    } else {
        counter!(names::POOL_TASKS_FAILED_TOTAL, &labels).increment(1);
    }
}

pub fn set_pool_active_workers(active: usize) {
    gauge!(names::POOL_ACTIVE_WORKERS).set(active as f64);
}

pub fn set_monitors_active(count: usize) {
    gauge!(names::MONITORS_ACTIVE).set(count as f64);
}

/// Record a processed segment and how long decode plus detection took.
pub fn record_segment_processed(stream: &str, duration_secs: f64) {
    let labels = [("stream", stream.to_string())];
    counter!(names::SEGMENTS_PROCESSED_TOTAL, &labels).increment(1);
    histogram!(names::DECODE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_decode_failure(stream: &str) {
    let labels = [("stream", stream.to_string())];
    counter!(names::DECODE_FAILURES_TOTAL, &labels).increment(1);
}

/// Record raw detector output against what survived filtering.
pub fn record_detections(stream: &str, raw: usize, accepted: usize) {
    let labels = [("stream", stream.to_string())];
    counter!(names::DETECTIONS_RAW_TOTAL, &labels).increment(raw as u64);
    counter!(names::DETECTIONS_ACCEPTED_TOTAL, &labels).increment(accepted as u64);
}

pub fn record_model_load_failure(stream: &str) {
    let labels = [("stream", stream.to_string())];
    counter!(names::MODEL_LOAD_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_transport_restart(stream: &str) {
    let labels = [("stream", stream.to_string())];
    counter!(names::TRANSPORT_RESTARTS_TOTAL, &labels).increment(1);
}

pub fn record_recording_started(stream: &str, trigger: &str) {
    let labels = [("stream", stream.to_string()), ("trigger", trigger.to_string())];
    counter!(names::RECORDINGS_STARTED_TOTAL, &labels).increment(1);
}

pub fn record_recording_completed(stream: &str) {
    let labels = [("stream", stream.to_string())];
    counter!(names::RECORDINGS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_file_rotation(stream: &str) {
    let labels = [("stream", stream.to_string())];
    counter!(names::FILE_ROTATIONS_TOTAL, &labels).increment(1);
}

pub fn record_preroll_packets(stream: &str, packets: usize) {
    let labels = [("stream", stream.to_string())];
    counter!(names::PREROLL_PACKETS_TOTAL, &labels).increment(packets as u64);
}

pub fn set_recording_state(stream: &str, state: f64) {
    let labels = [("stream", stream.to_string())];
    gauge!(names::RECORDING_STATE, &labels).set(state);
}

pub fn set_buffer_bytes(stream: &str, bytes: usize) {
    let labels = [("stream", stream.to_string())];
    gauge!(names::BUFFER_BYTES, &labels).set(bytes as f64);
}
