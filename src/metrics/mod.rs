//! Metrics module
//!
//! Prometheus metrics for the direct upload handshake.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, CounterVec, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // Handshake metrics
    pub static ref PRESIGN_TOTAL: IntCounterVec = register_int_counter_vec!(
        "direct_upload_presign_total",
        "Presigned upload URLs requested",
        &["file_type", "status"]
    ).unwrap();

    pub static ref CONFIRM_TOTAL: IntCounterVec = register_int_counter_vec!(
        "direct_upload_confirm_total",
        "Upload confirmations",
        &["status"]
    ).unwrap();

    pub static ref CANCEL_TOTAL: IntCounterVec = register_int_counter_vec!(
        "direct_upload_cancel_total",
        "Upload cancellations",
        &["status"]
    ).unwrap();

    pub static ref CONFIRMED_BYTES_TOTAL: CounterVec = register_counter_vec!(
        "direct_upload_confirmed_bytes_total",
        "Bytes confirmed as uploaded",
        &["file_type"]
    ).unwrap();

    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "direct_upload_operation_duration_seconds",
        "Handshake operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Session metrics
    pub static ref PENDING_SESSIONS: IntGauge = register_int_gauge!(
        "direct_upload_pending_sessions",
        "Pending upload sessions as of the last sweep"
    ).unwrap();

    pub static ref SESSIONS_EXPIRED_TOTAL: IntCounter = register_int_counter!(
        "direct_upload_sessions_expired_total",
        "Pending sessions expired by the sweeper"
    ).unwrap();

    pub static ref SESSIONS_EVICTED_TOTAL: IntCounter = register_int_counter!(
        "direct_upload_sessions_evicted_total",
        "Terminal sessions evicted after retention"
    ).unwrap();

    // Auth metrics
    pub static ref AUTH_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "direct_upload_auth_attempts_total",
        "Authentication attempts",
        &["method", "status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "direct_upload_errors_total",
        "Errors by class",
        &["class"]
    ).unwrap();
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a presign attempt
pub fn record_presign(file_type: &str, success: bool) {
    PRESIGN_TOTAL
        .with_label_values(&[file_type, status_label(success)])
        .inc();
}

/// Record a confirmation attempt
pub fn record_confirm(success: bool) {
    CONFIRM_TOTAL.with_label_values(&[status_label(success)]).inc();
}

/// Record bytes of a confirmed upload
pub fn record_confirmed_bytes(file_type: &str, bytes: u64) {
    CONFIRMED_BYTES_TOTAL
        .with_label_values(&[file_type])
        .inc_by(bytes as f64);
}

/// Record a cancellation attempt
pub fn record_cancel(success: bool) {
    CANCEL_TOTAL.with_label_values(&[status_label(success)]).inc();
}

/// Record sweeper results
pub fn record_sweep(expired: usize, evicted: usize, pending: usize) {
    SESSIONS_EXPIRED_TOTAL.inc_by(expired as u64);
    SESSIONS_EVICTED_TOTAL.inc_by(evicted as u64);
    PENDING_SESSIONS.set(pending as i64);
}

/// Record operation duration
pub fn record_operation_duration(operation: &str, duration_secs: f64) {
    OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record authentication attempt
pub fn record_auth_attempt(method: &str, success: bool) {
    AUTH_ATTEMPTS
        .with_label_values(&[method, status_label(success)])
        .inc();
}

/// Record an error by class
pub fn record_error(class: &str) {
    ERRORS_TOTAL.with_label_values(&[class]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_presign_counts_by_status() {
        let before = PRESIGN_TOTAL.with_label_values(&["image", "failure"]).get();
        record_presign("image", false);
        let after = PRESIGN_TOTAL.with_label_values(&["image", "failure"]).get();
        assert!(after > before);
    }

    #[test]
    fn test_record_confirmed_bytes() {
        record_confirmed_bytes("video", 1024);
        assert!(CONFIRMED_BYTES_TOTAL.with_label_values(&["video"]).get() >= 1024.0);
    }

    #[test]
    fn test_record_sweep() {
        let before = SESSIONS_EVICTED_TOTAL.get();
        record_sweep(0, 3, 7);
        assert!(SESSIONS_EVICTED_TOTAL.get() >= before + 3);
    }

    #[test]
    fn test_record_error() {
        record_error("ValidationError");
        assert!(ERRORS_TOTAL.with_label_values(&["ValidationError"]).get() >= 1);
    }
}
