//! Metrics definitions for the Stream Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix for Stream Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `phase`: 6 values (idle, starting, connecting, reconnecting, streaming, error)
//! - `outcome`: 3 values (success, failure, abandoned)
//! - `target`: 4 source kinds
//! - `reason`: 3 ingest disconnect reasons
//! - `class`: 6 error classes

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle.
///
/// Must be called before any metrics are recorded if the host wants them
/// exported. Connect durations span whole open/start sequences, so buckets
/// reach up to the slowest bounded engine call.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("sc_connect_duration".to_string()),
            &[
                0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 20.000,
            ],
        )
        .map_err(|e| format!("Failed to set connect duration buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("sc_relay_ready".to_string()),
            &[0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set relay ready buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Record a phase transition.
///
/// Metric: `sc_phase_transitions_total`
/// Labels: `phase`
pub fn record_phase_transition(phase: &'static str) {
    counter!("sc_phase_transitions_total", "phase" => phase).increment(1);
}

/// Set whether the session is currently streaming.
///
/// Metric: `sc_streaming`
/// Labels: none
pub fn set_streaming(streaming: bool) {
    gauge!("sc_streaming").set(if streaming { 1.0 } else { 0.0 });
}

/// Record the time from `open` to the engine reporting streaming.
///
/// Metric: `sc_connect_duration_seconds`
/// Labels: `kind` (initial, retry)
pub fn record_connect_duration(is_retry: bool, duration: Duration) {
    let kind = if is_retry { "retry" } else { "initial" };
    histogram!("sc_connect_duration_seconds", "kind" => kind).record(duration.as_secs_f64());
}

// ============================================================================
// Reconnection Metrics
// ============================================================================

/// Record a reconnect attempt being executed (not merely scheduled).
///
/// Metric: `sc_reconnect_attempts_total`
/// Labels: none
pub fn record_reconnect_attempt() {
    counter!("sc_reconnect_attempts_total").increment(1);
}

/// Record how a reconnect attempt ended.
///
/// Metric: `sc_reconnect_outcomes_total`
/// Labels: `outcome` (success, failure, abandoned)
pub fn record_reconnect_outcome(outcome: &'static str) {
    counter!("sc_reconnect_outcomes_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Source Metrics
// ============================================================================

/// Record a video source switch.
///
/// Metric: `sc_source_switches_total`
/// Labels: `target` (capture, relay, external_device, placeholder), `status`
/// (success, pending, denied, failed)
pub fn record_source_switch(target: &'static str, status: &'static str) {
    counter!("sc_source_switches_total", "target" => target, "status" => status).increment(1);
}

/// Record how long a relay playback session took to become ready.
///
/// Metric: `sc_relay_ready_seconds`
pub fn record_relay_ready(duration: Duration) {
    histogram!("sc_relay_ready_seconds").record(duration.as_secs_f64());
}

/// Record an ingest disconnect detected by the health monitor.
///
/// Metric: `sc_ingest_disconnects_total`
/// Labels: `reason` (ended, idle, buffering)
pub fn record_ingest_disconnect(reason: &'static str) {
    counter!("sc_ingest_disconnects_total", "reason" => reason).increment(1);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record a failure by class and whether it was surfaced to the host.
///
/// Metric: `sc_errors_total`
/// Labels: `class`, `surfaced` (true, false)
pub fn record_error(class: &'static str, surfaced: bool) {
    counter!("sc_errors_total",
        "class" => class,
        "surfaced" => if surfaced { "true" } else { "false" }
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_phase_transition("idle");
        set_streaming(true);
        record_connect_duration(false, Duration::from_millis(800));
        record_reconnect_attempt();
        record_reconnect_outcome("success");
        record_source_switch("relay", "success");
        record_relay_ready(Duration::from_secs(1));
        record_ingest_disconnect("buffering");
        record_error("transient", false);
    }

    #[test]
    fn test_metrics_are_captured_by_debugging_recorder() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_phase_transition("streaming");
            record_reconnect_attempt();
            record_reconnect_attempt();
            record_reconnect_outcome("failure");
            record_ingest_disconnect("buffering");
            record_connect_duration(true, Duration::from_millis(1500));
            set_streaming(true);
        });

        let metrics = snapshotter.snapshot().into_vec();
        assert!(metrics.len() >= 6, "got {} metrics", metrics.len());

        let attempts = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "sc_reconnect_attempts_total")
            .map(|(_, _, _, value)| value.clone());
        assert_eq!(attempts, Some(DebugValue::Counter(2)).as_ref());

        let disconnect_labels: Vec<String> = metrics
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == "sc_ingest_disconnects_total")
            .flat_map(|(key, _, _, _)| {
                key.key()
                    .labels()
                    .map(|l| format!("{}={}", l.key(), l.value()))
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(disconnect_labels, vec!["reason=buffering".to_string()]);
    }
}
