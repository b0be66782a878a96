//! Observability module for the Stream Controller.
//!
//! # Privacy by Default
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicit safe
//! fields. Endpoint URLs, relay URLs and capture tokens are `SecretString`
//! values and never appear in spans, events or metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sc_phase_transitions_total` | Counter | `phase` | Session phase changes |
//! | `sc_streaming` | Gauge | none | 1 while the session is live |
//! | `sc_connect_duration_seconds` | Histogram | `kind` | Open-to-streaming latency |
//! | `sc_reconnect_attempts_total` | Counter | none | Executed reconnect attempts |
//! | `sc_reconnect_outcomes_total` | Counter | `outcome` | Reconnect results |
//! | `sc_source_switches_total` | Counter | `target`, `status` | Video source switches |
//! | `sc_relay_ready_seconds` | Histogram | none | Relay prepare-to-ready latency |
//! | `sc_ingest_disconnects_total` | Counter | `reason` | Relay ingest disconnects |
//! | `sc_errors_total` | Counter | `class`, `surfaced` | Classified failures |

pub mod metrics;

pub use metrics::init_metrics_recorder;
