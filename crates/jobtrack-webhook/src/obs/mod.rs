//! Lightweight in-process metrics.
//!
//! Stored as atomics and rendered in Prometheus text format by the `/metrics`
//! handler.

pub mod metrics;

pub use metrics::WebhookMetrics;
