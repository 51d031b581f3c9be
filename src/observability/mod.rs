//! Observability: Prometheus metrics context.

pub mod metrics;
