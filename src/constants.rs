//! Process-wide constants.

/// Attempt budget for the cluster upsert retry loop
pub const UPSERT_RETRY_ATTEMPTS: usize = 5;

/// Default bind address of the health/metrics HTTP server
pub const DEFAULT_SERVER_BIND: &str = "0.0.0.0:8080";
