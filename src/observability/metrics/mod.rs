//! # Sync Metrics
//!
//! Prometheus metrics for token state and sync outcomes.
//!
//! The metrics context is built once at startup against the process-owned
//! registry and handed to the manager explicitly; nothing mutates ambient
//! global state.

use anyhow::Result;
use chrono::Utc;
use prometheus::{Gauge, GaugeVec, IntCounter, Opts, Registry};

use crate::token::BootstrapToken;

/// Metrics recorded by the token manager
#[derive(Debug, Clone)]
pub struct SyncMetrics {
    /// `bootstraptoken_token_info{token_id}` - presence indicator per token id
    token_info: GaugeVec,
    /// `bootstraptoken_token_expiration{token_id}` - Unix seconds, 0 when unset
    token_expiration: GaugeVec,
    /// `bootstraptoken_sync_status` - 1 after a successful cycle, 0 after a failed one
    sync_status: Gauge,
    /// `bootstraptoken_sync_time` - Unix seconds of the last successful cycle
    sync_time: Gauge,
    /// `bootstraptoken_sync_count` - successful cycles since process start
    sync_count: IntCounter,
}

impl SyncMetrics {
    /// Build the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let token_info = GaugeVec::new(
            Opts::new("bootstraptoken_token_info", "bootstrap token info"),
            &["token_id"],
        )?;
        let token_expiration = GaugeVec::new(
            Opts::new(
                "bootstraptoken_token_expiration",
                "bootstrap token expiration time",
            ),
            &["token_id"],
        )?;
        let sync_status = Gauge::new("bootstraptoken_sync_status", "bootstrap token sync status")?;
        let sync_time = Gauge::new("bootstraptoken_sync_time", "last bootstrap token sync time")?;
        let sync_count =
            IntCounter::new("bootstraptoken_sync_count", "bootstrap token sync count")?;

        registry.register(Box::new(token_info.clone()))?;
        registry.register(Box::new(token_expiration.clone()))?;
        registry.register(Box::new(sync_status.clone()))?;
        registry.register(Box::new(sync_time.clone()))?;
        registry.register(Box::new(sync_count.clone()))?;

        Ok(Self {
            token_info,
            token_expiration,
            sync_status,
            sync_time,
            sync_count,
        })
    }

    /// Record a token that has been upserted into the cluster
    pub fn record_token(&self, token: &BootstrapToken) {
        self.token_info.with_label_values(&[token.id()]).set(1.0);
        let expiration = token
            .expiration_time()
            .map_or(0.0, |t| t.timestamp() as f64);
        self.token_expiration
            .with_label_values(&[token.id()])
            .set(expiration);
    }

    pub fn record_sync_success(&self) {
        self.sync_status.set(1.0);
        self.sync_count.inc();
        self.sync_time.set(Utc::now().timestamp() as f64);
    }

    pub fn record_sync_failure(&self) {
        self.sync_status.set(0.0);
    }

    #[cfg(test)]
    fn token_expiration_value(&self, token_id: &str) -> f64 {
        self.token_expiration.with_label_values(&[token_id]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_token_sets_presence_and_expiration() {
        let registry = Registry::new();
        let metrics = SyncMetrics::new(&registry).unwrap();

        let mut token = BootstrapToken::new("250812", "secret");
        let expires = Utc.with_ymd_and_hms(2026, 8, 12, 0, 0, 0).unwrap();
        token.set_expiration_time(expires);
        metrics.record_token(&token);

        assert_eq!(metrics.token_info.with_label_values(&["250812"]).get(), 1.0);
        assert_eq!(
            metrics.token_expiration_value("250812"),
            expires.timestamp() as f64
        );
    }

    #[test]
    fn test_record_token_without_expiration_reports_zero() {
        let registry = Registry::new();
        let metrics = SyncMetrics::new(&registry).unwrap();
        metrics.record_token(&BootstrapToken::new("unexpiring", "secret"));
        assert_eq!(metrics.token_expiration_value("unexpiring"), 0.0);
    }

    #[test]
    fn test_sync_outcomes() {
        let registry = Registry::new();
        let metrics = SyncMetrics::new(&registry).unwrap();

        metrics.record_sync_success();
        assert_eq!(metrics.sync_status.get(), 1.0);
        assert_eq!(metrics.sync_count.get(), 1);
        assert!(metrics.sync_time.get() > 0.0);

        metrics.record_sync_failure();
        assert_eq!(metrics.sync_status.get(), 0.0);
        // counter only moves on success
        assert_eq!(metrics.sync_count.get(), 1);
    }

    #[test]
    fn test_metrics_are_registered() {
        let registry = Registry::new();
        let metrics = SyncMetrics::new(&registry).unwrap();
        metrics.record_sync_success();

        let families = registry.gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"bootstraptoken_sync_status"));
        assert!(names.contains(&"bootstraptoken_sync_count"));
    }
}
