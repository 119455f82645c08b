//! Service metrics and the Prometheus recorder

use anyhow::{Context, Result};
use ipam_common::MetricsConfig;
use metrics::{counter, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Counters for the generation pipeline
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    prefix: String,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new("ipam_server")
    }
}

impl ServiceMetrics {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn generation_started(&self, regenerate: bool) {
        counter!(format!("{}_generations_started_total", self.prefix)).increment(1);
        if regenerate {
            counter!(format!("{}_regenerations_total", self.prefix)).increment(1);
        }
    }

    pub fn generation_completed(&self, addresses: i64) {
        counter!(format!("{}_generations_completed_total", self.prefix)).increment(1);
        histogram!(format!("{}_generated_addresses", self.prefix)).record(addresses as f64);
    }

    pub fn generation_failed(&self) {
        counter!(format!("{}_generations_failed_total", self.prefix)).increment(1);
    }

    pub fn authorization_denied(&self, reason: &'static str) {
        counter!(
            format!("{}_authorization_denials_total", self.prefix),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn subnet_created(&self, version: &'static str) {
        counter!(
            format!("{}_subnets_created_total", self.prefix),
            "version" => version
        )
        .increment(1);
    }

    /// Register metric descriptions with the installed recorder
    pub fn describe(&self) {
        metrics::describe_counter!(
            format!("{}_generations_started_total", self.prefix),
            "Address pool generations started"
        );
        metrics::describe_counter!(
            format!("{}_authorization_denials_total", self.prefix),
            "Generation requests rejected by the authorization gate"
        );
        metrics::describe_histogram!(
            format!("{}_generated_addresses", self.prefix),
            Unit::Count,
            "Pool size after a successful generation"
        );
    }
}

/// Install the global Prometheus recorder when metrics are enabled
pub fn install_recorder(config: &MetricsConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Prometheus metrics exposed at {}", config.metrics_path);
    Ok(Some(handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_install_nothing() {
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        assert!(install_recorder(&config).unwrap().is_none());
    }

    #[test]
    fn test_recording_without_recorder() {
        let metrics = ServiceMetrics::default();
        metrics.generation_started(true);
        metrics.generation_completed(254);
        metrics.generation_failed();
        metrics.authorization_denied("missing_privilege");
    }
}
