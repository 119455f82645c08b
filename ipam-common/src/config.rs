//! Service configuration

use crate::{Capability, DeviceKind, Role};
use serde::{Deserialize, Serialize};

/// Allocation server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Log level
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
    /// Per-request timeout; bounds long generations
    pub request_timeout_secs: u64,
    /// Record store settings
    pub database: DatabaseConfig,
    /// Metrics server configuration
    pub metrics: MetricsConfig,
    /// Address generation policy
    pub generation: GenerationPolicy,
    /// Directory records loaded at startup
    pub seed: SeedConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            request_timeout_secs: 120,
            database: DatabaseConfig::default(),
            metrics: MetricsConfig::default(),
            generation: GenerationPolicy::default(),
            seed: SeedConfig::default(),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    /// Maximum time to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ipam.db".to_string(),
            min_connections: 1,
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,
    /// Metrics endpoint path
    pub metrics_path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// Bounds on which subnets may be enumerated and how
///
/// The IPv6 figures implement the practical-subset policy: only a bounded
/// slice of a v6 block is ever materialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationPolicy {
    /// Rows per write; clamped to [`Self::MIN_BATCH`, `Self::MAX_BATCH`]
    pub batch_size: usize,
    pub ipv4_min_prefix: u8,
    pub ipv4_max_prefix: u8,
    /// Largest IPv4 pool generated eagerly
    pub ipv4_max_hosts: u64,
    pub ipv6_min_prefix: u8,
    pub ipv6_max_prefix: u8,
    /// Addresses generated for blocks longer than /64
    pub ipv6_small_range_cap: u32,
    /// Addresses generated for /64 and larger blocks
    pub ipv6_large_range_subset: u32,
    /// Ceiling on the descriptive IPv6 host count
    pub ipv6_accounting_cap: u64,
}

impl GenerationPolicy {
    pub const MIN_BATCH: usize = 100;
    pub const MAX_BATCH: usize = 500;

    /// Effective batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size.clamp(Self::MIN_BATCH, Self::MAX_BATCH)
    }
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            batch_size: 500,
            ipv4_min_prefix: 16,
            ipv4_max_prefix: 30,
            ipv4_max_hosts: 65_534,
            ipv6_min_prefix: 48,
            ipv6_max_prefix: 120,
            ipv6_small_range_cap: 10_000,
            ipv6_large_range_subset: 1_000,
            ipv6_accounting_cap: 1_000_000,
        }
    }
}

/// Directory records upserted at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub devices: Vec<SeedDevice>,
    pub principals: Vec<SeedPrincipal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedDevice {
    pub id: i64,
    pub name: String,
    pub kind: DeviceKind,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPrincipal {
    pub id: i64,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}
