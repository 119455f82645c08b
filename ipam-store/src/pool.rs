//! Connection pooling and schema setup

use crate::Result;
use ipam_common::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Configuration for a connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// sqlx connection URL, e.g. `sqlite://ipam.db`
    pub url: String,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Maximum number of connections to create
    pub max_connections: u32,
    /// Maximum time to wait for a connection
    pub acquire_timeout: Duration,
    /// Maximum idle time for a connection
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ipam.db".to_string(),
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
        }
    }
}

impl PoolConfig {
    /// Single-connection in-memory database; the data lives as long as the pool
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            min_connections: config.min_connections,
            max_connections: config.max_connections.max(1),
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
            ..Default::default()
        }
    }
}

/// Open a connection pool
#[instrument(skip(config), fields(url = %config.url))]
pub async fn connect(config: &PoolConfig) -> Result<SqlitePool> {
    let mut options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let mut pool_options = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);

    if config.is_memory() {
        // Closing the last connection drops an in-memory database
        pool_options = pool_options.max_lifetime(None).idle_timeout(None);
    } else {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = pool_options.connect_with(options).await?;

    info!(
        "Created connection pool with {}-{} connections",
        config.min_connections, config.max_connections
    );

    Ok(pool)
}

/// Create tables and indexes if they do not exist
#[instrument(skip(pool))]
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    debug!("Initializing database schema");

    // Network device inventory (routers own subnets)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            location TEXT
        )",
    )
    .execute(pool)
    .await?;

    // Staff directory: role plus capability tags as a JSON array
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS principals (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL,
            role TEXT NOT NULL,
            capabilities TEXT NOT NULL DEFAULT '[]'
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS subnets (
            id TEXT PRIMARY KEY,
            router_id INTEGER NOT NULL REFERENCES devices(id),
            cidr TEXT NOT NULL,
            version TEXT NOT NULL CHECK(version IN ('IPv4', 'IPv6')),
            name TEXT,
            description TEXT,
            subnet_type TEXT NOT NULL,
            allocation_mode TEXT NOT NULL,
            gateway_ip TEXT,
            estimated_ips INTEGER NOT NULL DEFAULT 0,
            total_ips INTEGER NOT NULL DEFAULT 0,
            used_ips INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (router_id, cidr)
        )",
    )
    .execute(pool)
    .await?;

    // (ip_address, subnet_id) uniqueness makes repeated inserts collapse
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ip_addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subnet_id TEXT NOT NULL REFERENCES subnets(id) ON DELETE CASCADE,
            ip_address TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'available'
                CHECK(status IN ('available', 'assigned', 'reserved')),
            version TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (ip_address, subnet_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ip_addresses_subnet_status
            ON ip_addresses(subnet_id, status)",
    )
    .execute(pool)
    .await?;

    // Append-only audit trail
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS audit_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            actor_id INTEGER,
            action TEXT NOT NULL,
            resource_id TEXT,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_audit_events_resource
            ON audit_events(resource_id)",
    )
    .execute(pool)
    .await?;

    info!("Database schema initialized successfully");
    Ok(())
}
