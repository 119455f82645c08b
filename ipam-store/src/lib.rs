//! # IPAM record store
//!
//! Relational persistence for the allocation service: subnets, their address
//! pools, the append-only audit trail, and the device and staff directories
//! the service consults.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ipam_store::{PoolConfig, Result, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let store = Store::connect(&PoolConfig::default()).await?;
//!
//!     for subnet in store.list_subnets(Some(5)).await? {
//!         println!("{} ({})", subnet.cidr, subnet.version);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use sqlx::SqlitePool;
use std::future::Future;
use std::time::Instant;

pub use error::{Error, Result};
pub use crate::metrics::StoreMetrics;
pub use pool::PoolConfig;

mod addresses;
mod audit;
mod directory;
mod error;
mod metrics;
mod pool;
mod subnets;

/// Handle to the record store; cheap to clone
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    metrics: StoreMetrics,
}

impl Store {
    /// Connect and make sure the schema exists
    pub async fn connect(config: &PoolConfig) -> Result<Self> {
        let pool = pool::connect(config).await?;
        pool::initialize_schema(&pool).await?;

        Ok(Self {
            pool,
            metrics: StoreMetrics::default(),
        })
    }

    /// Fresh in-memory store, mainly for tests
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&PoolConfig::in_memory()).await
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store metrics collector
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run `operation`, recording its latency and outcome
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = fut.await;
        self.metrics
            .query_executed(operation, started.elapsed(), result.is_ok());
        result
    }
}
