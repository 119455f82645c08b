//! Batch persistence of generated address pools

use async_trait::async_trait;
use ipam_common::{AddressPlan, IpVersion, IpamError, Result};
use ipam_store::Store;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// Destination for address batches
///
/// Writes must be idempotent: addresses already present for the subnet are
/// skipped, and the return value counts only newly inserted rows.
#[async_trait]
pub trait AddressSink: Send + Sync + fmt::Debug {
    async fn write_batch(
        &self,
        subnet_id: Uuid,
        version: IpVersion,
        addresses: &[String],
    ) -> ipam_store::Result<u64>;

    /// Drop the subnet's whole pool, returning the rows removed
    async fn clear(&self, subnet_id: Uuid) -> ipam_store::Result<u64>;
}

#[async_trait]
impl AddressSink for Store {
    async fn write_batch(
        &self,
        subnet_id: Uuid,
        version: IpVersion,
        addresses: &[String],
    ) -> ipam_store::Result<u64> {
        self.insert_addresses(subnet_id, version, addresses).await
    }

    async fn clear(&self, subnet_id: Uuid) -> ipam_store::Result<u64> {
        self.delete_addresses(subnet_id).await
    }
}

/// Running totals of one pool write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Addresses handed to the sink in committed batches
    pub written: u64,
    /// Rows the sink reported as new
    pub inserted: u64,
    pub batches: u32,
}

/// Writes an [`AddressPlan`] in bounded chunks
pub struct BatchWriter<'a> {
    sink: &'a dyn AddressSink,
    batch_size: usize,
}

impl<'a> BatchWriter<'a> {
    pub fn new(sink: &'a dyn AddressSink, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Persist every planned address, calling `on_batch` after each commit
    ///
    /// Committed batches are kept when a later one fails; the error reports
    /// how far the write got so the caller can retry or regenerate.
    #[instrument(skip(self, plan, on_batch), fields(cidr = %plan.block()))]
    pub async fn write<F>(
        &self,
        subnet_id: Uuid,
        plan: &AddressPlan,
        total: u64,
        mut on_batch: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(&BatchReport) + Send,
    {
        let started = Instant::now();
        let version = plan.block().version();
        let mut report = BatchReport::default();
        let mut chunk = Vec::with_capacity(self.batch_size);
        let mut addresses = plan.iter();

        loop {
            chunk.clear();
            chunk.extend(addresses.by_ref().take(self.batch_size).map(|ip| ip.to_string()));
            if chunk.is_empty() {
                break;
            }

            match self.sink.write_batch(subnet_id, version, &chunk).await {
                Ok(inserted) => {
                    report.written += chunk.len() as u64;
                    report.inserted += inserted;
                    report.batches += 1;
                    debug!(
                        batch = report.batches,
                        written = report.written,
                        total,
                        "Batch committed"
                    );
                    on_batch(&report);
                }
                Err(e) => {
                    error!(
                        batch = report.batches + 1,
                        written = report.written,
                        recoverable = e.is_recoverable(),
                        error = %e,
                        "Batch write failed"
                    );
                    return Err(IpamError::PartialFailure {
                        attempted: total,
                        inserted: report.inserted,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            batches = report.batches,
            inserted = report.inserted,
            duration_ms = started.elapsed().as_millis() as u64,
            "Pool write finished"
        );
        Ok(report)
    }
}
