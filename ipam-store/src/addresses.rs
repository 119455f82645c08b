//! Generated address pools

use crate::subnets::{parse_column, parse_uuid};
use crate::{Result, Store};
use chrono::Utc;
use ipam_common::{AddressStatus, IpAddressRecord, IpVersion};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use tracing::{debug, instrument};
use uuid::Uuid;

impl Store {
    /// Insert one batch of pool addresses as `available`
    ///
    /// Addresses already present for the subnet are skipped, so replaying a
    /// batch is harmless. Returns the number of rows actually inserted.
    #[instrument(skip(self, addresses), fields(batch = addresses.len()))]
    pub async fn insert_addresses(
        &self,
        subnet_id: Uuid,
        version: IpVersion,
        addresses: &[String],
    ) -> Result<u64> {
        if addresses.is_empty() {
            return Ok(0);
        }

        let subnet_id = subnet_id.to_string();
        let created_at = Utc::now();

        let inserted = self
            .timed("insert_addresses", async {
                let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                    "INSERT OR IGNORE INTO ip_addresses (subnet_id, ip_address, status, version, created_at) ",
                );
                builder.push_values(addresses, |mut row, address| {
                    row.push_bind(&subnet_id)
                        .push_bind(address)
                        .push_bind(AddressStatus::Available.as_str())
                        .push_bind(version.as_str())
                        .push_bind(created_at);
                });

                let result = builder.build().execute(&self.pool).await?;
                Ok(result.rows_affected())
            })
            .await?;

        self.metrics.batch_written(addresses.len(), inserted);
        debug!(attempted = addresses.len(), inserted, "Address batch written");
        Ok(inserted)
    }

    /// Number of pool rows for a subnet
    #[instrument(skip(self))]
    pub async fn count_addresses(&self, subnet_id: Uuid) -> Result<i64> {
        self.timed("count_addresses", async {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM ip_addresses WHERE subnet_id = ?")
                    .bind(subnet_id.to_string())
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count)
        })
        .await
    }

    /// Number of pool rows for a subnet in the given state
    #[instrument(skip(self))]
    pub async fn count_addresses_with_status(
        &self,
        subnet_id: Uuid,
        status: AddressStatus,
    ) -> Result<i64> {
        self.timed("count_addresses_with_status", async {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM ip_addresses WHERE subnet_id = ? AND status = ?",
            )
            .bind(subnet_id.to_string())
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        })
        .await
    }

    /// Remove every pool row of a subnet, returning how many were deleted
    #[instrument(skip(self))]
    pub async fn delete_addresses(&self, subnet_id: Uuid) -> Result<u64> {
        self.timed("delete_addresses", async {
            let result = sqlx::query("DELETE FROM ip_addresses WHERE subnet_id = ?")
                .bind(subnet_id.to_string())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    /// One page of a subnet's pool in insertion order
    #[instrument(skip(self))]
    pub async fn list_addresses(
        &self,
        subnet_id: Uuid,
        status: Option<AddressStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<IpAddressRecord>> {
        let records = self
            .timed("list_addresses", async {
                let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                    "SELECT subnet_id, ip_address, status, version, created_at
                     FROM ip_addresses WHERE subnet_id = ",
                );
                builder.push_bind(subnet_id.to_string());
                if let Some(status) = status {
                    builder.push(" AND status = ").push_bind(status.as_str());
                }
                builder
                    .push(" ORDER BY id LIMIT ")
                    .push_bind(i64::from(limit))
                    .push(" OFFSET ")
                    .push_bind(i64::from(offset));

                let rows = builder.build().fetch_all(&self.pool).await?;
                rows.iter().map(address_from_row).collect::<Result<Vec<_>>>()
            })
            .await?;

        self.metrics.query_rows_returned(records.len());
        Ok(records)
    }

    /// Change the state of one pool address
    ///
    /// Returns `false` if the address is not in the subnet's pool.
    #[instrument(skip(self))]
    pub async fn set_address_status(
        &self,
        subnet_id: Uuid,
        ip_address: &str,
        status: AddressStatus,
    ) -> Result<bool> {
        self.timed("set_address_status", async {
            let result = sqlx::query(
                "UPDATE ip_addresses SET status = ? WHERE subnet_id = ? AND ip_address = ?",
            )
            .bind(status.as_str())
            .bind(subnet_id.to_string())
            .bind(ip_address)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}

fn address_from_row(row: &SqliteRow) -> Result<IpAddressRecord> {
    let subnet_id: String = row.try_get("subnet_id")?;

    Ok(IpAddressRecord {
        ip_address: row.try_get("ip_address")?,
        subnet_id: parse_uuid("subnet_id", &subnet_id)?,
        status: parse_column(row, "status")?,
        version: parse_column(row, "version")?,
        created_at: row.try_get("created_at")?,
    })
}
