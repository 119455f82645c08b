//! Subnet registry records

use crate::{Error, Result, Store};
use chrono::{DateTime, Utc};
use ipam_common::Subnet;
use sqlx::{sqlite::SqliteRow, Row};
use std::str::FromStr;
use tracing::instrument;
use uuid::Uuid;

const SUBNET_COLUMNS: &str = "id, router_id, cidr, version, name, description, subnet_type, \
     allocation_mode, gateway_ip, estimated_ips, total_ips, used_ips, status, created_at, updated_at";

impl Store {
    /// Insert a new subnet; `Error::Conflict` if the router already has the CIDR
    #[instrument(skip(self, subnet), fields(subnet_id = %subnet.id, cidr = %subnet.cidr))]
    pub async fn insert_subnet(&self, subnet: &Subnet) -> Result<()> {
        self.timed("insert_subnet", async {
            sqlx::query(&format!(
                "INSERT INTO subnets ({SUBNET_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(subnet.id.to_string())
            .bind(subnet.router_id)
            .bind(&subnet.cidr)
            .bind(subnet.version.as_str())
            .bind(&subnet.name)
            .bind(&subnet.description)
            .bind(subnet.subnet_type.as_str())
            .bind(subnet.allocation_mode.as_str())
            .bind(&subnet.gateway_ip)
            .bind(subnet.estimated_ips)
            .bind(subnet.total_ips)
            .bind(subnet.used_ips)
            .bind(subnet.status.as_str())
            .bind(subnet.created_at)
            .bind(subnet.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Fetch a subnet by id
    #[instrument(skip(self))]
    pub async fn get_subnet(&self, id: Uuid) -> Result<Option<Subnet>> {
        self.timed("get_subnet", async {
            let row = sqlx::query(&format!("SELECT {SUBNET_COLUMNS} FROM subnets WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

            row.as_ref().map(subnet_from_row).transpose()
        })
        .await
    }

    /// Find the subnet registered for `cidr` on a router
    #[instrument(skip(self))]
    pub async fn find_subnet_by_cidr(&self, router_id: i64, cidr: &str) -> Result<Option<Subnet>> {
        self.timed("find_subnet_by_cidr", async {
            let row = sqlx::query(&format!(
                "SELECT {SUBNET_COLUMNS} FROM subnets WHERE router_id = ? AND cidr = ?"
            ))
            .bind(router_id)
            .bind(cidr)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(subnet_from_row).transpose()
        })
        .await
    }

    /// All subnets, optionally restricted to one router, oldest first
    #[instrument(skip(self))]
    pub async fn list_subnets(&self, router_id: Option<i64>) -> Result<Vec<Subnet>> {
        let subnets = self
            .timed("list_subnets", async {
                let rows = match router_id {
                    Some(router_id) => {
                        sqlx::query(&format!(
                            "SELECT {SUBNET_COLUMNS} FROM subnets WHERE router_id = ?
                             ORDER BY created_at, cidr"
                        ))
                        .bind(router_id)
                        .fetch_all(&self.pool)
                        .await?
                    }
                    None => {
                        sqlx::query(&format!(
                            "SELECT {SUBNET_COLUMNS} FROM subnets ORDER BY created_at, cidr"
                        ))
                        .fetch_all(&self.pool)
                        .await?
                    }
                };

                rows.iter().map(subnet_from_row).collect::<Result<Vec<_>>>()
            })
            .await?;

        self.metrics.query_rows_returned(subnets.len());
        Ok(subnets)
    }

    /// Persist the mutable descriptive fields of a subnet
    ///
    /// Returns `false` if the subnet no longer exists.
    #[instrument(skip(self, subnet), fields(subnet_id = %subnet.id))]
    pub async fn update_subnet(&self, subnet: &Subnet) -> Result<bool> {
        self.timed("update_subnet", async {
            let result = sqlx::query(
                "UPDATE subnets SET
                    name = ?, description = ?, subnet_type = ?, allocation_mode = ?,
                    gateway_ip = ?, status = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&subnet.name)
            .bind(&subnet.description)
            .bind(subnet.subnet_type.as_str())
            .bind(subnet.allocation_mode.as_str())
            .bind(&subnet.gateway_ip)
            .bind(subnet.status.as_str())
            .bind(subnet.updated_at)
            .bind(subnet.id.to_string())
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Record the outcome of a successful generation run
    #[instrument(skip(self))]
    pub async fn record_generation(&self, id: Uuid, total_ips: i64) -> Result<()> {
        self.timed("record_generation", async {
            sqlx::query(
                "UPDATE subnets SET total_ips = ?, used_ips = 0, updated_at = ? WHERE id = ?",
            )
            .bind(total_ips)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}

pub(crate) fn parse_uuid(column: &'static str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::decode(column, e.to_string()))
}

pub(crate) fn parse_column<T>(row: &SqliteRow, column: &'static str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| Error::decode(column, e.to_string()))
}

fn subnet_from_row(row: &SqliteRow) -> Result<Subnet> {
    let id: String = row.try_get("id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Subnet {
        id: parse_uuid("id", &id)?,
        cidr: row.try_get("cidr")?,
        version: parse_column(row, "version")?,
        router_id: row.try_get("router_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        subnet_type: parse_column(row, "subnet_type")?,
        allocation_mode: parse_column(row, "allocation_mode")?,
        gateway_ip: row.try_get("gateway_ip")?,
        estimated_ips: row.try_get("estimated_ips")?,
        total_ips: row.try_get("total_ips")?,
        used_ips: row.try_get("used_ips")?,
        status: parse_column(row, "status")?,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ipam_common::{
        AllocationMode, Device, DeviceKind, IpVersion, SubnetStatus, SubnetType,
    };

    pub(crate) async fn store_with_router(router_id: i64) -> Store {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_device(&Device {
                id: router_id,
                name: format!("rtr-{router_id}"),
                kind: DeviceKind::Router,
                location: None,
            })
            .await
            .unwrap();
        store
    }

    pub(crate) fn subnet(router_id: i64, cidr: &str) -> Subnet {
        let now = Utc::now();
        Subnet {
            id: Uuid::new_v4(),
            cidr: cidr.to_string(),
            version: if cidr.contains(':') {
                IpVersion::V6
            } else {
                IpVersion::V4
            },
            router_id,
            name: Some("access".to_string()),
            description: None,
            subnet_type: SubnetType::Private,
            allocation_mode: AllocationMode::Dynamic,
            gateway_ip: None,
            estimated_ips: 254,
            total_ips: 0,
            used_ips: 0,
            status: SubnetStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = store_with_router(5).await;
        let record = subnet(5, "10.0.0.0/24");
        store.insert_subnet(&record).await.unwrap();

        let loaded = store.get_subnet(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.cidr, "10.0.0.0/24");
        assert_eq!(loaded.version, IpVersion::V4);
        assert!(store.get_subnet(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_cidr_is_conflict() {
        let store = store_with_router(5).await;
        store.insert_subnet(&subnet(5, "10.0.0.0/24")).await.unwrap();

        let err = store
            .insert_subnet(&subnet(5, "10.0.0.0/24"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let found = store.find_subnet_by_cidr(5, "10.0.0.0/24").await.unwrap();
        assert!(found.is_some());
        assert!(store.find_subnet_by_cidr(6, "10.0.0.0/24").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_router() {
        let store = store_with_router(5).await;
        store
            .upsert_device(&Device {
                id: 6,
                name: "rtr-6".to_string(),
                kind: DeviceKind::EdgeRouter,
                location: None,
            })
            .await
            .unwrap();

        store.insert_subnet(&subnet(5, "10.0.0.0/24")).await.unwrap();
        store.insert_subnet(&subnet(5, "10.0.1.0/24")).await.unwrap();
        store.insert_subnet(&subnet(6, "10.0.0.0/24")).await.unwrap();

        assert_eq!(store.list_subnets(None).await.unwrap().len(), 3);
        assert_eq!(store.list_subnets(Some(5)).await.unwrap().len(), 2);
        assert!(store.list_subnets(Some(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_record_generation() {
        let store = store_with_router(5).await;
        let mut record = subnet(5, "10.0.0.0/24");
        store.insert_subnet(&record).await.unwrap();

        record.gateway_ip = Some("10.0.0.1".to_string());
        record.status = SubnetStatus::Reserved;
        assert!(store.update_subnet(&record).await.unwrap());

        store.record_generation(record.id, 253).await.unwrap();
        let loaded = store.get_subnet(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.gateway_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(loaded.status, SubnetStatus::Reserved);
        assert_eq!(loaded.total_ips, 253);
        assert_eq!(loaded.used_ips, 0);

        let missing = subnet(5, "10.9.0.0/24");
        assert!(!store.update_subnet(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_router_rejected() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.insert_subnet(&subnet(42, "10.0.0.0/24")).await.is_err());
    }
}
