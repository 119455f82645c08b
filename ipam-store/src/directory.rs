//! Device inventory and staff directory lookups
//!
//! Both tables belong to other parts of the back office; this service only
//! reads them, and upserts seed records at startup.

use crate::{Error, Result, Store};
use ipam_common::{Capability, Device, DeviceKind, Principal, Role};
use sqlx::{sqlite::SqliteRow, Row};
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

impl Store {
    /// Insert or replace a device record
    #[instrument(skip(self, device), fields(device_id = device.id))]
    pub async fn upsert_device(&self, device: &Device) -> Result<()> {
        self.timed("upsert_device", async {
            sqlx::query(
                "INSERT INTO devices (id, name, kind, location) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    kind = excluded.kind,
                    location = excluded.location",
            )
            .bind(device.id)
            .bind(&device.name)
            .bind(device.kind.as_str())
            .bind(&device.location)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Look up a device by id
    #[instrument(skip(self))]
    pub async fn get_device(&self, id: i64) -> Result<Option<Device>> {
        self.timed("get_device", async {
            let row = sqlx::query("SELECT id, name, kind, location FROM devices WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

            row.as_ref().map(device_from_row).transpose()
        })
        .await
    }

    /// Insert or replace a principal record
    #[instrument(skip(self, principal), fields(principal_id = principal.id))]
    pub async fn upsert_principal(&self, principal: &Principal) -> Result<()> {
        let capabilities: Vec<&str> = principal.capabilities.iter().map(|c| c.as_str()).collect();
        let capabilities = serde_json::to_string(&capabilities)?;

        self.timed("upsert_principal", async {
            sqlx::query(
                "INSERT INTO principals (id, username, role, capabilities) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    role = excluded.role,
                    capabilities = excluded.capabilities",
            )
            .bind(principal.id)
            .bind(&principal.username)
            .bind(principal.role.as_str())
            .bind(&capabilities)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Resolve a principal with its role and capability set
    #[instrument(skip(self))]
    pub async fn get_principal(&self, id: i64) -> Result<Option<Principal>> {
        self.timed("get_principal", async {
            let row = sqlx::query(
                "SELECT id, username, role, capabilities FROM principals WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(principal_from_row).transpose()
        })
        .await
    }
}

fn device_from_row(row: &SqliteRow) -> Result<Device> {
    let kind: String = row.try_get("kind")?;
    let kind = kind
        .parse::<DeviceKind>()
        .map_err(|e| Error::decode("devices.kind", e.to_string()))?;

    Ok(Device {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind,
        location: row.try_get("location")?,
    })
}

fn principal_from_row(row: &SqliteRow) -> Result<Principal> {
    let id: i64 = row.try_get("id")?;

    // Roles unknown to this service get no privileges
    let role: String = row.try_get("role")?;
    let role = role.parse::<Role>().unwrap_or_else(|_| {
        warn!(principal_id = id, role = %role, "Unknown role, treating as staff");
        Role::Staff
    });

    let tags: String = row.try_get("capabilities")?;
    let tags: Vec<String> = serde_json::from_str(&tags)?;
    let capabilities: BTreeSet<Capability> = tags
        .iter()
        .filter_map(|tag| {
            let capability = Capability::from_tag(tag);
            if capability.is_none() {
                debug!(principal_id = id, tag = %tag, "Ignoring unknown capability");
            }
            capability
        })
        .collect();

    Ok(Principal {
        id,
        username: row.try_get("username")?,
        role,
        capabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_device_roundtrip() {
        let store = Store::in_memory().await.unwrap();
        let device = Device {
            id: 5,
            name: "core-1".to_string(),
            kind: DeviceKind::CoreRouter,
            location: Some("POP North".to_string()),
        };

        store.upsert_device(&device).await.unwrap();
        assert_eq!(store.get_device(5).await.unwrap(), Some(device.clone()));
        assert_eq!(store.get_device(6).await.unwrap(), None);

        let renamed = Device {
            name: "core-1a".to_string(),
            ..device
        };
        store.upsert_device(&renamed).await.unwrap();
        assert_eq!(store.get_device(5).await.unwrap().unwrap().name, "core-1a");
    }

    #[tokio::test]
    async fn test_principal_unknown_tags_dropped() {
        let store = Store::in_memory().await.unwrap();

        sqlx::query(
            "INSERT INTO principals (id, username, role, capabilities)
             VALUES (9, 'ops', 'night_shift', '[\"network.configure\", \"network.configur\"]')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let principal = store.get_principal(9).await.unwrap().unwrap();
        assert_eq!(principal.role, Role::Staff);
        assert_eq!(
            principal.capabilities.into_iter().collect::<Vec<_>>(),
            vec![Capability::NetworkConfigure]
        );
    }

    #[tokio::test]
    async fn test_principal_roundtrip() {
        let store = Store::in_memory().await.unwrap();
        let principal = Principal {
            id: 3,
            username: "alice".to_string(),
            role: Role::Technician,
            capabilities: [Capability::NetworkView, Capability::NetworkManage]
                .into_iter()
                .collect(),
        };

        store.upsert_principal(&principal).await.unwrap();
        assert_eq!(store.get_principal(3).await.unwrap(), Some(principal));
        assert!(store.get_principal(4).await.unwrap().is_none());
    }
}
