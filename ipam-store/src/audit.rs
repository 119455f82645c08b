//! Append-only audit trail

use crate::subnets::{parse_column, parse_uuid};
use crate::{Result, Store};
use ipam_common::AuditEvent;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::instrument;
use uuid::Uuid;

impl Store {
    /// Append one audit event
    #[instrument(skip(self, event), fields(action = %event.action))]
    pub async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;

        self.timed("append_audit", async {
            sqlx::query(
                "INSERT INTO audit_events (id, actor_id, action, resource_id, payload, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(event.id.to_string())
            .bind(event.actor_id)
            .bind(event.action.as_str())
            .bind(event.resource_id.map(|id| id.to_string()))
            .bind(&payload)
            .bind(event.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Most recent audit events for a resource, newest first
    #[instrument(skip(self))]
    pub async fn list_audit(&self, resource_id: Uuid, limit: u32) -> Result<Vec<AuditEvent>> {
        let events = self
            .timed("list_audit", async {
                let rows = sqlx::query(
                    "SELECT id, actor_id, action, resource_id, payload, created_at
                     FROM audit_events WHERE resource_id = ?
                     ORDER BY seq DESC LIMIT ?",
                )
                .bind(resource_id.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;

                rows.iter().map(audit_from_row).collect::<Result<Vec<_>>>()
            })
            .await?;

        self.metrics.query_rows_returned(events.len());
        Ok(events)
    }
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditEvent> {
    let id: String = row.try_get("id")?;
    let resource_id: Option<String> = row.try_get("resource_id")?;
    let payload: String = row.try_get("payload")?;

    Ok(AuditEvent {
        id: parse_uuid("id", &id)?,
        actor_id: row.try_get("actor_id")?,
        action: parse_column(row, "action")?,
        resource_id: resource_id
            .as_deref()
            .map(|value| parse_uuid("resource_id", value))
            .transpose()?,
        payload: serde_json::from_str(&payload)?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ipam_common::AuditAction;
    use serde_json::json;

    fn event(action: AuditAction, resource_id: Uuid, payload: serde_json::Value) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            actor_id: Some(7),
            action,
            resource_id: Some(resource_id),
            payload,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_newest_first() {
        let store = Store::in_memory().await.unwrap();
        let subnet_id = Uuid::new_v4();

        store
            .append_audit(&event(AuditAction::IpGenerationStarted, subnet_id, json!({})))
            .await
            .unwrap();
        store
            .append_audit(&event(
                AuditAction::IpGenerationCompleted,
                subnet_id,
                json!({ "count": 254 }),
            ))
            .await
            .unwrap();
        store
            .append_audit(&event(AuditAction::IpGenerationStarted, Uuid::new_v4(), json!({})))
            .await
            .unwrap();

        let events = store.list_audit(subnet_id, 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuditAction::IpGenerationCompleted);
        assert_eq!(events[0].payload["count"], 254);
        assert_eq!(events[1].action, AuditAction::IpGenerationStarted);

        let limited = store.list_audit(subnet_id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
