//! Audit trail writer

use chrono::Utc;
use ipam_common::{AuditAction, AuditEvent};
use ipam_store::Store;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

/// Appends pipeline events to the store's audit table
///
/// Recording never fails the calling operation; a write error is logged and
/// the event dropped.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    store: Store,
}

impl AuditTrail {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        actor_id: Option<i64>,
        action: AuditAction,
        subnet_id: Uuid,
        payload: Value,
    ) {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            actor_id,
            action,
            resource_id: Some(subnet_id),
            payload,
            created_at: Utc::now(),
        };

        match self.store.append_audit(&event).await {
            Ok(()) => debug!(action = %action, subnet_id = %subnet_id, "Audit event recorded"),
            Err(e) => error!(
                action = %action,
                subnet_id = %subnet_id,
                error = %e,
                "Failed to record audit event"
            ),
        }
    }
}
