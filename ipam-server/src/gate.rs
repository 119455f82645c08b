//! Authorization gate for pool generation

use crate::audit::AuditTrail;
use crate::metrics::ServiceMetrics;
use ipam_common::{AuditAction, IpamError, Principal, Result};
use ipam_store::Store;
use serde_json::json;
use std::fmt;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Mutating operation guarded by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Generate,
    Regenerate,
}

impl Operation {
    pub fn from_flag(regenerate: bool) -> Self {
        if regenerate {
            Operation::Regenerate
        } else {
            Operation::Generate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Generate => "generate",
            Operation::Regenerate => "regenerate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking a resolved principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { reason: &'static str },
}

/// Administrative roles, or a network configure/manage capability, pass
pub fn evaluate(principal: &Principal) -> Decision {
    if principal.can_manage_network() {
        Decision::Allowed
    } else {
        Decision::Denied {
            reason: "missing network management privilege",
        }
    }
}

/// Resolves principals against the staff directory and audits denials
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    store: Store,
    audit: AuditTrail,
    metrics: ServiceMetrics,
}

impl AuthorizationGate {
    pub fn new(store: Store, audit: AuditTrail, metrics: ServiceMetrics) -> Self {
        Self {
            store,
            audit,
            metrics,
        }
    }

    /// Check `principal_id` for `operation` on a subnet
    ///
    /// Calls without a principal are internal and pass unchecked. A denial is
    /// audited before the error is returned.
    #[instrument(skip(self))]
    pub async fn authorize(
        &self,
        principal_id: Option<i64>,
        subnet_id: Uuid,
        operation: Operation,
    ) -> Result<Option<Principal>> {
        let Some(principal_id) = principal_id else {
            return Ok(None);
        };

        let Some(principal) = self.store.get_principal(principal_id).await? else {
            warn!(principal_id, "Unknown principal");
            self.metrics.authorization_denied("unknown_principal");
            self.audit
                .record(
                    Some(principal_id),
                    AuditAction::IpGenerationDenied,
                    subnet_id,
                    json!({
                        "operation": operation.as_str(),
                        "reason": "unknown principal",
                    }),
                )
                .await;
            return Err(IpamError::Unauthorized(format!(
                "principal {principal_id} is not known"
            )));
        };

        match evaluate(&principal) {
            Decision::Allowed => {
                info!(principal_id, role = %principal.role, "Generation authorized");
                Ok(Some(principal))
            }
            Decision::Denied { reason } => {
                warn!(principal_id, role = %principal.role, reason, "Generation denied");
                self.metrics.authorization_denied("missing_privilege");
                self.audit
                    .record(
                        Some(principal_id),
                        AuditAction::IpGenerationDenied,
                        subnet_id,
                        json!({
                            "operation": operation.as_str(),
                            "role": principal.role.as_str(),
                            "reason": reason,
                        }),
                    )
                    .await;
                Err(IpamError::Forbidden(format!(
                    "{} may not {operation} address pools",
                    principal.username
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam_common::{Capability, Role};

    fn principal(id: i64, role: Role, capabilities: &[Capability]) -> Principal {
        Principal {
            id,
            username: format!("user{id}"),
            role,
            capabilities: capabilities.iter().copied().collect(),
        }
    }

    async fn gate() -> (AuthorizationGate, Store) {
        let store = Store::in_memory().await.unwrap();
        let gate = AuthorizationGate::new(
            store.clone(),
            AuditTrail::new(store.clone()),
            ServiceMetrics::default(),
        );
        (gate, store)
    }

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate(&principal(1, Role::SuperAdmin, &[])), Decision::Allowed);
        assert_eq!(
            evaluate(&principal(2, Role::Support, &[Capability::NetworkManage])),
            Decision::Allowed
        );
        assert!(matches!(
            evaluate(&principal(3, Role::Support, &[Capability::NetworkView])),
            Decision::Denied { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_principal_bypasses() {
        let (gate, store) = gate().await;
        let subnet_id = Uuid::new_v4();

        let resolved = gate.authorize(None, subnet_id, Operation::Generate).await.unwrap();
        assert!(resolved.is_none());
        assert!(store.list_audit(subnet_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_denial_is_audited() {
        let (gate, store) = gate().await;
        store
            .upsert_principal(&principal(8, Role::Billing, &[Capability::BillingManage]))
            .await
            .unwrap();
        let subnet_id = Uuid::new_v4();

        let err = gate
            .authorize(Some(8), subnet_id, Operation::Regenerate)
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Forbidden(_)));

        let events = store.list_audit(subnet_id, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::IpGenerationDenied);
        assert_eq!(events[0].payload["role"], "billing");
        assert_eq!(events[0].payload["operation"], "regenerate");
    }

    #[tokio::test]
    async fn test_unknown_principal_is_unauthorized() {
        let (gate, store) = gate().await;
        let subnet_id = Uuid::new_v4();

        let err = gate
            .authorize(Some(404), subnet_id, Operation::Generate)
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Unauthorized(_)));
        assert_eq!(store.list_audit(subnet_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_engineer_with_capability_allowed() {
        let (gate, store) = gate().await;
        store
            .upsert_principal(&principal(9, Role::NetworkEngineer, &[Capability::NetworkConfigure]))
            .await
            .unwrap();

        let resolved = gate
            .authorize(Some(9), Uuid::new_v4(), Operation::Generate)
            .await
            .unwrap();
        assert_eq!(resolved.map(|p| p.id), Some(9));
    }
}
