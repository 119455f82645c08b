//! Common types and address-space algorithms for the IPAM service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod cidr;
pub mod config;
pub mod generator;
pub mod protocol;
pub mod space;

pub use cidr::CidrBlock;
pub use config::{DatabaseConfig, GenerationPolicy, MetricsConfig, SeedConfig, ServerConfig};
pub use generator::AddressPlan;
pub use space::AddressSpace;

/// IP protocol version of a subnet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IpVersion {
    #[serde(rename = "IPv4")]
    V4,
    #[serde(rename = "IPv6")]
    V6,
}

impl IpVersion {
    /// Stored/wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "IPv4",
            IpVersion::V6 => "IPv6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = IpamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "IPv4" => Ok(IpVersion::V4),
            "IPv6" => Ok(IpVersion::V6),
            other => Err(IpamError::InvalidArgument(format!("unknown IP version: {other}"))),
        }
    }
}

/// Generates `as_str`, `Display` and `FromStr` for a lowercase string enum
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stored/wire representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = IpamError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(IpamError::InvalidArgument(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

/// Whether the subnet is routed publicly
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubnetType {
    #[default]
    Private,
    Public,
}

string_enum!(SubnetType { Private => "private", Public => "public" });

/// How addresses in the subnet are handed out. Descriptive only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    #[default]
    Dynamic,
    Static,
}

string_enum!(AllocationMode { Dynamic => "dynamic", Static => "static" });

/// Administrative state of a subnet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubnetStatus {
    #[default]
    Active,
    Inactive,
    Reserved,
    Deprecated,
}

string_enum!(SubnetStatus {
    Active => "active",
    Inactive => "inactive",
    Reserved => "reserved",
    Deprecated => "deprecated",
});

/// Ownership state of a single pool address
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressStatus {
    #[default]
    Available,
    Assigned,
    Reserved,
}

string_enum!(AddressStatus {
    Available => "available",
    Assigned => "assigned",
    Reserved => "reserved",
});

/// A registered subnet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subnet {
    /// Registry-owned identifier
    pub id: Uuid,
    /// Canonical `network/prefix` form
    pub cidr: String,
    /// Derived from `cidr` at creation
    pub version: IpVersion,
    /// Router the subnet is announced on
    pub router_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub subnet_type: SubnetType,
    pub allocation_mode: AllocationMode,
    /// Excluded from generated pools when set
    pub gateway_ip: Option<String>,
    /// Descriptive usable-host estimate computed at creation
    pub estimated_ips: i64,
    /// Rows written by the last successful generation, 0 before that
    pub total_ips: i64,
    /// Snapshot of assigned addresses at the last generation
    pub used_ips: i64,
    pub status: SubnetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subnet with live-derived usage figures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubnetSummary {
    #[serde(flatten)]
    pub subnet: Subnet,
    /// Count of pool rows currently in `assigned` state
    pub assigned_ips: i64,
    /// `total_ips - assigned_ips`
    pub free_ips: i64,
}

impl SubnetSummary {
    pub fn new(subnet: Subnet, assigned_ips: i64) -> Self {
        let free_ips = (subnet.total_ips - assigned_ips).max(0);
        Self {
            subnet,
            assigned_ips,
            free_ips,
        }
    }
}

/// One address row in a subnet's pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpAddressRecord {
    pub ip_address: String,
    pub subnet_id: Uuid,
    pub status: AddressStatus,
    /// Copy of the parent subnet's version
    pub version: IpVersion,
    pub created_at: DateTime<Utc>,
}

/// Audited actions of the allocation pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    IpGenerationStarted,
    IpGenerationCompleted,
    IpGenerationFailed,
    IpGenerationDenied,
    IpRegenerationStarted,
    IpRegenerationCompleted,
}

string_enum!(AuditAction {
    IpGenerationStarted => "ip_generation_started",
    IpGenerationCompleted => "ip_generation_completed",
    IpGenerationFailed => "ip_generation_failed",
    IpGenerationDenied => "ip_generation_denied",
    IpRegenerationStarted => "ip_regeneration_started",
    IpRegenerationCompleted => "ip_regeneration_completed",
});

/// Append-only audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Principal that triggered the action, `None` for system calls
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub resource_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Role of a principal, as recorded by the staff directory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    NetworkEngineer,
    Technician,
    Support,
    Billing,
    Staff,
}

string_enum!(Role {
    SuperAdmin => "super_admin",
    Admin => "admin",
    NetworkEngineer => "network_engineer",
    Technician => "technician",
    Support => "support",
    Billing => "billing",
    Staff => "staff",
});

impl Role {
    /// Administrative roles bypass capability checks
    pub fn is_administrative(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

/// Capability tags checked by set membership
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    #[serde(rename = "network.view")]
    NetworkView,
    #[serde(rename = "network.configure")]
    NetworkConfigure,
    #[serde(rename = "network.manage")]
    NetworkManage,
    #[serde(rename = "customers.manage")]
    CustomersManage,
    #[serde(rename = "billing.manage")]
    BillingManage,
}

impl Capability {
    /// Stored/wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::NetworkView => "network.view",
            Capability::NetworkConfigure => "network.configure",
            Capability::NetworkManage => "network.manage",
            Capability::CustomersManage => "customers.manage",
            Capability::BillingManage => "billing.manage",
        }
    }

    /// Parse a stored tag, `None` for tags this service does not know
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "network.view" => Some(Capability::NetworkView),
            "network.configure" => Some(Capability::NetworkConfigure),
            "network.manage" => Some(Capability::NetworkManage),
            "customers.manage" => Some(Capability::CustomersManage),
            "billing.manage" => Some(Capability::BillingManage),
            _ => None,
        }
    }
}

/// A requesting principal resolved from the staff directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub capabilities: BTreeSet<Capability>,
}

impl Principal {
    /// Whether the principal may generate or regenerate address pools
    pub fn can_manage_network(&self) -> bool {
        self.role.is_administrative()
            || self.capabilities.contains(&Capability::NetworkConfigure)
            || self.capabilities.contains(&Capability::NetworkManage)
    }
}

/// Kind of network device in the device inventory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Router,
    CoreRouter,
    EdgeRouter,
    Switch,
    Olt,
    AccessPoint,
}

string_enum!(DeviceKind {
    Router => "router",
    CoreRouter => "core_router",
    EdgeRouter => "edge_router",
    Switch => "switch",
    Olt => "olt",
    AccessPoint => "access_point",
});

impl DeviceKind {
    /// Only router-class devices may own subnets
    pub fn is_router(&self) -> bool {
        matches!(
            self,
            DeviceKind::Router | DeviceKind::CoreRouter | DeviceKind::EdgeRouter
        )
    }
}

/// Network device record from the inventory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub kind: DeviceKind,
    pub location: Option<String>,
}

/// Error types for IPAM operations
#[derive(Debug, thiserror::Error)]
pub enum IpamError {
    /// CIDR or address string failed structural validation
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Missing or malformed request field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Prefix outside the band eligible for generation
    #[error("Prefix /{prefix} is outside the {version} generation range /{min}../{max}")]
    PrefixOutOfRange {
        prefix: u8,
        version: IpVersion,
        min: u8,
        max: u8,
    },

    /// Usable host count above the eager-generation cap
    #[error("Subnet has {hosts} usable hosts, more than the limit of {limit}")]
    SubnetTooLarge { hosts: u128, limit: u128 },

    /// Subnet not found
    #[error("Subnet not found: {0}")]
    SubnetNotFound(Uuid),

    /// Router reference does not resolve to a router-class device
    #[error("Router not found: {0}")]
    RouterNotFound(i64),

    /// Identical CIDR already registered on the router
    #[error("Subnet {cidr} already exists on router {router_id}")]
    DuplicateCidr { cidr: String, router_id: i64 },

    /// Non-empty pool exists and regeneration was not confirmed
    #[error("Subnet already has {existing_count} generated addresses")]
    PoolExists { existing_count: i64 },

    /// Principal could not be resolved
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Principal lacks the required privilege
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A batch write failed after earlier batches were committed
    #[error("Generation failed after {inserted} of {attempted} addresses: {reason}")]
    PartialFailure {
        attempted: u64,
        inserted: u64,
        reason: String,
    },

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for IPAM operations
pub type Result<T> = std::result::Result<T, IpamError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, caps: &[Capability]) -> Principal {
        Principal {
            id: 7,
            username: "noc".to_string(),
            role,
            capabilities: caps.iter().copied().collect(),
        }
    }

    #[test]
    fn test_network_privilege() {
        assert!(principal(Role::Admin, &[]).can_manage_network());
        assert!(principal(Role::SuperAdmin, &[]).can_manage_network());
        assert!(principal(Role::Technician, &[Capability::NetworkConfigure]).can_manage_network());
        assert!(principal(Role::Staff, &[Capability::NetworkManage]).can_manage_network());
        assert!(!principal(Role::NetworkEngineer, &[Capability::NetworkView]).can_manage_network());
        assert!(!principal(Role::Billing, &[Capability::BillingManage]).can_manage_network());
    }

    #[test]
    fn test_capability_tags() {
        assert_eq!(Capability::from_tag("network.configure"), Some(Capability::NetworkConfigure));
        assert_eq!(Capability::from_tag("network.configur"), None);
        assert_eq!(Capability::NetworkManage.as_str(), "network.manage");

        let json = serde_json::to_string(&Capability::NetworkManage).unwrap();
        assert_eq!(json, "\"network.manage\"");
    }

    #[test]
    fn test_string_enums() {
        assert_eq!("assigned".parse::<AddressStatus>().unwrap(), AddressStatus::Assigned);
        assert_eq!("edge_router".parse::<DeviceKind>().unwrap(), DeviceKind::EdgeRouter);
        assert!("gateway".parse::<DeviceKind>().is_err());
        assert_eq!(AuditAction::IpGenerationDenied.as_str(), "ip_generation_denied");
        assert_eq!("IPv6".parse::<IpVersion>().unwrap(), IpVersion::V6);
        assert!(DeviceKind::CoreRouter.is_router());
        assert!(!DeviceKind::Switch.is_router());
    }

    #[test]
    fn test_summary_free_ips() {
        let now = Utc::now();
        let subnet = Subnet {
            id: Uuid::new_v4(),
            cidr: "192.168.10.0/24".to_string(),
            version: IpVersion::V4,
            router_id: 5,
            name: None,
            description: None,
            subnet_type: SubnetType::Private,
            allocation_mode: AllocationMode::Dynamic,
            gateway_ip: None,
            estimated_ips: 254,
            total_ips: 254,
            used_ips: 0,
            status: SubnetStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let summary = SubnetSummary::new(subnet, 4);
        assert_eq!(summary.free_ips, 250);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["version"], "IPv4");
        assert_eq!(json["free_ips"], 250);
        assert_eq!(json["cidr"], "192.168.10.0/24");
    }
}
