//! Protocol definitions for the IPAM HTTP API

use crate::{AddressStatus, AllocationMode, IpVersion, SubnetStatus, SubnetType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// API version
pub const API_VERSION: &str = "v1";

/// Base path for REST API
pub const API_BASE_PATH: &str = const_format::concatcp!("/api/", API_VERSION);

/// Header carrying the requesting principal's id
pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// REST API endpoints
pub mod endpoints {
    use super::API_BASE_PATH;

    /// Create or list subnets
    pub const SUBNETS: &str = const_format::concatcp!(API_BASE_PATH, "/subnets");

    /// Get or update one subnet
    pub const SUBNET: &str = const_format::concatcp!(API_BASE_PATH, "/subnets/{id}");

    /// Generate or regenerate a subnet's pool
    pub const GENERATE: &str = const_format::concatcp!(API_BASE_PATH, "/subnets/{id}/generate");

    /// Progress of the last generation
    pub const GENERATION: &str = const_format::concatcp!(API_BASE_PATH, "/subnets/{id}/generation");

    /// Addresses in a subnet's pool
    pub const ADDRESSES: &str = const_format::concatcp!(API_BASE_PATH, "/subnets/{id}/addresses");

    /// Audit trail of a subnet
    pub const AUDIT: &str = const_format::concatcp!(API_BASE_PATH, "/subnets/{id}/audit");

    /// Health check endpoint
    pub const HEALTH: &str = "/health";

    /// Metrics endpoint (Prometheus format)
    pub const METRICS: &str = "/metrics";
}

/// HTTP response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Success status
    pub success: bool,
    /// Response data
    pub data: Option<T>,
    /// Error message if any
    pub error: Option<String>,
    /// Machine-readable error details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Request timestamp
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an error response
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// Items in this page
    pub items: Vec<T>,
    /// Current page number (0-based)
    pub page: u32,
    /// Page size
    pub page_size: u32,
    /// Total number of items
    pub total_count: u64,
    /// Total number of pages
    pub total_pages: u32,
    /// Whether there's a next page
    pub has_next: bool,
    /// Whether there's a previous page
    pub has_previous: bool,
}

impl<T> PaginatedResponse<T> {
    /// Create a new paginated response
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total_count: u64) -> Self {
        let total_pages = total_count.div_ceil(u64::from(page_size.max(1))) as u32;
        let has_next = page + 1 < total_pages;
        let has_previous = page > 0;

        Self {
            items,
            page,
            page_size,
            total_count,
            total_pages,
            has_next,
            has_previous,
        }
    }
}

/// Query parameters for pagination
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PaginationParams {
    /// Page number (0-based)
    pub page: Option<u32>,
    /// Page size (default: 50, max: 1000)
    pub page_size: Option<u32>,
}

impl PaginationParams {
    /// Get page number with default
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    /// Get page size with default and bounds checking
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(50).clamp(1, 1000)
    }

    /// Row offset of the first item on the page
    pub fn offset(&self) -> u64 {
        u64::from(self.page()) * u64::from(self.page_size())
    }
}

/// Subnet creation request
///
/// `router_id` and `cidr` are optional here so that a missing field is
/// reported as a 400 rather than a deserialization rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSubnetRequest {
    pub router_id: Option<i64>,
    pub cidr: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub subnet_type: Option<SubnetType>,
    pub allocation_mode: Option<AllocationMode>,
    pub gateway_ip: Option<String>,
}

/// Mutable subnet fields; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubnetRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub subnet_type: Option<SubnetType>,
    pub allocation_mode: Option<AllocationMode>,
    /// An empty string clears the gateway
    pub gateway_ip: Option<String>,
    pub status: Option<SubnetStatus>,
}

/// Address generation request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateAddressesRequest {
    /// Confirms destroying an existing pool
    #[serde(default)]
    pub regenerate: bool,
}

/// Outcome of a successful generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub subnet_id: Uuid,
    pub count: i64,
    pub version: IpVersion,
    pub regenerated: bool,
}

/// Subnet listing filter
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListSubnetsQuery {
    pub router_id: Option<i64>,
}

/// Address listing filter
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListAddressesQuery {
    pub status: Option<AddressStatus>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListAddressesQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// State of a subnet's most recent generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    Running,
    Completed,
    Failed,
}

/// Observable progress of a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub subnet_id: Uuid,
    pub state: GenerationState,
    /// Addresses handed to the store so far
    pub written: u64,
    /// Newly inserted rows so far; lower than `written` on retries
    pub inserted: u64,
    pub total: u64,
    pub batches: u32,
    pub regenerate: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
