//! HTTP request handlers

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use ipam_common::{
    protocol::{
        ApiResponse, CreateSubnetRequest, GenerateAddressesRequest, GenerationProgress,
        GenerationResult, ListAddressesQuery, ListSubnetsQuery, PaginatedResponse,
        UpdateSubnetRequest, PRINCIPAL_HEADER,
    },
    AuditEvent, IpAddressRecord, IpamError, Subnet, SubnetSummary,
};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::AppState;

/// Service error rendered as an `ApiResponse` envelope
#[derive(Debug)]
pub struct ApiError(IpamError);

impl From<IpamError> for ApiError {
    fn from(e: IpamError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            IpamError::InvalidFormat(_)
            | IpamError::InvalidArgument(_)
            | IpamError::PrefixOutOfRange { .. }
            | IpamError::SubnetTooLarge { .. } => StatusCode::BAD_REQUEST,
            IpamError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            IpamError::Forbidden(_) => StatusCode::FORBIDDEN,
            IpamError::SubnetNotFound(_) | IpamError::RouterNotFound(_) => StatusCode::NOT_FOUND,
            IpamError::DuplicateCidr { .. } | IpamError::PoolExists { .. } => StatusCode::CONFLICT,
            IpamError::PartialFailure { .. }
            | IpamError::Database(_)
            | IpamError::Config(_)
            | IpamError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let mut body = ApiResponse::<()>::error(self.0.to_string());
        match &self.0 {
            IpamError::PoolExists { existing_count } => {
                body = body.with_details(json!({
                    "existingCount": existing_count,
                    "requiresConfirmation": true,
                }));
            }
            IpamError::PartialFailure {
                attempted, inserted, ..
            } => {
                body = body.with_details(json!({
                    "attempted": attempted,
                    "inserted": inserted,
                }));
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Optional requesting principal from the `x-principal-id` header
#[derive(Debug, Clone, Copy)]
pub struct PrincipalRef(pub Option<i64>);

impl<S> FromRequestParts<S> for PrincipalRef
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(PRINCIPAL_HEADER) else {
            return Ok(PrincipalRef(None));
        };

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|id| PrincipalRef(Some(id)))
            .ok_or_else(|| {
                ApiError(IpamError::Unauthorized(format!(
                    "{PRINCIPAL_HEADER} must be a numeric principal id"
                )))
            })
    }
}

/// Register a subnet
pub async fn create_subnet(
    State(state): State<AppState>,
    Json(request): Json<CreateSubnetRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Subnet>>), ApiError> {
    let subnet = state.service.create_subnet(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(subnet))))
}

/// List subnets, optionally for one router
pub async fn list_subnets(
    State(state): State<AppState>,
    Query(query): Query<ListSubnetsQuery>,
) -> ApiResult<Vec<SubnetSummary>> {
    let subnets = state.service.list_subnets(query.router_id).await?;
    Ok(Json(ApiResponse::success(subnets)))
}

/// Get subnet by ID
pub async fn get_subnet(
    State(state): State<AppState>,
    Path(subnet_id): Path<Uuid>,
) -> ApiResult<SubnetSummary> {
    let subnet = state.service.get_subnet(subnet_id).await?;
    Ok(Json(ApiResponse::success(subnet)))
}

/// Update descriptive subnet fields
pub async fn update_subnet(
    State(state): State<AppState>,
    Path(subnet_id): Path<Uuid>,
    Json(request): Json<UpdateSubnetRequest>,
) -> ApiResult<Subnet> {
    let subnet = state.service.update_subnet(subnet_id, request).await?;
    Ok(Json(ApiResponse::success(subnet)))
}

/// Generate or regenerate the address pool
pub async fn generate_addresses(
    State(state): State<AppState>,
    Path(subnet_id): Path<Uuid>,
    PrincipalRef(principal_id): PrincipalRef,
    Json(request): Json<GenerateAddressesRequest>,
) -> ApiResult<GenerationResult> {
    let result = state
        .service
        .generate_addresses(subnet_id, principal_id, request.regenerate)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Progress of the latest generation
pub async fn generation_progress(
    State(state): State<AppState>,
    Path(subnet_id): Path<Uuid>,
) -> ApiResult<Option<GenerationProgress>> {
    let progress = state.service.progress(subnet_id).await?;
    Ok(Json(ApiResponse::success(progress)))
}

/// Page through a subnet's pool
pub async fn list_addresses(
    State(state): State<AppState>,
    Path(subnet_id): Path<Uuid>,
    Query(query): Query<ListAddressesQuery>,
) -> ApiResult<PaginatedResponse<IpAddressRecord>> {
    let page = state.service.list_addresses(subnet_id, query).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Audit trail of a subnet
pub async fn list_audit(
    State(state): State<AppState>,
    Path(subnet_id): Path<Uuid>,
) -> ApiResult<Vec<AuditEvent>> {
    let events = state.service.list_audit(subnet_id).await?;
    Ok(Json(ApiResponse::success(events)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (IpamError::InvalidFormat("x".into()), StatusCode::BAD_REQUEST),
            (
                IpamError::SubnetTooLarge {
                    hosts: 16_777_214,
                    limit: 65_534,
                },
                StatusCode::BAD_REQUEST,
            ),
            (IpamError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (IpamError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (IpamError::RouterNotFound(5), StatusCode::NOT_FOUND),
            (IpamError::PoolExists { existing_count: 1 }, StatusCode::CONFLICT),
            (
                IpamError::PartialFailure {
                    attempted: 10,
                    inserted: 5,
                    reason: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }
}
