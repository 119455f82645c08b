//! Subnet registry and address-pool generation service

use crate::audit::AuditTrail;
use crate::batch::{AddressSink, BatchWriter};
use crate::gate::{AuthorizationGate, Operation};
use crate::locks::SubnetLocks;
use crate::metrics::ServiceMetrics;
use crate::progress::ProgressBoard;
use chrono::Utc;
use ipam_common::{
    cidr::parse_address_of,
    protocol::{
        CreateSubnetRequest, GenerationProgress, GenerationResult, GenerationState,
        ListAddressesQuery, PaginatedResponse, UpdateSubnetRequest,
    },
    AddressPlan, AddressSpace, AddressStatus, AuditAction, AuditEvent, CidrBlock,
    GenerationPolicy, IpAddressRecord, IpVersion, IpamError, Result, Subnet, SubnetSummary,
};
use ipam_store::Store;
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Audit events returned per subnet
const AUDIT_PAGE: u32 = 100;

/// Owns subnets and runs the generate / regenerate pipeline
#[derive(Debug)]
pub struct AllocationService {
    store: Store,
    sink: Arc<dyn AddressSink>,
    policy: GenerationPolicy,
    gate: AuthorizationGate,
    audit: AuditTrail,
    locks: SubnetLocks,
    progress: ProgressBoard,
    metrics: ServiceMetrics,
}

impl AllocationService {
    pub fn new(store: Store, policy: GenerationPolicy) -> Self {
        let sink = Arc::new(store.clone());
        Self::with_sink(store, sink, policy)
    }

    /// Service whose pool writes and deletes go to `sink` instead of `store`
    pub fn with_sink(store: Store, sink: Arc<dyn AddressSink>, policy: GenerationPolicy) -> Self {
        let metrics = ServiceMetrics::default();
        let audit = AuditTrail::new(store.clone());
        let gate = AuthorizationGate::new(store.clone(), audit.clone(), metrics.clone());

        Self {
            store,
            sink,
            policy,
            gate,
            audit,
            locks: SubnetLocks::new(),
            progress: ProgressBoard::new(),
            metrics,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Register a subnet on a router
    ///
    /// Small IPv4 subnets get their pool generated inline. A failure there is
    /// logged and the subnet is still returned; generation can be retried.
    #[instrument(skip(self, request), fields(router_id = ?request.router_id, cidr = ?request.cidr))]
    pub async fn create_subnet(&self, request: CreateSubnetRequest) -> Result<Subnet> {
        let router_id = request
            .router_id
            .ok_or_else(|| IpamError::InvalidArgument("router_id is required".to_string()))?;
        let cidr = request
            .cidr
            .as_deref()
            .map(str::trim)
            .filter(|cidr| !cidr.is_empty())
            .ok_or_else(|| IpamError::InvalidArgument("cidr is required".to_string()))?;

        let block = CidrBlock::parse(cidr)?;
        let version = block.version();
        let gateway_ip = normalize_gateway(request.gateway_ip.as_deref(), version)?;

        match self.store.get_device(router_id).await? {
            Some(device) if device.kind.is_router() => {}
            _ => return Err(IpamError::RouterNotFound(router_id)),
        }

        let canonical = block.to_string();
        if self
            .store
            .find_subnet_by_cidr(router_id, &canonical)
            .await?
            .is_some()
        {
            return Err(IpamError::DuplicateCidr {
                cidr: canonical,
                router_id,
            });
        }

        let space = AddressSpace::of(&block, &self.policy);
        let now = Utc::now();
        let subnet = Subnet {
            id: Uuid::new_v4(),
            cidr: canonical.clone(),
            version,
            router_id,
            name: request.name,
            description: request.description,
            subnet_type: request.subnet_type.unwrap_or_default(),
            allocation_mode: request.allocation_mode.unwrap_or_default(),
            gateway_ip,
            estimated_ips: space.estimate(),
            total_ips: 0,
            used_ips: 0,
            status: Default::default(),
            created_at: now,
            updated_at: now,
        };

        // The lookup above races with concurrent creates; the unique index decides
        self.store.insert_subnet(&subnet).await.map_err(|e| {
            if e.is_conflict() {
                IpamError::DuplicateCidr {
                    cidr: canonical.clone(),
                    router_id,
                }
            } else {
                e.into()
            }
        })?;

        self.metrics.subnet_created(version.as_str());
        info!(subnet_id = %subnet.id, cidr = %subnet.cidr, version = %version, "Subnet created");

        if !space.eager_eligible(&self.policy) {
            info!(
                subnet_id = %subnet.id,
                usable_hosts = %space.usable_hosts,
                "Pool generation deferred"
            );
            return Ok(subnet);
        }

        let _guard = self.locks.acquire(subnet.id).await;
        if let Err(e) = self.generate_locked(&subnet, None, false).await {
            warn!(subnet_id = %subnet.id, error = %e, "Initial pool generation failed");
        }

        Ok(self.store.get_subnet(subnet.id).await?.unwrap_or(subnet))
    }

    /// Subnets with live usage figures, optionally for one router
    #[instrument(skip(self))]
    pub async fn list_subnets(&self, router_id: Option<i64>) -> Result<Vec<SubnetSummary>> {
        let subnets = self.store.list_subnets(router_id).await?;

        let mut summaries = Vec::with_capacity(subnets.len());
        for subnet in subnets {
            summaries.push(self.summarize(subnet).await?);
        }
        Ok(summaries)
    }

    #[instrument(skip(self))]
    pub async fn get_subnet(&self, subnet_id: Uuid) -> Result<SubnetSummary> {
        let subnet = self.require_subnet(subnet_id).await?;
        self.summarize(subnet).await
    }

    /// Change descriptive fields; CIDR, version and router are fixed
    #[instrument(skip(self, request))]
    pub async fn update_subnet(
        &self,
        subnet_id: Uuid,
        request: UpdateSubnetRequest,
    ) -> Result<Subnet> {
        let mut subnet = self.require_subnet(subnet_id).await?;

        if let Some(name) = request.name {
            subnet.name = Some(name);
        }
        if let Some(description) = request.description {
            subnet.description = Some(description);
        }
        if let Some(subnet_type) = request.subnet_type {
            subnet.subnet_type = subnet_type;
        }
        if let Some(allocation_mode) = request.allocation_mode {
            subnet.allocation_mode = allocation_mode;
        }
        if let Some(status) = request.status {
            subnet.status = status;
        }
        if let Some(gateway) = request.gateway_ip {
            // Empty string clears the gateway
            subnet.gateway_ip = normalize_gateway(Some(&gateway), subnet.version)?;
        }
        subnet.updated_at = Utc::now();

        if !self.store.update_subnet(&subnet).await? {
            return Err(IpamError::SubnetNotFound(subnet_id));
        }

        info!(subnet_id = %subnet_id, gateway = ?subnet.gateway_ip, "Subnet updated");
        Ok(subnet)
    }

    /// Generate, or with `regenerate` rebuild, a subnet's address pool
    ///
    /// Requests naming a principal go through the authorization gate first.
    /// Generation of one subnet is serialized; different subnets proceed in
    /// parallel.
    #[instrument(skip(self))]
    pub async fn generate_addresses(
        &self,
        subnet_id: Uuid,
        principal_id: Option<i64>,
        regenerate: bool,
    ) -> Result<GenerationResult> {
        let principal = self
            .gate
            .authorize(principal_id, subnet_id, Operation::from_flag(regenerate))
            .await?;
        let actor_id = principal.map(|p| p.id);

        self.require_subnet(subnet_id).await?;
        let _guard = self.locks.acquire(subnet_id).await;
        // Re-read under the lock; an update may have moved the gateway meanwhile
        let subnet = self.require_subnet(subnet_id).await?;

        let count = self.generate_locked(&subnet, actor_id, regenerate).await?;

        Ok(GenerationResult {
            subnet_id,
            count,
            version: subnet.version,
            regenerated: regenerate,
        })
    }

    /// One page of a subnet's pool
    #[instrument(skip(self))]
    pub async fn list_addresses(
        &self,
        subnet_id: Uuid,
        query: ListAddressesQuery,
    ) -> Result<PaginatedResponse<IpAddressRecord>> {
        self.require_subnet(subnet_id).await?;
        let pagination = query.pagination();

        let total = match query.status {
            Some(status) => self.store.count_addresses_with_status(subnet_id, status).await?,
            None => self.store.count_addresses(subnet_id).await?,
        };
        let offset = u32::try_from(pagination.offset()).unwrap_or(u32::MAX);
        let items = self
            .store
            .list_addresses(subnet_id, query.status, pagination.page_size(), offset)
            .await?;

        Ok(PaginatedResponse::new(
            items,
            pagination.page(),
            pagination.page_size(),
            total.max(0) as u64,
        ))
    }

    /// Audit trail of a subnet, newest first
    #[instrument(skip(self))]
    pub async fn list_audit(&self, subnet_id: Uuid) -> Result<Vec<AuditEvent>> {
        self.require_subnet(subnet_id).await?;
        Ok(self.store.list_audit(subnet_id, AUDIT_PAGE).await?)
    }

    /// Progress of the latest generation, `None` if none ran since startup
    pub async fn progress(&self, subnet_id: Uuid) -> Result<Option<GenerationProgress>> {
        self.require_subnet(subnet_id).await?;
        Ok(self.progress.get(subnet_id))
    }

    async fn require_subnet(&self, subnet_id: Uuid) -> Result<Subnet> {
        self.store
            .get_subnet(subnet_id)
            .await?
            .ok_or(IpamError::SubnetNotFound(subnet_id))
    }

    async fn summarize(&self, subnet: Subnet) -> Result<SubnetSummary> {
        let assigned = self
            .store
            .count_addresses_with_status(subnet.id, AddressStatus::Assigned)
            .await?;
        Ok(SubnetSummary::new(subnet, assigned))
    }

    /// Run the pipeline and audit any failure; the caller holds the subnet lock
    async fn generate_locked(
        &self,
        subnet: &Subnet,
        actor_id: Option<i64>,
        regenerate: bool,
    ) -> Result<i64> {
        match self.run_pipeline(subnet, actor_id, regenerate).await {
            Ok(count) => Ok(count),
            // A request for confirmation, not a failed run
            Err(e @ IpamError::PoolExists { .. }) => Err(e),
            Err(e) => {
                self.fail(subnet, actor_id, regenerate, &e).await;
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        subnet: &Subnet,
        actor_id: Option<i64>,
        regenerate: bool,
    ) -> Result<i64> {
        let block = CidrBlock::parse(&subnet.cidr)?;
        let gateway = subnet
            .gateway_ip
            .as_deref()
            .map(|gateway| parse_address_of(gateway, subnet.version))
            .transpose()?;
        let plan = AddressPlan::build(&block, gateway, &self.policy)?;

        let existing = self.store.count_addresses(subnet.id).await?;
        if existing > 0 && !regenerate {
            info!(subnet_id = %subnet.id, existing, "Pool exists, confirmation required");
            return Err(IpamError::PoolExists {
                existing_count: existing,
            });
        }

        if regenerate {
            self.audit
                .record(
                    actor_id,
                    AuditAction::IpRegenerationStarted,
                    subnet.id,
                    json!({
                        "cidr": subnet.cidr,
                        "version": subnet.version,
                        "previous_count": existing,
                        "gateway_ip": subnet.gateway_ip,
                    }),
                )
                .await;

            let removed = self.sink.clear(subnet.id).await?;
            info!(subnet_id = %subnet.id, removed, "Previous pool removed");
        }

        let count = self.populate(subnet, &plan, actor_id, regenerate).await?;

        if regenerate {
            self.audit
                .record(
                    actor_id,
                    AuditAction::IpRegenerationCompleted,
                    subnet.id,
                    json!({
                        "cidr": subnet.cidr,
                        "previous_count": existing,
                        "count": count,
                    }),
                )
                .await;
        }

        Ok(count)
    }

    async fn populate(
        &self,
        subnet: &Subnet,
        plan: &AddressPlan,
        actor_id: Option<i64>,
        regenerate: bool,
    ) -> Result<i64> {
        let started = Instant::now();
        let total = plan.iter().count() as u64;
        let excluded = plan.gateway().map(|ip: IpAddr| ip.to_string());

        self.metrics.generation_started(regenerate);
        self.progress.start(subnet.id, total, regenerate);
        if !regenerate {
            self.audit
                .record(
                    actor_id,
                    AuditAction::IpGenerationStarted,
                    subnet.id,
                    json!({
                        "cidr": subnet.cidr,
                        "version": subnet.version,
                        "planned": total,
                        "excluded_gateway": excluded,
                    }),
                )
                .await;
        }

        let writer = BatchWriter::new(self.sink.as_ref(), self.policy.batch_size());
        writer
            .write(subnet.id, plan, total, |report| {
                self.progress
                    .advance(subnet.id, report.written, report.inserted, report.batches)
            })
            .await?;

        // Rows actually present; lower than planned only if rows vanished mid-run
        let count = self.store.count_addresses(subnet.id).await?;
        self.store.record_generation(subnet.id, count).await?;

        self.progress.finish(subnet.id, GenerationState::Completed);
        self.metrics.generation_completed(count);
        if !regenerate {
            self.audit
                .record(
                    actor_id,
                    AuditAction::IpGenerationCompleted,
                    subnet.id,
                    json!({
                        "cidr": subnet.cidr,
                        "version": subnet.version,
                        "count": count,
                        "excluded_gateway": excluded,
                    }),
                )
                .await;
        }

        info!(
            subnet_id = %subnet.id,
            cidr = %subnet.cidr,
            count,
            regenerate,
            duration_ms = started.elapsed().as_millis() as u64,
            "Address pool generated"
        );
        Ok(count)
    }

    async fn fail(
        &self,
        subnet: &Subnet,
        actor_id: Option<i64>,
        regenerate: bool,
        error: &IpamError,
    ) {
        if !self.progress.finish(subnet.id, GenerationState::Failed) {
            self.progress.reject(subnet.id, regenerate);
        }
        self.metrics.generation_failed();

        let mut payload = json!({
            "cidr": subnet.cidr,
            "version": subnet.version,
            "reason": error.to_string(),
        });
        if let IpamError::PartialFailure {
            attempted, inserted, ..
        } = error
        {
            payload["attempted"] = json!(attempted);
            payload["inserted"] = json!(inserted);
        }

        self.audit
            .record(actor_id, AuditAction::IpGenerationFailed, subnet.id, payload)
            .await;
    }
}

/// Validate a gateway against the subnet's version; empty means none
fn normalize_gateway(gateway: Option<&str>, version: IpVersion) -> Result<Option<String>> {
    match gateway.map(str::trim) {
        None | Some("") => Ok(None),
        Some(gateway) => Ok(Some(parse_address_of(gateway, version)?.to_string())),
    }
}
