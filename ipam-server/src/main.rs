//! IPAM Allocation Server
//!
//! Subnet registry and address-pool generation for the ISP back office,
//! backed by a relational record store

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use ipam_common::{
    config::SeedConfig,
    protocol::{endpoints, ApiResponse},
    Device, Principal, ServerConfig,
};
use ipam_store::{PoolConfig, Store, StoreMetrics};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

mod allocation;
mod audit;
mod batch;
mod config;
mod gate;
mod handlers;
mod locks;
mod metrics;
mod middleware;
mod progress;

use crate::allocation::AllocationService;
use crate::metrics::ServiceMetrics;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "ipam.toml")]
    config: String,

    /// Database URL (overrides config)
    #[arg(long, env = "IPAM_DATABASE_URL")]
    database: Option<String>,

    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    service: Arc<AllocationService>,
    metrics: Option<PrometheusHandle>,
    metrics_path: String,
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override config with command line arguments
    if let Some(database) = args.database {
        config.database.url = database;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind.to_string();
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }

    init_tracing(&config.log_level, &config.log_format)?;

    info!("Starting IPAM Allocation Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:#?}", config);

    let metrics = metrics::install_recorder(&config.metrics)?;
    if metrics.is_some() {
        StoreMetrics::default().describe();
        ServiceMetrics::default().describe();
    }

    let store = Store::connect(&PoolConfig::from(&config.database))
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;

    let app_state = build_state(store, &config, metrics);

    seed_directory(app_state.service.store(), &config.seed)
        .await
        .context("Failed to seed directory records")?;

    // Build the application router
    let app = build_router(app_state);

    // Start the server
    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    info!("IPAM server listening on {}", config.bind_address);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = log_level.parse::<tracing::Level>().context("Invalid log level")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ipam_server={},ipam_store={},tower_http={}", log_level, log_level, log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if log_format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(())
}

/// Upsert the configured routers and principals
async fn seed_directory(store: &Store, seed: &SeedConfig) -> Result<()> {
    for device in &seed.devices {
        store
            .upsert_device(&Device {
                id: device.id,
                name: device.name.clone(),
                kind: device.kind,
                location: device.location.clone(),
            })
            .await
            .with_context(|| format!("Failed to seed device {}", device.id))?;
    }

    for principal in &seed.principals {
        store
            .upsert_principal(&Principal {
                id: principal.id,
                username: principal.username.clone(),
                role: principal.role,
                capabilities: principal.capabilities.iter().copied().collect(),
            })
            .await
            .with_context(|| format!("Failed to seed principal {}", principal.id))?;
    }

    info!(
        devices = seed.devices.len(),
        principals = seed.principals.len(),
        "Directory seeded"
    );
    Ok(())
}

fn build_state(store: Store, config: &ServerConfig, metrics: Option<PrometheusHandle>) -> AppState {
    AppState {
        service: Arc::new(AllocationService::new(store, config.generation.clone())),
        metrics,
        metrics_path: config.metrics.metrics_path.clone(),
        request_timeout_secs: config.request_timeout_secs,
    }
}

/// Build the application router with all routes
fn build_router(state: AppState) -> Router {
    let metrics_path = if state.metrics_path.starts_with('/') {
        state.metrics_path.clone()
    } else {
        endpoints::METRICS.to_string()
    };
    let timeout_secs = state.request_timeout_secs;

    Router::new()
        // Health check endpoint
        .route(endpoints::HEALTH, get(health_check))

        // API v1 routes
        .route(
            endpoints::SUBNETS,
            get(handlers::list_subnets).post(handlers::create_subnet),
        )
        .route(
            endpoints::SUBNET,
            get(handlers::get_subnet).patch(handlers::update_subnet),
        )
        .route(endpoints::GENERATE, post(handlers::generate_addresses))
        .route(endpoints::GENERATION, get(handlers::generation_progress))
        .route(endpoints::ADDRESSES, get(handlers::list_addresses))
        .route(endpoints::AUDIT, get(handlers::list_audit))

        // Metrics endpoint
        .route(&metrics_path, get(metrics_handler))

        // Add middleware
        .layer(middleware::logging_middleware())
        .layer(middleware::cors_middleware())
        .layer(middleware::timeout_middleware(timeout_secs))

        // Add shared state
        .with_state(state)
}

/// Health check handler
async fn health_check() -> Json<ApiResponse<serde_json::Value>> {
    let health_data = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
    });

    Json(ApiResponse::success(health_data))
}

/// Metrics handler (Prometheus format)
async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}
