use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use vps_api::{create_app, AppState, Config};
use vps_core::validation::validate_tenant_id;
use vps_hypervisor::KvmHypervisor;
use vps_orchestrator::{AdminSet, JsonFileStore, LifecycleCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; the guard flushes file output on exit
    let _log_guard = vps_logging::init_subscriber();

    info!("Starting vps-api service...");

    // Load configuration
    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, data_dir={}",
        config.bind_addr,
        config.data_dir.display()
    );

    let root_admin = config
        .root_admin
        .clone()
        .context("VPS_ROOT_ADMIN must be set to the root admin's tenant id")?;
    validate_tenant_id(&root_admin).context("VPS_ROOT_ADMIN is not a valid tenant id")?;

    // Document store and admin set are loaded once
    let store = Arc::new(
        JsonFileStore::open(&config.data_dir)
            .with_context(|| format!("Failed to open data dir {}", config.data_dir.display()))?,
    );
    let admins = AdminSet::load(store.as_ref(), &root_admin)?;

    let driver = Arc::new(
        KvmHypervisor::new(config.kvm_config()).context("libvirt tools are not available")?,
    );
    info!(
        "Hypervisor ready: image_dir={}, timeout={}s",
        config.image_dir.display(),
        config.driver_timeout_secs
    );

    let coordinator =
        LifecycleCoordinator::new(config.coordinator_config(), admins, store.clone(), driver);

    if config.dispatch_token.is_none() {
        warn!("VPS_DISPATCH_TOKEN is not set; the command endpoint is disabled");
    }
    let state = AppState::new(
        coordinator,
        store,
        config.panel_url.clone(),
        config.dispatch_token.clone(),
    );

    // Create app
    let app = create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
