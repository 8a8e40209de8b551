//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and construction of the collaborators the stages talk to.

use crate::adapters::kubernetes::{
    KubeDatabase, KubeResourceStore, KubeSecrets, KubeTransport, OctaviaCache,
};
use crate::adapters::openstack::{KeystoneIdentity, NeutronQuota, NovaQuota, OpenStackHttp};
use crate::adapters::Collaborators;
use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::Reconciler;
use crate::crd::Octavia;
use crate::observability;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Watch cache the reconciler reads between stages
    pub octavia_cache: OctaviaCache,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber in the configured format
pub fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "octavia_controller=info".into());
    let result = if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    if let Err(e) = result {
        warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Collaborator and reconciler setup
///
/// # Errors
///
/// Fails if the server cannot start, the cluster is unreachable, or the
/// HTTP client cannot be built.
pub async fn initialize(config: &ControllerConfig) -> Result<InitializationResult> {
    // Required for rustls 0.23+ before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    init_tracing(&config.log_format);
    info!("Starting Octavia Controller v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {:?}", config);

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let http = OpenStackHttp::new(config.http_timeout_duration(), config.auth_token.clone())
        .context("Failed to build OpenStack HTTP client")?;
    let collaborators = Collaborators {
        transport: Arc::new(KubeTransport::new(client.clone())),
        secrets: Arc::new(KubeSecrets::new(client.clone())),
        identity: Arc::new(KeystoneIdentity::new(http.clone(), &config.keystone_url)),
        compute_quota: Arc::new(NovaQuota::new(http.clone(), &config.nova_url)),
        network_quota: Arc::new(NeutronQuota::new(http, &config.neutron_url)),
        database: Arc::new(KubeDatabase::new(client.clone(), &config.db_sync_image)),
    };
    let resource_store = KubeResourceStore::new(client.clone());
    let octavia_cache = resource_store.cache();
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(resource_store),
        collaborators,
        config.reconciler_settings(),
    ));

    check_crd_queryable(&client).await;

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        reconciler,
        octavia_cache,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Log whether the Octavia CRD is installed before the watch starts
async fn check_crd_queryable(client: &Client) {
    let octavias: Api<Octavia> = Api::all(client.clone());
    match octavias.list(&ListParams::default().limit(1)).await {
        Ok(list) => info!(
            "CRD is queryable, found {} existing Octavia resources in the first page",
            list.items.len()
        ),
        Err(e) => warn!(
            "Octavia CRD is not queryable yet ({}); the watch will retry. Install it with: crdgen | kubectl apply -f -",
            e
        ),
    }
}
