//! OpenStack API Simulator
//!
//! Serves the Keystone, Nova and Neutron doubles for local runs of the
//! controller.
//!
//! Environment Variables:
//! - PORT: Port to listen on (default: 8080)
//! - SIM_PROJECTS: Comma-separated project names to register (default: service)

use openstack_api_sim::{serve, SimState};
use std::env;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openstack_api_sim=info,tower_http=info".into()),
        )
        .init();

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let state = SimState::new();
    for name in env::var("SIM_PROJECTS")
        .unwrap_or_else(|_| "service".to_string())
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        let id = state.register_project(name).await;
        info!("Registered project {} as {}", name, id);
    }

    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let server = serve(listener, state).await?;
    info!("Identity: {}", server.identity_url());
    info!("Compute: {}", server.compute_url());
    info!("Network: {}", server.network_url());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
