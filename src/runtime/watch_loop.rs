//! # Watch Loop
//!
//! Controller watch loop that monitors `Octavia` resources and everything
//! they own (secrets, jobs, TransportURLs, MariaDB databases and accounts),
//! and triggers reconciliation when changes are detected.

use crate::adapters::kubernetes::{owned_operator_resources, OctaviaCache};
use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::crd::Octavia;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::core::DynamicObject;
use kube::Client;
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the controller watch loop
///
/// Restarts the watch whenever the stream ends or fails, until a shutdown
/// signal flips the server out of ready.
///
/// # Errors
///
/// Currently infallible; the signature leaves room for setup failures.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    octavia_cache: OctaviaCache,
    server_state: Arc<ServerState>,
    config: &ControllerConfig,
) -> Result<(), anyhow::Error> {
    let octavias: Api<Octavia> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::all(client.clone());
    let jobs: Api<Job> = Api::all(client.clone());
    let restart_delay = config.watch_restart_delay_duration();

    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_state.is_ready.store(false, Ordering::Relaxed);
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        info!("Starting controller watch loop...");
        let mut watched =
            Controller::new(octavias.clone(), watcher::Config::default().any_semantic())
                .owns(secrets.clone(), watcher::Config::default())
                .owns(jobs.clone(), watcher::Config::default());
        for resource in owned_operator_resources() {
            let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
            watched = watched.owns_with(api, resource, watcher::Config::default());
        }
        octavia_cache.attach(watched.store()).await;

        watched
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(|result| async move {
                match &result {
                    Ok((object, _)) => {
                        debug!(object = %object, "watch.event.success");
                        Some(result)
                    }
                    Err(e) => handle_watch_stream_error(&format!("{e:?}"), restart_delay)
                        .await
                        .map(|()| result),
                }
            })
            .for_each(|_| futures::future::ready(()))
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
