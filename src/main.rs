//! # Octavia Controller
//!
//! A Kubernetes controller that provisions the Octavia load-balancing service.
//!
//! ## Overview
//!
//! For every `Octavia` object the controller walks five ordered stages:
//!
//! 1. **Transport** - requests a message-bus URL and validates input secrets
//! 2. **Certificates** - generates the amphora CA and client certificate bundle
//! 3. **Quotas** - lifts compute and network quotas on the service project
//! 4. **Database** - creates both databases and runs the schema migration job
//! 5. **Configuration** - renders `octavia.conf` and the helper scripts
//!
//! Each stage reports through a condition on the object's status; `Ready`
//! mirrors the first stage that is not done yet.
//!
//! ## Usage
//!
//! ```bash
//! # Install the CRD
//! cargo run --bin crdgen | kubectl apply -f -
//!
//! # Run against the current kube context
//! KEYSTONE_URL=http://keystone:5000 octavia-controller --log-format text
//! ```

use anyhow::Result;
use clap::Parser;
use octavia_controller::config::ControllerConfig;
use octavia_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

/// Octavia controller
#[derive(Parser, Debug)]
#[command(name = "octavia-controller", version, about, long_about = None)]
struct Cli {
    /// Port of the metrics and probe server
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Log format (json, text)
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ControllerConfig::from_env();
    if let Some(port) = cli.metrics_port {
        config.metrics_port = port;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    let init = initialize(&config).await?;
    run_watch_loop(
        init.client,
        init.reconciler,
        init.octavia_cache,
        init.server_state,
        &config,
    )
    .await
}
