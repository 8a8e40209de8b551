//! # Finalizer Manager
//!
//! Guards external resources across deletion. The marker is added before any
//! stage runs and removed only after every stage cleaned up, in strict
//! reverse order.
//!
//! ```text
//! NeedsFinalizer --add--> Active --delete requested--> Terminating --cleanup ok--> Released
//! ```

use crate::adapters::AdapterError;
use crate::constants::FINALIZER;
use crate::controller::stages::{Stage, StageContext};
use crate::crd::Octavia;
use crate::observability::metrics;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Live object that does not carry the marker yet
    NeedsFinalizer,
    Active,
    /// Deletion requested; cleanup still owed
    Terminating,
    /// Deletion requested and the marker is gone; nothing left to do
    Released,
}

#[must_use]
pub fn has_finalizer(octavia: &Octavia) -> bool {
    octavia
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == FINALIZER))
}

#[must_use]
pub fn lifecycle(octavia: &Octavia) -> Lifecycle {
    match (octavia.metadata.deletion_timestamp.is_some(), has_finalizer(octavia)) {
        (false, false) => Lifecycle::NeedsFinalizer,
        (false, true) => Lifecycle::Active,
        (true, true) => Lifecycle::Terminating,
        (true, false) => Lifecycle::Released,
    }
}

#[derive(Debug)]
pub enum CleanupReport {
    Complete,
    /// Cleanup stopped at `stage`; stages upstream of it were not touched
    Incomplete { stage: Stage, error: AdapterError },
}

/// Clean up every stage, downstream first
///
/// Stops at the first stage that fails so upstream resources outlive the
/// ones that depend on them.
pub async fn run_cleanup(ctx: &StageContext<'_>) -> CleanupReport {
    for stage in Stage::ORDER.iter().rev() {
        match stage.cleanup(ctx).await {
            Ok(outcomes) => {
                for outcome in outcomes {
                    metrics::record_cleanup_step(stage.name(), outcome.as_str());
                }
                info!(stage = %stage, resource = %ctx.name, "🧹 Stage cleaned up");
            }
            Err(error) => {
                metrics::record_cleanup_step(stage.name(), "failed");
                warn!(stage = %stage, resource = %ctx.name, error = %error, "cleanup.failed");
                return CleanupReport::Incomplete {
                    stage: *stage,
                    error,
                };
            }
        }
    }
    CleanupReport::Complete
}
