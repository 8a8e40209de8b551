//! # Reconciliation Logic
//!
//! One reconcile pass for an `Octavia` object:
//!
//! 1. Re-read the object; a vanished object needs nothing.
//! 2. Route by finalizer lifecycle: add the marker, run cleanup, or proceed.
//! 3. Seed the conditions and walk the stages.
//! 4. Recompute `Ready`, then persist the status once, and only if it changed.
//! 5. Turn the pass outcome into a requeue decision.

use crate::adapters::Owner;
use crate::controller::conditions::ConditionType;
use crate::controller::finalizer::{lifecycle, run_cleanup, CleanupReport, Lifecycle};
use crate::controller::orchestrator::{run_stages, CancellationProbe, PassOutcome};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError, ResourceStore};
use crate::controller::stages::StageContext;
use crate::crd::Octavia;
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::Utc;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Reports a pass as stale once the object is gone, deleting, or re-specced
struct GenerationProbe<'a> {
    store: &'a dyn ResourceStore,
    namespace: &'a str,
    name: &'a str,
    generation: Option<i64>,
}

#[async_trait]
impl CancellationProbe for GenerationProbe<'_> {
    async fn is_cancelled(&self) -> bool {
        match self.store.fetch_cached(self.namespace, self.name).await {
            Ok(Some(latest)) => {
                latest.metadata.deletion_timestamp.is_some()
                    || latest.metadata.generation != self.generation
            }
            Ok(None) => true,
            Err(e) => {
                debug!(error = %e, "cancellation.check.failed");
                false
            }
        }
    }
}

/// Main reconciliation function
///
/// Errors are persistence failures only; stage failures end up in the
/// conditions. The runtime error policy applies per-object backoff.
pub async fn reconcile(octavia: Arc<Octavia>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = octavia
        .metadata
        .name
        .clone()
        .ok_or(ReconcilerError::MissingMetadata("name"))?;
    let namespace = octavia
        .metadata
        .namespace
        .clone()
        .ok_or(ReconcilerError::MissingMetadata("namespace"))?;

    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        resource.kind = "Octavia"
    );
    reconcile_internal(&namespace, &name, &ctx)
        .instrument(span)
        .await
}

async fn reconcile_internal(
    namespace: &str,
    name: &str,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations();
    info!("🔄 Reconciling Octavia: {}/{}", namespace, name);

    let key = format!("{namespace}/{name}");
    let Some(current) = ctx.store.fetch(namespace, name).await? else {
        debug!("object is gone, nothing to do");
        ctx.reset_backoff(&key);
        return Ok(Action::await_change());
    };

    let stage_ctx = StageContext {
        octavia: &current,
        namespace,
        name,
        owner: Owner {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reference: current.controller_owner_ref(&()),
        },
        collaborators: &ctx.collaborators,
        renderer: &ctx.renderer,
        settings: &ctx.settings.stage,
    };

    match lifecycle(&current) {
        Lifecycle::Released => return Ok(Action::await_change()),
        Lifecycle::Terminating => return finalize(ctx, &stage_ctx, &key).await,
        Lifecycle::NeedsFinalizer => {
            ctx.store.add_finalizer(&current).await?;
            metrics::increment_resources_managed();
            info!("Added finalizer to Octavia {}", key);
        }
        Lifecycle::Active => {}
    }

    let now = Utc::now();
    let before = current.status.clone().unwrap_or_default();
    let mut status = before.clone();
    status.conditions.init(&ConditionType::ALL, now);

    let probe = GenerationProbe {
        store: ctx.store.as_ref(),
        namespace,
        name,
        generation: current.metadata.generation,
    };
    let report = match run_stages(&stage_ctx, &mut status, &probe, now).await {
        Ok(report) => report,
        Err(cancelled) => {
            info!(
                "Octavia {} changed mid-pass, discarding pass before stage {}",
                key, cancelled.before
            );
            return Ok(Action::await_change());
        }
    };

    status.conditions.mirror_ready(now);
    status.observed_generation = current.metadata.generation;
    if status == before {
        debug!("status unchanged, skipping write");
    } else {
        ctx.store.patch_status(&current, &status).await?;
    }
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    Ok(match report.outcome {
        PassOutcome::Complete => {
            ctx.reset_backoff(&key);
            info!("✅ Octavia {} is ready", key);
            Action::requeue(ctx.settings.resync_interval)
        }
        PassOutcome::Blocked => {
            ctx.reset_backoff(&key);
            warn!("Octavia {} is blocked on invalid configuration", key);
            Action::await_change()
        }
        PassOutcome::Requeue => {
            let (delay, attempts) = ctx.next_backoff(&key);
            metrics::increment_requeues("stage-pending");
            info!(
                "🔄 Requeueing Octavia {} in {}s (attempt {})",
                key,
                delay.as_secs(),
                attempts
            );
            Action::requeue(delay)
        }
    })
}

async fn finalize(
    ctx: &Reconciler,
    stage_ctx: &StageContext<'_>,
    key: &str,
) -> Result<Action, ReconcilerError> {
    info!("🗑️ Cleaning up Octavia {}", key);
    match run_cleanup(stage_ctx).await {
        CleanupReport::Complete => {
            ctx.store.remove_finalizer(stage_ctx.octavia).await?;
            metrics::decrement_resources_managed();
            ctx.reset_backoff(key);
            info!("✅ Octavia {} released", key);
            Ok(Action::await_change())
        }
        CleanupReport::Incomplete { stage, error } => {
            let (delay, attempts) = ctx.next_backoff(key);
            metrics::increment_requeues("cleanup");
            warn!(
                "Cleanup of Octavia {} stopped at stage {}: {} (retry in {}s, attempt {})",
                key,
                stage,
                error,
                delay.as_secs(),
                attempts
            );
            Ok(Action::requeue(delay))
        }
    }
}
