//! # Stage Orchestrator
//!
//! Walks [`Stage::ORDER`] once per reconcile pass and decides, per stage,
//! whether to skip it, leave it alone, or execute it:
//!
//! 1. **Skipped** - the predecessor is not complete. Conditions still True
//!    from an earlier pass drop to Unknown so no stage is ever reported ready
//!    ahead of its upstream.
//! 2. **Satisfied** - every owned condition is True, the idempotency key
//!    matches the stored fingerprint, and the stage's own resources still
//!    exist. A stage whose resources vanished is executed again.
//! 3. **Blocked** - an owned condition failed with `InvalidConfiguration` for
//!    the same key. Nothing changes until the inputs do.
//! 4. **Executed** - anything else. The outcome is applied to the status
//!    immediately, and the fingerprint is stored when the stage completes or
//!    fails permanently.
//!
//! Cancellation is checked before every stage. A cancelled pass returns
//! [`Cancelled`] and its status must not be persisted.

use crate::controller::conditions::{reason, ConditionType};
use crate::controller::stages::{RetryHint, Stage, StageContext, StageEffect, StageOutcome};
use crate::crd::{ConditionStatus, OctaviaStatus};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Checked between stages to abandon a pass early
#[async_trait]
pub trait CancellationProbe: Send + Sync {
    async fn is_cancelled(&self) -> bool;
}

/// Probe for passes that always run to the end
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

#[async_trait]
impl CancellationProbe for NeverCancelled {
    async fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDecision {
    Skipped,
    Satisfied,
    Blocked,
    Executed(RetryHint),
}

impl StageDecision {
    fn as_str(self) -> &'static str {
        match self {
            StageDecision::Skipped => "skipped",
            StageDecision::Satisfied => "satisfied",
            StageDecision::Blocked => "blocked",
            StageDecision::Executed(RetryHint::None) => "executed",
            StageDecision::Executed(RetryHint::Requeue) => "requeue",
            StageDecision::Executed(RetryHint::Terminal) => "terminal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every stage is complete
    Complete,
    /// Something is pending or failed transiently; retry with backoff
    Requeue,
    /// A permanent failure holds the chain; wait for a change
    Blocked,
}

fn executed(decisions: &[(Stage, StageDecision)]) -> Vec<Stage> {
    decisions
        .iter()
        .filter(|(_, decision)| matches!(decision, StageDecision::Executed(_)))
        .map(|(stage, _)| *stage)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub decisions: Vec<(Stage, StageDecision)>,
    pub outcome: PassOutcome,
}

impl PassReport {
    /// Stages that actually ran in this pass
    #[must_use]
    pub fn executed(&self) -> Vec<Stage> {
        executed(&self.decisions)
    }
}

/// The object changed or vanished mid-pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    /// Stage the pass stopped in front of
    pub before: Stage,
    pub decisions: Vec<(Stage, StageDecision)>,
}

impl Cancelled {
    /// Stages that ran before the pass was abandoned
    #[must_use]
    pub fn executed(&self) -> Vec<Stage> {
        executed(&self.decisions)
    }
}

/// All of the stage's conditions are True
#[must_use]
pub fn is_complete(stage: Stage, status: &OctaviaStatus) -> bool {
    stage
        .conditions()
        .iter()
        .all(|ty| status.conditions.is_true(*ty))
}

fn is_blocked(stage: Stage, status: &OctaviaStatus) -> bool {
    stage.conditions().iter().any(|ty| {
        status.conditions.get(*ty).is_ok_and(|c| {
            c.status == ConditionStatus::False && c.reason == reason::INVALID_CONFIGURATION
        })
    })
}

/// Drop conditions that are still True from an earlier pass
fn downgrade(stage: Stage, predecessor: Stage, status: &mut OctaviaStatus, now: DateTime<Utc>) {
    for ty in stage.conditions() {
        if status.conditions.is_true(*ty) {
            status.conditions.set_at(
                *ty,
                ConditionStatus::Unknown,
                reason::PREDECESSOR_NOT_READY,
                format!("{predecessor} stage is not ready"),
                now,
            );
        }
    }
    status.stage_fingerprints.remove(stage.name());
}

fn apply(outcome: &StageOutcome, status: &mut OctaviaStatus, now: DateTime<Utc>) {
    for update in &outcome.conditions {
        status.conditions.set_at(
            update.ty,
            update.status,
            update.reason,
            update.message.clone(),
            now,
        );
    }
    for effect in &outcome.effects {
        match effect {
            StageEffect::TransportSecret(name) => status.transport_url_secret.clone_from(name),
            StageEffect::DatabaseHostname(host) => status.database_hostname.clone_from(host),
        }
    }
}

/// Run one pass over every stage, mutating `status` in place
///
/// # Errors
///
/// Returns [`Cancelled`] when the probe reports the pass stale; `status` then
/// holds partial results and must be discarded.
pub async fn run_stages(
    ctx: &StageContext<'_>,
    status: &mut OctaviaStatus,
    probe: &dyn CancellationProbe,
    now: DateTime<Utc>,
) -> Result<PassReport, Cancelled> {
    let mut decisions = Vec::with_capacity(Stage::ORDER.len());
    let mut requeue = false;
    let mut blocked = false;

    for stage in Stage::ORDER {
        if probe.is_cancelled().await {
            info!(stage = %stage, "⏹️ Reconcile pass cancelled");
            return Err(Cancelled {
                before: stage,
                decisions,
            });
        }

        let decision = decide_and_run(ctx, stage, status, now).await;
        metrics::record_stage(stage.name(), decision.as_str());
        match decision {
            StageDecision::Executed(RetryHint::Requeue) => requeue = true,
            StageDecision::Executed(RetryHint::Terminal) | StageDecision::Blocked => blocked = true,
            _ => {}
        }
        decisions.push((stage, decision));
    }

    let outcome = if Stage::ORDER.iter().all(|s| is_complete(*s, status)) {
        PassOutcome::Complete
    } else if blocked && !requeue {
        PassOutcome::Blocked
    } else {
        PassOutcome::Requeue
    };
    Ok(PassReport { decisions, outcome })
}

async fn decide_and_run(
    ctx: &StageContext<'_>,
    stage: Stage,
    status: &mut OctaviaStatus,
    now: DateTime<Utc>,
) -> StageDecision {
    if let Some(predecessor) = stage.predecessor() {
        if !is_complete(predecessor, status) {
            downgrade(stage, predecessor, status, now);
            debug!(stage = %stage, predecessor = %predecessor, "stage.skipped");
            return StageDecision::Skipped;
        }
    }

    let key = stage.idempotency_key(ctx.octavia, status);
    let fingerprint_matches = status.stage_fingerprints.get(stage.name()) == Some(&key);
    if fingerprint_matches && is_complete(stage, status) {
        match stage.verify(ctx).await {
            Ok(true) => {
                debug!(stage = %stage, "stage.satisfied");
                return StageDecision::Satisfied;
            }
            Ok(false) => {
                info!(stage = %stage, resource = %ctx.name, "Stage resources missing, re-executing");
            }
            Err(e) => debug!(stage = %stage, error = %e, "stage.verify.failed"),
        }
    }
    if fingerprint_matches && is_blocked(stage, status) {
        debug!(stage = %stage, "stage.blocked");
        return StageDecision::Blocked;
    }

    info!(stage = %stage, resource = %ctx.name, "🔄 Executing stage");
    let outcome = stage.execute(ctx, status).await;
    apply(&outcome, status, now);

    if is_complete(stage, status) || outcome.is_terminal() {
        status.stage_fingerprints.insert(stage.name().to_string(), key);
    } else {
        status.stage_fingerprints.remove(stage.name());
    }
    if is_complete(stage, status) {
        info!(stage = %stage, resource = %ctx.name, "✅ Stage complete");
    }
    StageDecision::Executed(outcome.retry)
}

/// Conditions that must never be True while `ty`'s stage's upstream is not
#[must_use]
pub fn upstream_of(ty: ConditionType) -> Vec<ConditionType> {
    Stage::ORDER
        .iter()
        .take_while(|stage| !stage.conditions().contains(&ty))
        .flat_map(|stage| stage.conditions().iter().copied())
        .collect()
}
