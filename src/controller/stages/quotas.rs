//! # Quotas Stage
//!
//! Lifts the compute and network quotas of the service project to unlimited
//! so amphorae are never throttled. A family whose managed values already
//! read `-1` is not written.

use super::{StageContext, StageOutcome};
use crate::adapters::{AdapterError, AdapterResult, QuotaAdapter, QuotaAssignment};
use crate::controller::conditions::ConditionType;
use tracing::{debug, info};

const QUOTAS: ConditionType = ConditionType::QuotasReady;

/// Bring one quota family to unlimited, writing only if needed
async fn converge(quota: &dyn QuotaAdapter, project_id: &str) -> AdapterResult<bool> {
    let family = quota.family();
    let assignment = QuotaAssignment::unlimited(project_id, family);
    let current = quota.get_quota(project_id).await?;
    if assignment.is_satisfied_by(&current) {
        debug!(family = family.as_str(), project = project_id, "quota.already-converged");
        return Ok(false);
    }

    let stored = quota.set_quota(&assignment).await?;
    if !assignment.is_satisfied_by(&stored) {
        return Err(AdapterError::Internal(format!(
            "{} quota for {project_id} was not stored as requested",
            family.as_str()
        )));
    }
    info!(family = family.as_str(), project = project_id, "📈 Quota set to unlimited");
    Ok(true)
}

pub async fn execute(ctx: &StageContext<'_>) -> StageOutcome {
    let outcome = StageOutcome::new();
    let tenant = &ctx.octavia.spec.tenant_name;

    let project_id = match ctx.collaborators.identity.project_id(tenant).await {
        Ok(id) => id,
        Err(e) => return outcome.failed(QUOTAS, &e),
    };

    for quota in [&ctx.collaborators.compute_quota, &ctx.collaborators.network_quota] {
        if let Err(e) = converge(quota.as_ref(), &project_id).await {
            return outcome.failed(QUOTAS, &e);
        }
    }
    outcome.ready(QUOTAS, "Quotas set")
}
