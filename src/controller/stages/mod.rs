//! # Stages
//!
//! The ordered provisioning stages of an Octavia deployment:
//!
//! ```text
//! Transport -> Certificates -> Quotas -> Database -> Configuration
//! ```
//!
//! Each stage owns a fixed set of conditions, derives an idempotency key from
//! the inputs it consumes, and reports what it did as a [`StageOutcome`].
//! Stages never touch the status directly; the orchestrator applies outcomes.

pub mod certificates;
pub mod configuration;
pub mod database;
pub mod quotas;
pub mod transport;

use crate::adapters::{AdapterError, AdapterResult, CleanupOutcome, Collaborators, Owner};
use crate::controller::conditions::{reason, ConditionType};
use crate::controller::render::ConfigRenderer;
use crate::crd::{ConditionStatus, Octavia, OctaviaStatus};
use sha2::{Digest, Sha256};
use tracing::{error, warn};

/// Non-spec inputs the stages need
#[derive(Debug, Clone)]
pub struct StageSettings {
    /// Keystone endpoint written into the service configuration
    pub keystone_url: String,
}

/// Everything a stage may read or call during one pass
#[derive(Debug)]
pub struct StageContext<'a> {
    pub octavia: &'a Octavia,
    pub namespace: &'a str,
    pub name: &'a str,
    pub owner: Owner,
    pub collaborators: &'a Collaborators,
    pub renderer: &'a ConfigRenderer,
    pub settings: &'a StageSettings,
}

impl StageContext<'_> {
    /// `<object name>-<suffix>`
    #[must_use]
    pub fn derived_name(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Transport,
    Certificates,
    Quotas,
    Database,
    Configuration,
}

impl Stage {
    /// Dependency order
    pub const ORDER: [Stage; 5] = [
        Stage::Transport,
        Stage::Certificates,
        Stage::Quotas,
        Stage::Database,
        Stage::Configuration,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Transport => "transport",
            Stage::Certificates => "certificates",
            Stage::Quotas => "quotas",
            Stage::Database => "database",
            Stage::Configuration => "configuration",
        }
    }

    #[must_use]
    pub fn predecessor(&self) -> Option<Stage> {
        match self {
            Stage::Transport => None,
            Stage::Certificates => Some(Stage::Transport),
            Stage::Quotas => Some(Stage::Certificates),
            Stage::Database => Some(Stage::Quotas),
            Stage::Configuration => Some(Stage::Database),
        }
    }

    /// Conditions owned by the stage; the first one is its primary condition
    #[must_use]
    pub fn conditions(&self) -> &'static [ConditionType] {
        match self {
            Stage::Transport => &[
                ConditionType::RabbitMqTransportUrlReady,
                ConditionType::InputReady,
            ],
            Stage::Certificates => &[ConditionType::AmphoraCertsReady],
            Stage::Quotas => &[ConditionType::QuotasReady],
            Stage::Database => &[ConditionType::DbReady, ConditionType::DbSyncReady],
            Stage::Configuration => &[ConditionType::ServiceConfigReady],
        }
    }

    /// SHA-256 over the object name and every input the stage consumes
    #[must_use]
    pub fn idempotency_key(&self, octavia: &Octavia, status: &OctaviaStatus) -> String {
        let spec = &octavia.spec;
        let name = octavia.metadata.name.as_deref().unwrap_or_default();
        let inputs: Vec<&str> = match self {
            Stage::Transport => vec![
                name,
                spec.rabbit_mq_cluster_name.as_str(),
                spec.tenant_name.as_str(),
                spec.database_instance.as_str(),
                spec.service_user.as_str(),
                spec.database_account.as_str(),
                spec.persistence_database_account.as_str(),
                spec.secret.as_str(),
                spec.password_selectors.service.as_str(),
            ],
            Stage::Certificates => vec![name],
            Stage::Quotas => vec![name, spec.tenant_name.as_str()],
            Stage::Database => vec![
                name,
                spec.database_instance.as_str(),
                spec.database_account.as_str(),
                spec.persistence_database_account.as_str(),
            ],
            Stage::Configuration => vec![
                name,
                spec.service_user.as_str(),
                spec.tenant_name.as_str(),
                spec.secret.as_str(),
                spec.password_selectors.service.as_str(),
                spec.database_account.as_str(),
                spec.persistence_database_account.as_str(),
                spec.custom_service_config.as_str(),
                status.database_hostname.as_str(),
                status.transport_url_secret.as_str(),
            ],
        };

        let mut hasher = Sha256::new();
        hasher.update(self.name().as_bytes());
        for input in inputs {
            hasher.update([0u8]);
            hasher.update(input.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Run the stage once
    pub async fn execute(&self, ctx: &StageContext<'_>, status: &OctaviaStatus) -> StageOutcome {
        match self {
            Stage::Transport => transport::execute(ctx).await,
            Stage::Certificates => certificates::execute(ctx).await,
            Stage::Quotas => quotas::execute(ctx).await,
            Stage::Database => database::execute(ctx, &self.idempotency_key(ctx.octavia, status)).await,
            Stage::Configuration => configuration::execute(ctx, status).await,
        }
    }

    /// Check that what a satisfied stage produced is still there
    ///
    /// Stages whose results live in collaborators outside the cluster report
    /// `true`; their readiness is re-checked when their inputs change.
    ///
    /// # Errors
    ///
    /// Returns the adapter error if the check itself fails.
    pub async fn verify(&self, ctx: &StageContext<'_>) -> AdapterResult<bool> {
        match self {
            Stage::Certificates => certificates::verify(ctx).await,
            Stage::Configuration => configuration::verify(ctx).await,
            Stage::Transport | Stage::Quotas | Stage::Database => Ok(true),
        }
    }

    /// Remove everything the stage created
    ///
    /// Every owned resource is attempted even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first adapter error seen.
    pub async fn cleanup(&self, ctx: &StageContext<'_>) -> AdapterResult<Vec<CleanupOutcome>> {
        let results = match self {
            Stage::Transport => transport::cleanup(ctx).await,
            Stage::Certificates => certificates::cleanup(ctx).await,
            Stage::Quotas => vec![Ok(CleanupOutcome::NothingToClean)],
            Stage::Database => database::cleanup(ctx).await,
            Stage::Configuration => configuration::cleanup(ctx).await,
        };
        results.into_iter().collect()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the orchestrator should do after a stage ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Nothing to retry; the stage is complete or simply waiting on its conditions
    None,
    /// Retry with backoff
    Requeue,
    /// Permanent failure, wait for a spec change
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionUpdate {
    pub ty: ConditionType,
    pub status: ConditionStatus,
    pub reason: &'static str,
    pub message: String,
}

/// Status fields a stage publishes besides conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEffect {
    TransportSecret(String),
    DatabaseHostname(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub conditions: Vec<ConditionUpdate>,
    pub effects: Vec<StageEffect>,
    pub retry: RetryHint,
}

impl Default for StageOutcome {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            effects: Vec::new(),
            retry: RetryHint::None,
        }
    }
}

impl StageOutcome {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ready(mut self, ty: ConditionType, message: impl Into<String>) -> Self {
        self.push(ty, ConditionStatus::True, reason::READY, message.into());
        self
    }

    /// Waiting on a collaborator; retried with backoff
    #[must_use]
    pub fn pending(mut self, ty: ConditionType, message: impl Into<String>) -> Self {
        self.push(ty, ConditionStatus::False, reason::REQUESTED, message.into());
        self.escalate(RetryHint::Requeue);
        self
    }

    /// Permanent failure independent of any collaborator
    #[must_use]
    pub fn invalid(mut self, ty: ConditionType, message: impl Into<String>) -> Self {
        self.push(
            ty,
            ConditionStatus::False,
            reason::INVALID_CONFIGURATION,
            message.into(),
        );
        self.escalate(RetryHint::Terminal);
        self
    }

    /// Retryable failure reported by a collaborator's own status
    #[must_use]
    pub fn error(mut self, ty: ConditionType, message: impl Into<String>) -> Self {
        self.push(ty, ConditionStatus::False, reason::ERROR, message.into());
        self.escalate(RetryHint::Requeue);
        self
    }

    /// Record an adapter failure against `ty`
    #[must_use]
    pub fn failed(mut self, ty: ConditionType, err: &AdapterError) -> Self {
        match err {
            AdapterError::Permanent(_) => {
                warn!(condition = %ty, error = %err, "stage.failed.permanent");
                self.push(
                    ty,
                    ConditionStatus::False,
                    reason::INVALID_CONFIGURATION,
                    err.to_string(),
                );
                self.escalate(RetryHint::Terminal);
            }
            AdapterError::Transient(_) => {
                warn!(condition = %ty, error = %err, "stage.failed.transient");
                self.push(ty, ConditionStatus::False, reason::ERROR, err.to_string());
                self.escalate(RetryHint::Requeue);
            }
            AdapterError::Internal(_) => {
                error!(condition = %ty, error = %err, "stage.failed.internal");
                self.push(ty, ConditionStatus::False, reason::ERROR, err.to_string());
                self.escalate(RetryHint::Requeue);
            }
        }
        self
    }

    #[must_use]
    pub fn effect(mut self, effect: StageEffect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.retry == RetryHint::Terminal
    }

    fn push(&mut self, ty: ConditionType, status: ConditionStatus, reason: &'static str, message: String) {
        self.conditions.retain(|c| c.ty != ty);
        self.conditions.push(ConditionUpdate {
            ty,
            status,
            reason,
            message,
        });
    }

    /// Terminal wins over requeue, requeue over none
    fn escalate(&mut self, hint: RetryHint) {
        self.retry = match (self.retry, hint) {
            (RetryHint::Terminal, _) | (_, RetryHint::Terminal) => RetryHint::Terminal,
            (RetryHint::Requeue, _) | (_, RetryHint::Requeue) => RetryHint::Requeue,
            _ => RetryHint::None,
        };
    }
}
