//! # External Resource Adapters
//!
//! Narrow, idempotent contracts for every collaborator the stages talk to:
//! the message-transport operator, Kubernetes secrets, identity, compute and
//! network quotas, and the database operator.
//!
//! Every `ensure_*` call is create-or-verify. Calling it against an existing
//! matching resource returns success without modification, and calling it
//! against a conflicting one overwrites it (last writer wins). Every `delete_*`
//! call reports [`CleanupOutcome::AlreadyAbsent`] instead of failing when the
//! resource is gone.
//!
//! ## Implementations
//!
//! - `kubernetes` - secrets, jobs, TransportURL and MariaDB objects via kube-rs
//! - `openstack` - Keystone, Nova and Neutron over HTTP via reqwest
//! - `memory` - in-process collaborator simulation for tests

pub mod kubernetes;
pub mod memory;
pub mod openstack;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// String-valued secret payload
pub type SecretData = BTreeMap<String, String>;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// How a failure should be handled by the stage that saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeouts, 5xx, 429, dependencies not ready yet. Retried with backoff.
    Transient,
    /// Malformed desired state or unresolvable references. Waits for a spec change.
    Permanent,
    /// Contract mismatch with a collaborator. Retried like transient, logged louder.
    Internal,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("invalid configuration: {0}")]
    Permanent(String),
    #[error("unexpected response: {0}")]
    Internal(String),
}

impl AdapterError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            AdapterError::Transient(_) => ErrorClass::Transient,
            AdapterError::Permanent(_) => ErrorClass::Permanent,
            AdapterError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Classify a non-success HTTP status
    #[must_use]
    pub fn from_status(code: u16, context: &str) -> Self {
        match code {
            408 | 409 | 429 | 500..=599 => {
                AdapterError::Transient(format!("{context}: HTTP {code}"))
            }
            _ => AdapterError::Permanent(format!("{context}: HTTP {code}")),
        }
    }
}

/// Reference to a sub-resource owned by one Octavia
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

impl ResourceHandle {
    #[must_use]
    pub fn new(kind: &'static str, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Result of one idempotent cleanup call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Deleted,
    AlreadyAbsent,
    /// The stage owns nothing that needs removing
    NothingToClean,
}

impl CleanupOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupOutcome::Deleted => "deleted",
            CleanupOutcome::AlreadyAbsent => "already-absent",
            CleanupOutcome::NothingToClean => "nothing-to-clean",
        }
    }
}

/// Identity of the Octavia that owns the resources being ensured
#[derive(Debug, Clone)]
pub struct Owner {
    pub namespace: String,
    pub name: String,
    /// Controller owner reference for cascading deletion, absent for objects
    /// that were never persisted (unit tests)
    pub reference: Option<OwnerReference>,
}

impl Owner {
    /// Labels stamped on every owned resource
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            crate::constants::OWNER_LABEL.to_string(),
            self.name.clone(),
        )])
    }
}

/// Observed state of a TransportURL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportStatus {
    Pending(String),
    Ready { secret_name: String },
}

/// Observed state of one logical database and its account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseStatus {
    Pending(String),
    Ready { hostname: String },
}

/// Observed state of the schema migration job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed(String),
}

/// One logical database on a shared instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRequest {
    /// MariaDB instance hosting the database
    pub instance: String,
    /// Object name of the database request
    pub cr_name: String,
    /// Schema name inside the instance
    pub database_name: String,
    /// Account granted access to the schema
    pub account: String,
}

/// Username and password of a database account
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Schema migration job to run against the database instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSyncJob {
    pub name: String,
    /// Changes whenever the database inputs change, forcing a re-run
    pub hash: String,
    pub instance: String,
    pub accounts: Vec<String>,
}

/// Resource family a quota set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuotaFamily {
    Compute,
    Network,
}

impl QuotaFamily {
    /// Quota names the controller pins for this family
    #[must_use]
    pub fn managed_keys(&self) -> &'static [&'static str] {
        match self {
            QuotaFamily::Compute => &[
                "ram",
                "cores",
                "instances",
                "server_groups",
                "server_group_members",
            ],
            QuotaFamily::Network => &["port", "security_group", "security_group_rule"],
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaFamily::Compute => "compute",
            QuotaFamily::Network => "network",
        }
    }
}

/// Quota limits for one project and family; `-1` means unlimited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaAssignment {
    pub project_id: String,
    pub family: QuotaFamily,
    pub limits: BTreeMap<String, i64>,
}

impl QuotaAssignment {
    /// Every managed quota of `family` set to unlimited
    #[must_use]
    pub fn unlimited(project_id: &str, family: QuotaFamily) -> Self {
        Self {
            project_id: project_id.to_string(),
            family,
            limits: family
                .managed_keys()
                .iter()
                .map(|key| ((*key).to_string(), -1))
                .collect(),
        }
    }

    /// True if `current` already holds every limit of this assignment
    #[must_use]
    pub fn is_satisfied_by(&self, current: &BTreeMap<String, i64>) -> bool {
        self.limits
            .iter()
            .all(|(key, value)| current.get(key) == Some(value))
    }
}

#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Create or verify a TransportURL against `cluster`
    async fn ensure_transport_url(
        &self,
        owner: &Owner,
        name: &str,
        cluster: &str,
    ) -> AdapterResult<TransportStatus>;

    async fn delete_transport_url(&self, namespace: &str, name: &str)
        -> AdapterResult<CleanupOutcome>;
}

#[async_trait]
pub trait SecretAdapter: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> AdapterResult<Option<SecretData>>;

    /// Create or replace a secret owned by `owner`
    async fn apply_secret(
        &self,
        owner: &Owner,
        name: &str,
        data: &SecretData,
    ) -> AdapterResult<ResourceHandle>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> AdapterResult<CleanupOutcome>;
}

#[async_trait]
pub trait IdentityAdapter: Send + Sync {
    /// Resolve a project name to its id
    async fn project_id(&self, project_name: &str) -> AdapterResult<String>;
}

#[async_trait]
pub trait QuotaAdapter: Send + Sync {
    fn family(&self) -> QuotaFamily;

    async fn get_quota(&self, project_id: &str) -> AdapterResult<BTreeMap<String, i64>>;

    /// Write the limits and return the values the collaborator stored
    async fn set_quota(&self, assignment: &QuotaAssignment)
        -> AdapterResult<BTreeMap<String, i64>>;
}

#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Create or verify a logical database and its account
    async fn ensure_database(
        &self,
        owner: &Owner,
        request: &DatabaseRequest,
    ) -> AdapterResult<DatabaseStatus>;

    /// Credentials of an account, `None` until the account secret exists
    async fn account_credentials(
        &self,
        namespace: &str,
        account: &str,
    ) -> AdapterResult<Option<DatabaseCredentials>>;

    async fn delete_database(
        &self,
        namespace: &str,
        request: &DatabaseRequest,
    ) -> AdapterResult<CleanupOutcome>;

    /// Create or verify the schema migration job
    async fn ensure_db_sync_job(&self, owner: &Owner, job: &DbSyncJob) -> AdapterResult<JobStatus>;

    async fn delete_db_sync_job(&self, namespace: &str, name: &str)
        -> AdapterResult<CleanupOutcome>;
}

/// Every collaborator a reconcile pass needs
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn TransportAdapter>,
    pub secrets: Arc<dyn SecretAdapter>,
    pub identity: Arc<dyn IdentityAdapter>,
    pub compute_quota: Arc<dyn QuotaAdapter>,
    pub network_quota: Arc<dyn QuotaAdapter>,
    pub database: Arc<dyn DatabaseAdapter>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("compute_quota", &self.compute_quota.family())
            .field("network_quota", &self.network_quota.family())
            .finish_non_exhaustive()
    }
}
