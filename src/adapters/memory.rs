//! # In-Memory Collaborators
//!
//! Process-local simulation of every collaborator the controller talks to.
//! State lives in an explicit map behind a handle; clones share it.
//!
//! Readiness is never automatic. Tests drive it with the `simulate_*`
//! helpers, the same way an operator would eventually report it, and inspect
//! every mutating call through [`MemoryCloud::journal`].

use super::{
    AdapterError, AdapterResult, CleanupOutcome, Collaborators, DatabaseAdapter,
    DatabaseCredentials, DatabaseRequest, DatabaseStatus, DbSyncJob, ErrorClass, IdentityAdapter,
    JobStatus, Owner, QuotaAdapter, QuotaAssignment, QuotaFamily, ResourceHandle, SecretAdapter,
    SecretData, TransportAdapter, TransportStatus,
};
use crate::constants::{FINALIZER, TRANSPORT_URL_KEY};
use crate::controller::reconciler::ResourceStore;
use crate::crd::{Octavia, OctaviaSpec, OctaviaStatus};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    EnsureTransport,
    DeleteTransport,
    GetSecret,
    ApplySecret,
    DeleteSecret,
    ProjectId,
    GetQuota,
    SetQuota,
    EnsureDatabase,
    DeleteDatabase,
    EnsureJob,
    DeleteJob,
}

/// One mutating call observed by the simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Ensure(ResourceHandle),
    Delete(ResourceHandle, CleanupOutcome),
    SetQuota { family: QuotaFamily, project_id: String },
}

#[derive(Debug)]
struct Transport {
    cluster: String,
}

#[derive(Debug)]
struct Job {
    hash: String,
    status: JobStatus,
}

#[derive(Debug, Default)]
struct CloudState {
    transports: BTreeMap<Key, Transport>,
    ready_transports: BTreeMap<Key, String>,
    secrets: BTreeMap<Key, SecretData>,
    projects: BTreeMap<String, String>,
    quotas: BTreeMap<(QuotaFamily, String), BTreeMap<String, i64>>,
    databases: BTreeMap<Key, DatabaseRequest>,
    ready_databases: BTreeSet<Key>,
    accounts: BTreeMap<Key, String>,
    services: BTreeMap<Key, String>,
    jobs: BTreeMap<Key, Job>,
    failures: BTreeMap<Operation, ErrorClass>,
    journal: Vec<Mutation>,
}

impl CloudState {
    fn check(&self, operation: Operation) -> AdapterResult<()> {
        match self.failures.get(&operation) {
            None => Ok(()),
            Some(ErrorClass::Transient) => Err(AdapterError::Transient(format!(
                "simulated outage during {operation:?}"
            ))),
            Some(ErrorClass::Permanent) => Err(AdapterError::Permanent(format!(
                "simulated rejection of {operation:?}"
            ))),
            Some(ErrorClass::Internal) => Err(AdapterError::Internal(format!(
                "simulated malformed response to {operation:?}"
            ))),
        }
    }

    fn delete<V>(
        map: &mut BTreeMap<Key, V>,
        journal: &mut Vec<Mutation>,
        kind: &'static str,
        namespace: &str,
        name: &str,
    ) -> CleanupOutcome {
        let outcome = if map.remove(&key(namespace, name)).is_some() {
            CleanupOutcome::Deleted
        } else {
            CleanupOutcome::AlreadyAbsent
        };
        journal.push(Mutation::Delete(
            ResourceHandle::new(kind, namespace, name),
            outcome,
        ));
        outcome
    }
}

/// Default compute quota handed to projects that were never set
pub fn default_compute_quota() -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("ram".to_string(), 100),
        ("cores".to_string(), 100),
        ("instances".to_string(), 50),
        ("server_groups".to_string(), 10),
        ("server_group_members".to_string(), 10),
    ])
}

/// Default network quota handed to projects that were never set
pub fn default_network_quota() -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("port".to_string(), 500),
        ("security_group".to_string(), 10),
        ("security_group_rule".to_string(), 100),
    ])
}

/// Shared handle on the simulated collaborators
#[derive(Debug, Clone, Default)]
pub struct MemoryCloud {
    state: Arc<Mutex<CloudState>>,
}

impl MemoryCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All collaborators backed by this simulation
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            transport: Arc::new(self.clone()),
            secrets: Arc::new(self.clone()),
            identity: Arc::new(self.clone()),
            compute_quota: Arc::new(self.quota(QuotaFamily::Compute)),
            network_quota: Arc::new(self.quota(QuotaFamily::Network)),
            database: Arc::new(self.clone()),
        }
    }

    #[must_use]
    pub fn quota(&self, family: QuotaFamily) -> MemoryQuota {
        MemoryQuota {
            cloud: self.clone(),
            family,
        }
    }

    /// Make every call of `operation` fail with `class` until cleared
    pub fn inject_failure(&self, operation: Operation, class: ErrorClass) {
        self.state().failures.insert(operation, class);
    }

    pub fn clear_failure(&self, operation: Operation) {
        self.state().failures.remove(&operation);
    }

    /// Create a secret the controller does not own
    pub fn create_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        self.state().secrets.insert(
            key(namespace, name),
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
    }

    /// Drop a secret behind the controller's back; not journaled
    pub fn remove_secret(&self, namespace: &str, name: &str) {
        self.state().secrets.remove(&key(namespace, name));
    }

    /// Register a Keystone project and return its id
    pub fn register_project(&self, name: &str) -> String {
        let id = format!("{name}-project-id");
        self.state().projects.insert(name.to_string(), id.clone());
        id
    }

    /// Report the TransportURL ready and publish its secret
    pub fn simulate_transport_ready(&self, namespace: &str, name: &str, secret_name: &str) {
        let mut state = self.state();
        state
            .ready_transports
            .insert(key(namespace, name), secret_name.to_string());
        state.secrets.insert(
            key(namespace, secret_name),
            BTreeMap::from([(
                TRANSPORT_URL_KEY.to_string(),
                format!("rabbit://user:pass@{name}.{namespace}.svc:5672"),
            )]),
        );
    }

    /// Report a logical database and its account ready
    pub fn simulate_database_ready(&self, namespace: &str, cr_name: &str) {
        self.state().ready_databases.insert(key(namespace, cr_name));
    }

    /// Publish the service in front of a database instance
    pub fn simulate_database_service(&self, namespace: &str, instance: &str) -> String {
        let hostname = format!("hostname-for-{instance}.{namespace}.svc");
        self.state()
            .services
            .insert(key(namespace, instance), hostname.clone());
        hostname
    }

    pub fn simulate_job_success(&self, namespace: &str, name: &str) {
        if let Some(job) = self.state().jobs.get_mut(&key(namespace, name)) {
            job.status = JobStatus::Succeeded;
        }
    }

    pub fn simulate_job_failure(&self, namespace: &str, name: &str, message: &str) {
        if let Some(job) = self.state().jobs.get_mut(&key(namespace, name)) {
            job.status = JobStatus::Failed(message.to_string());
        }
    }

    #[must_use]
    pub fn secret(&self, namespace: &str, name: &str) -> Option<SecretData> {
        self.state().secrets.get(&key(namespace, name)).cloned()
    }

    #[must_use]
    pub fn stored_quota(&self, family: QuotaFamily, project_id: &str) -> Option<BTreeMap<String, i64>> {
        self.state()
            .quotas
            .get(&(family, project_id.to_string()))
            .cloned()
    }

    /// Overwrite a quota out of band
    pub fn set_stored_quota(&self, family: QuotaFamily, project_id: &str, limits: BTreeMap<String, i64>) {
        self.state()
            .quotas
            .insert((family, project_id.to_string()), limits);
    }

    #[must_use]
    pub fn account_password(&self, namespace: &str, account: &str) -> Option<String> {
        self.state().accounts.get(&key(namespace, account)).cloned()
    }

    #[must_use]
    pub fn transport_exists(&self, namespace: &str, name: &str) -> bool {
        self.state().transports.contains_key(&key(namespace, name))
    }

    #[must_use]
    pub fn database_exists(&self, namespace: &str, cr_name: &str) -> bool {
        self.state().databases.contains_key(&key(namespace, cr_name))
    }

    #[must_use]
    pub fn job_exists(&self, namespace: &str, name: &str) -> bool {
        self.state().jobs.contains_key(&key(namespace, name))
    }

    /// Every mutating call so far, in order
    #[must_use]
    pub fn journal(&self) -> Vec<Mutation> {
        self.state().journal.clone()
    }
}

#[async_trait]
impl TransportAdapter for MemoryCloud {
    async fn ensure_transport_url(
        &self,
        owner: &Owner,
        name: &str,
        cluster: &str,
    ) -> AdapterResult<TransportStatus> {
        let mut state = self.state();
        state.check(Operation::EnsureTransport)?;
        let id = key(&owner.namespace, name);
        let changed = state
            .transports
            .get(&id)
            .is_none_or(|existing| existing.cluster != cluster);
        if changed {
            state.transports.insert(
                id.clone(),
                Transport {
                    cluster: cluster.to_string(),
                },
            );
            state.journal.push(Mutation::Ensure(ResourceHandle::new(
                "TransportURL",
                &owner.namespace,
                name,
            )));
        }
        Ok(match state.ready_transports.get(&id) {
            Some(secret_name) => TransportStatus::Ready {
                secret_name: secret_name.clone(),
            },
            None => TransportStatus::Pending(format!("TransportURL {name} not ready")),
        })
    }

    async fn delete_transport_url(&self, namespace: &str, name: &str) -> AdapterResult<CleanupOutcome> {
        let mut state = self.state();
        state.check(Operation::DeleteTransport)?;
        state.ready_transports.remove(&key(namespace, name));
        let CloudState {
            transports, journal, ..
        } = &mut *state;
        Ok(CloudState::delete(transports, journal, "TransportURL", namespace, name))
    }
}

#[async_trait]
impl SecretAdapter for MemoryCloud {
    async fn get_secret(&self, namespace: &str, name: &str) -> AdapterResult<Option<SecretData>> {
        let state = self.state();
        state.check(Operation::GetSecret)?;
        Ok(state.secrets.get(&key(namespace, name)).cloned())
    }

    async fn apply_secret(
        &self,
        owner: &Owner,
        name: &str,
        data: &SecretData,
    ) -> AdapterResult<ResourceHandle> {
        let mut state = self.state();
        state.check(Operation::ApplySecret)?;
        let handle = ResourceHandle::new("Secret", &owner.namespace, name);
        state.secrets.insert(key(&owner.namespace, name), data.clone());
        state.journal.push(Mutation::Ensure(handle.clone()));
        Ok(handle)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> AdapterResult<CleanupOutcome> {
        let mut state = self.state();
        state.check(Operation::DeleteSecret)?;
        let CloudState {
            secrets, journal, ..
        } = &mut *state;
        Ok(CloudState::delete(secrets, journal, "Secret", namespace, name))
    }
}

#[async_trait]
impl IdentityAdapter for MemoryCloud {
    async fn project_id(&self, project_name: &str) -> AdapterResult<String> {
        let state = self.state();
        state.check(Operation::ProjectId)?;
        state
            .projects
            .get(project_name)
            .cloned()
            .ok_or_else(|| AdapterError::Permanent(format!("project {project_name} not found")))
    }
}

#[async_trait]
impl DatabaseAdapter for MemoryCloud {
    async fn ensure_database(
        &self,
        owner: &Owner,
        request: &DatabaseRequest,
    ) -> AdapterResult<DatabaseStatus> {
        let mut state = self.state();
        state.check(Operation::EnsureDatabase)?;
        let id = key(&owner.namespace, &request.cr_name);
        if state.databases.get(&id) != Some(request) {
            state.databases.insert(id.clone(), request.clone());
            state.journal.push(Mutation::Ensure(ResourceHandle::new(
                "MariaDBDatabase",
                &owner.namespace,
                &request.cr_name,
            )));
        }
        state
            .accounts
            .entry(key(&owner.namespace, &request.account))
            .or_insert_with(|| format!("{}-password", request.account));

        if !state.ready_databases.contains(&id) {
            return Ok(DatabaseStatus::Pending(format!(
                "MariaDBDatabase {} not ready",
                request.cr_name
            )));
        }
        match state.services.get(&key(&owner.namespace, &request.instance)) {
            Some(hostname) => Ok(DatabaseStatus::Ready {
                hostname: hostname.clone(),
            }),
            None => Ok(DatabaseStatus::Pending(format!(
                "database service {} not found",
                request.instance
            ))),
        }
    }

    async fn account_credentials(
        &self,
        namespace: &str,
        account: &str,
    ) -> AdapterResult<Option<DatabaseCredentials>> {
        Ok(self
            .state()
            .accounts
            .get(&key(namespace, account))
            .map(|password| DatabaseCredentials {
                username: account.to_string(),
                password: password.clone(),
            }))
    }

    async fn delete_database(
        &self,
        namespace: &str,
        request: &DatabaseRequest,
    ) -> AdapterResult<CleanupOutcome> {
        let mut state = self.state();
        state.check(Operation::DeleteDatabase)?;
        state.accounts.remove(&key(namespace, &request.account));
        state.ready_databases.remove(&key(namespace, &request.cr_name));
        let CloudState {
            databases, journal, ..
        } = &mut *state;
        Ok(CloudState::delete(
            databases,
            journal,
            "MariaDBDatabase",
            namespace,
            &request.cr_name,
        ))
    }

    async fn ensure_db_sync_job(&self, owner: &Owner, job: &DbSyncJob) -> AdapterResult<JobStatus> {
        let mut state = self.state();
        state.check(Operation::EnsureJob)?;
        let id = key(&owner.namespace, &job.name);
        match state.jobs.get(&id) {
            Some(existing) if existing.hash == job.hash => Ok(existing.status.clone()),
            _ => {
                state.jobs.insert(
                    id,
                    Job {
                        hash: job.hash.clone(),
                        status: JobStatus::Running,
                    },
                );
                state.journal.push(Mutation::Ensure(ResourceHandle::new(
                    "Job",
                    &owner.namespace,
                    &job.name,
                )));
                Ok(JobStatus::Running)
            }
        }
    }

    async fn delete_db_sync_job(&self, namespace: &str, name: &str) -> AdapterResult<CleanupOutcome> {
        let mut state = self.state();
        state.check(Operation::DeleteJob)?;
        let CloudState { jobs, journal, .. } = &mut *state;
        Ok(CloudState::delete(jobs, journal, "Job", namespace, name))
    }
}

/// Quota service of one family backed by [`MemoryCloud`]
#[derive(Debug, Clone)]
pub struct MemoryQuota {
    cloud: MemoryCloud,
    family: QuotaFamily,
}

impl MemoryQuota {
    fn defaults(&self) -> BTreeMap<String, i64> {
        match self.family {
            QuotaFamily::Compute => default_compute_quota(),
            QuotaFamily::Network => default_network_quota(),
        }
    }
}

#[async_trait]
impl QuotaAdapter for MemoryQuota {
    fn family(&self) -> QuotaFamily {
        self.family
    }

    async fn get_quota(&self, project_id: &str) -> AdapterResult<BTreeMap<String, i64>> {
        let state = self.cloud.state();
        state.check(Operation::GetQuota)?;
        Ok(state
            .quotas
            .get(&(self.family, project_id.to_string()))
            .cloned()
            .unwrap_or_else(|| self.defaults()))
    }

    async fn set_quota(
        &self,
        assignment: &QuotaAssignment,
    ) -> AdapterResult<BTreeMap<String, i64>> {
        let defaults = self.defaults();
        let mut state = self.cloud.state();
        state.check(Operation::SetQuota)?;
        let stored = state
            .quotas
            .entry((self.family, assignment.project_id.clone()))
            .or_insert(defaults);
        stored.extend(assignment.limits.clone());
        let stored = stored.clone();
        state.journal.push(Mutation::SetQuota {
            family: self.family,
            project_id: assignment.project_id.clone(),
        });
        Ok(stored)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    objects: BTreeMap<Key, Octavia>,
    status_writes: usize,
    finalizer_writes: usize,
}

/// In-memory stand-in for the API server's view of `Octavia` objects
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a new object at generation 1 and return it
    pub fn create(&self, namespace: &str, name: &str, spec: OctaviaSpec) -> Octavia {
        let mut octavia = Octavia::new(name, spec);
        octavia.metadata.namespace = Some(namespace.to_string());
        octavia.metadata.uid = Some(format!("{namespace}-{name}-uid"));
        octavia.metadata.generation = Some(1);
        self.state()
            .objects
            .insert(key(namespace, name), octavia.clone());
        octavia
    }

    /// Current stored copy of an object
    #[must_use]
    pub fn get(&self, namespace: &str, name: &str) -> Option<Octavia> {
        self.state().objects.get(&key(namespace, name)).cloned()
    }

    /// Edit the spec and bump the generation, as an API server would
    pub fn update_spec(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut OctaviaSpec)) {
        if let Some(octavia) = self.state().objects.get_mut(&key(namespace, name)) {
            edit(&mut octavia.spec);
            octavia.metadata.generation = Some(octavia.metadata.generation.unwrap_or(0) + 1);
        }
    }

    /// Request deletion; the object stays until its finalizers are gone
    pub fn request_deletion(&self, namespace: &str, name: &str) {
        let mut state = self.state();
        let id = key(namespace, name);
        let Some(octavia) = state.objects.get_mut(&id) else {
            return;
        };
        if octavia.metadata.finalizers.as_ref().is_none_or(Vec::is_empty) {
            state.objects.remove(&id);
            return;
        }
        octavia.metadata.deletion_timestamp =
            serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).ok();
    }

    #[must_use]
    pub fn status_writes(&self) -> usize {
        self.state().status_writes
    }

    #[must_use]
    pub fn finalizer_writes(&self) -> usize {
        self.state().finalizer_writes
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn fetch(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Octavia>> {
        Ok(self.get(namespace, name))
    }

    async fn add_finalizer(&self, octavia: &Octavia) -> anyhow::Result<()> {
        let mut state = self.state();
        let id = key(
            octavia.metadata.namespace.as_deref().unwrap_or_default(),
            octavia.metadata.name.as_deref().unwrap_or_default(),
        );
        let stored = state
            .objects
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("octavia {}/{} not found", id.0, id.1))?;
        let finalizers = stored.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == FINALIZER) {
            finalizers.push(FINALIZER.to_string());
        }
        state.finalizer_writes += 1;
        Ok(())
    }

    async fn remove_finalizer(&self, octavia: &Octavia) -> anyhow::Result<()> {
        let mut state = self.state();
        let id = key(
            octavia.metadata.namespace.as_deref().unwrap_or_default(),
            octavia.metadata.name.as_deref().unwrap_or_default(),
        );
        let Some(stored) = state.objects.get_mut(&id) else {
            return Ok(());
        };
        if let Some(finalizers) = stored.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != FINALIZER);
        }
        let released = stored.metadata.deletion_timestamp.is_some()
            && stored.metadata.finalizers.as_ref().is_none_or(Vec::is_empty);
        if released {
            state.objects.remove(&id);
        }
        state.finalizer_writes += 1;
        Ok(())
    }

    async fn patch_status(&self, octavia: &Octavia, status: &OctaviaStatus) -> anyhow::Result<()> {
        let mut state = self.state();
        let id = key(
            octavia.metadata.namespace.as_deref().unwrap_or_default(),
            octavia.metadata.name.as_deref().unwrap_or_default(),
        );
        let stored = state
            .objects
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("octavia {}/{} not found", id.0, id.1))?;
        stored.status = Some(status.clone());
        state.status_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Owner {
        Owner {
            namespace: "ns".to_string(),
            name: "octavia".to_string(),
            reference: None,
        }
    }

    #[tokio::test]
    async fn test_ensure_transport_is_idempotent() {
        let cloud = MemoryCloud::new();
        let first = cloud
            .ensure_transport_url(&owner(), "t", "rabbitmq")
            .await
            .unwrap();
        let second = cloud
            .ensure_transport_url(&owner(), "t", "rabbitmq")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cloud.journal().len(), 1, "second ensure must not mutate");
    }

    #[tokio::test]
    async fn test_delete_reports_already_absent() {
        let cloud = MemoryCloud::new();
        let outcome = cloud.delete_secret("ns", "missing").await.unwrap();
        assert_eq!(outcome, CleanupOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_quota_defaults_until_set() {
        let cloud = MemoryCloud::new();
        let compute = cloud.quota(QuotaFamily::Compute);
        assert_eq!(compute.get_quota("p").await.unwrap()["instances"], 50);

        let stored = compute
            .set_quota(&QuotaAssignment::unlimited("p", QuotaFamily::Compute))
            .await
            .unwrap();
        assert_eq!(stored["instances"], -1);
        assert_eq!(
            cloud.stored_quota(QuotaFamily::Compute, "p").unwrap()["ram"],
            -1
        );
    }

    #[tokio::test]
    async fn test_injected_failure_has_requested_class() {
        let cloud = MemoryCloud::new();
        cloud.inject_failure(Operation::ProjectId, ErrorClass::Transient);
        let err = cloud.project_id("service").await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);

        cloud.clear_failure(Operation::ProjectId);
        let err = cloud.project_id("service").await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent, "unknown project");
    }

    #[tokio::test]
    async fn test_store_releases_object_when_last_finalizer_removed() {
        let store = MemoryResourceStore::new();
        let octavia = store.create("ns", "octavia", OctaviaSpec::default());
        store.add_finalizer(&octavia).await.unwrap();
        store.request_deletion("ns", "octavia");
        assert!(store.get("ns", "octavia").is_some());

        store.remove_finalizer(&octavia).await.unwrap();
        assert!(store.get("ns", "octavia").is_none());
    }
}
