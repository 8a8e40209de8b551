//! # Kubernetes Adapters
//!
//! kube-rs backed collaborators:
//!
//! - [`KubeSecrets`] - owned secrets via server-side apply
//! - [`KubeTransport`] - `TransportURL` objects of the RabbitMQ operator
//! - [`KubeDatabase`] - `MariaDBDatabase`/`MariaDBAccount` objects and the db-sync `Job`
//! - [`KubeResourceStore`] - finalizer and status persistence for `Octavia`,
//!   with an [`OctaviaCache`] over the controller's reflector for cheap reads
//!
//! Operator-owned kinds are handled as `DynamicObject` so the controller does
//! not depend on their Rust types.

use super::{
    AdapterError, AdapterResult, CleanupOutcome, DatabaseAdapter, DatabaseCredentials,
    DatabaseRequest, DatabaseStatus, DbSyncJob, JobStatus, Owner, ResourceHandle, SecretAdapter,
    SecretData, TransportAdapter, TransportStatus,
};
use crate::constants::{DATABASE_PASSWORD_KEY, DB_SYNC_HASH_ANNOTATION, FIELD_MANAGER, FINALIZER};
use crate::controller::reconciler::ResourceStore;
use crate::controller::render::DB_SYNC_SCRIPT;
use crate::crd::{Octavia, OctaviaStatus};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec, Secret, SecretKeySelector, Service,
};
use k8s_openapi::ByteString;
use kube::api::{Api, ApiResource, DeleteParams, Patch, PatchParams, PostParams};
use kube::core::{DynamicObject, GroupVersionKind, ObjectMeta};
use kube::{Client, ResourceExt};
use kube_runtime::reflector::{ObjectRef, Store};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

fn operator_resource(group: &str, kind: &str) -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: group.to_string(),
        version: "v1beta1".to_string(),
        kind: kind.to_string(),
    })
}

#[must_use]
pub fn transport_url_resource() -> ApiResource {
    operator_resource("rabbitmq.openstack.org", "TransportURL")
}

#[must_use]
pub fn mariadb_database_resource() -> ApiResource {
    operator_resource("mariadb.openstack.org", "MariaDBDatabase")
}

#[must_use]
pub fn mariadb_account_resource() -> ApiResource {
    operator_resource("mariadb.openstack.org", "MariaDBAccount")
}

/// Operator-owned kinds the controller creates with an owner reference
#[must_use]
pub fn owned_operator_resources() -> [ApiResource; 3] {
    [
        transport_url_resource(),
        mariadb_database_resource(),
        mariadb_account_resource(),
    ]
}

/// Map a kube error onto the adapter taxonomy
pub(crate) fn classify_kube_error(error: &kube::Error, context: &str) -> AdapterError {
    match error {
        kube::Error::Api(api_err) => match api_err.code {
            409 | 429 | 500..=599 => {
                AdapterError::Transient(format!("{context}: {}", api_err.message))
            }
            _ => AdapterError::Permanent(format!("{context}: {}", api_err.message)),
        },
        kube::Error::SerdeError(e) => AdapterError::Internal(format!("{context}: {e}")),
        other => AdapterError::Transient(format!("{context}: {other}")),
    }
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(api_err) if api_err.code == 404)
}

fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(api_err) if api_err.code == 409)
}

async fn delete_named<K>(api: &Api<K>, name: &str, context: &str) -> AdapterResult<CleanupOutcome>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            info!("🗑️  Deleted {} {}", context, name);
            Ok(CleanupOutcome::Deleted)
        }
        Err(e) if is_not_found(&e) => Ok(CleanupOutcome::AlreadyAbsent),
        Err(e) => Err(classify_kube_error(&e, context)),
    }
}

/// Merge two cleanup results, `Deleted` wins
fn combine(a: CleanupOutcome, b: CleanupOutcome) -> CleanupOutcome {
    if a == CleanupOutcome::Deleted || b == CleanupOutcome::Deleted {
        CleanupOutcome::Deleted
    } else {
        CleanupOutcome::AlreadyAbsent
    }
}

fn owned_metadata(owner: &Owner, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(owner.namespace.clone()),
        labels: Some(owner.labels()),
        owner_references: owner.reference.clone().map(|r| vec![r]),
        ..ObjectMeta::default()
    }
}

fn owned_metadata_json(owner: &Owner, name: &str, extra_labels: &[(&str, &str)]) -> serde_json::Value {
    let mut labels = owner.labels();
    for (key, value) in extra_labels {
        labels.insert((*key).to_string(), (*value).to_string());
    }
    let mut metadata = json!({
        "name": name,
        "namespace": owner.namespace,
        "labels": labels,
    });
    if let Some(reference) = &owner.reference {
        metadata["ownerReferences"] = json!([reference]);
    }
    metadata
}

/// True if `status.conditions` carries `Ready=True`
fn dynamic_ready(object: &DynamicObject) -> bool {
    object
        .data
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(|c| c.as_array())
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(|t| t.as_str()) == Some("Ready")
                    && c.get("status").and_then(|s| s.as_str()) == Some("True")
            })
        })
}

fn decode_secret(secret: Secret, context: &str) -> AdapterResult<SecretData> {
    secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, ByteString(bytes))| {
            String::from_utf8(bytes)
                .map(|value| (key.clone(), value))
                .map_err(|e| AdapterError::Internal(format!("{context}: key {key} is not UTF-8: {e}")))
        })
        .collect()
}

/// Secrets in the Octavia's namespace
#[derive(Clone)]
pub struct KubeSecrets {
    client: Client,
}

impl std::fmt::Debug for KubeSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecrets").finish_non_exhaustive()
    }
}

impl KubeSecrets {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretAdapter for KubeSecrets {
    async fn get_secret(&self, namespace: &str, name: &str) -> AdapterResult<Option<SecretData>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let context = format!("secret {namespace}/{name}");
        match api.get_opt(name).await {
            Ok(Some(secret)) => decode_secret(secret, &context).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(classify_kube_error(&e, &context)),
        }
    }

    async fn apply_secret(
        &self,
        owner: &Owner,
        name: &str,
        data: &SecretData,
    ) -> AdapterResult<ResourceHandle> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &owner.namespace);
        let secret = Secret {
            metadata: owned_metadata(owner, name),
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.clone(), ByteString(v.clone().into_bytes())))
                    .collect(),
            ),
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        };
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&secret),
        )
        .await
        .map_err(|e| classify_kube_error(&e, &format!("apply secret {name}")))?;
        debug!(secret = name, namespace = owner.namespace.as_str(), "secret.applied");
        Ok(ResourceHandle::new("Secret", &owner.namespace, name))
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> AdapterResult<CleanupOutcome> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        delete_named(&api, name, "secret").await
    }
}

/// TransportURL requests against the RabbitMQ operator
#[derive(Clone)]
pub struct KubeTransport {
    client: Client,
    resource: ApiResource,
}

impl std::fmt::Debug for KubeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeTransport")
            .field("kind", &self.resource.kind)
            .finish_non_exhaustive()
    }
}

impl KubeTransport {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: transport_url_resource(),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait]
impl TransportAdapter for KubeTransport {
    async fn ensure_transport_url(
        &self,
        owner: &Owner,
        name: &str,
        cluster: &str,
    ) -> AdapterResult<TransportStatus> {
        let body = json!({
            "apiVersion": self.resource.api_version,
            "kind": self.resource.kind,
            "metadata": owned_metadata_json(owner, name, &[]),
            "spec": { "rabbitmqClusterName": cluster },
        });
        let object = self
            .api(&owner.namespace)
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&body),
            )
            .await
            .map_err(|e| classify_kube_error(&e, &format!("apply TransportURL {name}")))?;

        let secret_name = object
            .data
            .get("status")
            .and_then(|s| s.get("secretName"))
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty());

        match secret_name {
            Some(secret_name) if dynamic_ready(&object) => Ok(TransportStatus::Ready {
                secret_name: secret_name.to_string(),
            }),
            _ => Ok(TransportStatus::Pending(format!(
                "TransportURL {name} not ready"
            ))),
        }
    }

    async fn delete_transport_url(
        &self,
        namespace: &str,
        name: &str,
    ) -> AdapterResult<CleanupOutcome> {
        delete_named(&self.api(namespace), name, "TransportURL").await
    }
}

/// Databases, accounts and the db-sync job
#[derive(Clone)]
pub struct KubeDatabase {
    client: Client,
    database: ApiResource,
    account: ApiResource,
    db_sync_image: String,
}

impl std::fmt::Debug for KubeDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeDatabase")
            .field("db_sync_image", &self.db_sync_image)
            .finish_non_exhaustive()
    }
}

fn account_secret_name(account: &str) -> String {
    format!("{account}-db-secret")
}

impl KubeDatabase {
    #[must_use]
    pub fn new(client: Client, db_sync_image: &str) -> Self {
        Self {
            client,
            database: mariadb_database_resource(),
            account: mariadb_account_resource(),
            db_sync_image: db_sync_image.to_string(),
        }
    }

    fn dynamic(&self, namespace: &str, resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }

    /// Create the account password secret once; an existing one is kept
    async fn ensure_account_secret(&self, owner: &Owner, account: &str) -> AdapterResult<String> {
        let name = account_secret_name(account);
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &owner.namespace);
        let context = format!("account secret {name}");
        if api
            .get_opt(&name)
            .await
            .map_err(|e| classify_kube_error(&e, &context))?
            .is_some()
        {
            return Ok(name);
        }

        let password = uuid::Uuid::new_v4().simple().to_string();
        let secret = Secret {
            metadata: owned_metadata(owner, &name),
            data: Some(BTreeMap::from([(
                DATABASE_PASSWORD_KEY.to_string(),
                ByteString(password.into_bytes()),
            )])),
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        };
        match api.create(&PostParams::default(), &secret).await {
            Ok(_) => {
                info!("🔑 Created database account secret {}", name);
                Ok(name)
            }
            Err(e) if is_conflict(&e) => Ok(name),
            Err(e) => Err(classify_kube_error(&e, &context)),
        }
    }

    fn db_sync_job(&self, owner: &Owner, job: &DbSyncJob) -> Job {
        let mut metadata = owned_metadata(owner, &job.name);
        metadata.annotations = Some(BTreeMap::from([(
            DB_SYNC_HASH_ANNOTATION.to_string(),
            job.hash.clone(),
        )]));

        let mut env = vec![EnvVar {
            name: "DB_HOST".to_string(),
            value: Some(format!("{}.{}.svc", job.instance, owner.namespace)),
            ..EnvVar::default()
        }];
        for (index, account) in job.accounts.iter().enumerate() {
            env.push(EnvVar {
                name: format!("DB_USER_{index}"),
                value: Some(account.clone()),
                ..EnvVar::default()
            });
            env.push(EnvVar {
                name: format!("DB_PASSWORD_{index}"),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: account_secret_name(account),
                        key: DATABASE_PASSWORD_KEY.to_string(),
                        optional: Some(false),
                    }),
                    ..EnvVarSource::default()
                }),
                ..EnvVar::default()
            });
        }

        Job {
            metadata,
            spec: Some(JobSpec {
                backoff_limit: Some(6),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(owner.labels()),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some("OnFailure".to_string()),
                        containers: vec![Container {
                            name: "octavia-db-sync".to_string(),
                            image: Some(self.db_sync_image.clone()),
                            command: Some(vec!["/bin/bash".to_string(), "-c".to_string()]),
                            args: Some(vec![DB_SYNC_SCRIPT.to_string()]),
                            env: Some(env),
                            ..Container::default()
                        }],
                        ..PodSpec::default()
                    }),
                },
                ..JobSpec::default()
            }),
            ..Job::default()
        }
    }
}

fn job_status(job: &Job) -> JobStatus {
    let Some(status) = &job.status else {
        return JobStatus::Running;
    };
    if status.succeeded.unwrap_or(0) > 0 {
        return JobStatus::Succeeded;
    }
    status
        .conditions
        .as_ref()
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.type_ == "Failed" && c.status == "True")
        })
        .map_or(JobStatus::Running, |c| {
            JobStatus::Failed(
                c.message
                    .clone()
                    .unwrap_or_else(|| "db-sync job failed".to_string()),
            )
        })
}

#[async_trait]
impl DatabaseAdapter for KubeDatabase {
    async fn ensure_database(
        &self,
        owner: &Owner,
        request: &DatabaseRequest,
    ) -> AdapterResult<DatabaseStatus> {
        let secret_name = self.ensure_account_secret(owner, &request.account).await?;
        let params = PatchParams::apply(FIELD_MANAGER).force();

        let account_body = json!({
            "apiVersion": self.account.api_version,
            "kind": self.account.kind,
            "metadata": owned_metadata_json(owner, &request.account, &[("mariaDBDatabaseName", request.cr_name.as_str())]),
            "spec": { "userName": request.account, "secret": secret_name },
        });
        let account = self
            .dynamic(&owner.namespace, &self.account)
            .patch(&request.account, &params, &Patch::Apply(&account_body))
            .await
            .map_err(|e| classify_kube_error(&e, &format!("apply MariaDBAccount {}", request.account)))?;

        let database_body = json!({
            "apiVersion": self.database.api_version,
            "kind": self.database.kind,
            "metadata": owned_metadata_json(owner, &request.cr_name, &[("dbName", request.instance.as_str())]),
            "spec": { "name": request.database_name, "defaultCharacterSet": "utf8" },
        });
        let database = self
            .dynamic(&owner.namespace, &self.database)
            .patch(&request.cr_name, &params, &Patch::Apply(&database_body))
            .await
            .map_err(|e| classify_kube_error(&e, &format!("apply MariaDBDatabase {}", request.cr_name)))?;

        if !dynamic_ready(&database) {
            return Ok(DatabaseStatus::Pending(format!(
                "MariaDBDatabase {} not ready",
                request.cr_name
            )));
        }
        if !dynamic_ready(&account) {
            return Ok(DatabaseStatus::Pending(format!(
                "MariaDBAccount {} not ready",
                request.account
            )));
        }

        let services: Api<Service> = Api::namespaced(self.client.clone(), &owner.namespace);
        match services
            .get_opt(&request.instance)
            .await
            .map_err(|e| classify_kube_error(&e, &format!("service {}", request.instance)))?
        {
            Some(service) => Ok(DatabaseStatus::Ready {
                hostname: format!("{}.{}.svc", service.name_any(), owner.namespace),
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
        let context = format!("MariaDBAccount {account}");
        let Some(object) = self
            .dynamic(namespace, &self.account)
            .get_opt(account)
            .await
            .map_err(|e| classify_kube_error(&e, &context))?
        else {
            return Ok(None);
        };

        let spec = object.data.get("spec");
        let field = |key: &str| {
            spec.and_then(|s| s.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let (Some(username), Some(secret_name)) = (field("userName"), field("secret")) else {
            return Err(AdapterError::Internal(format!(
                "{context}: spec is missing userName or secret"
            )));
        };

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api
            .get_opt(&secret_name)
            .await
            .map_err(|e| classify_kube_error(&e, &context))?
        else {
            return Ok(None);
        };
        let data = decode_secret(secret, &context)?;
        Ok(data
            .get(DATABASE_PASSWORD_KEY)
            .filter(|p| !p.is_empty())
            .map(|password| DatabaseCredentials {
                username,
                password: password.clone(),
            }))
    }

    async fn delete_database(
        &self,
        namespace: &str,
        request: &DatabaseRequest,
    ) -> AdapterResult<CleanupOutcome> {
        let database =
            delete_named(&self.dynamic(namespace, &self.database), &request.cr_name, "MariaDBDatabase")
                .await?;
        let account =
            delete_named(&self.dynamic(namespace, &self.account), &request.account, "MariaDBAccount")
                .await?;
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = delete_named(&secrets, &account_secret_name(&request.account), "secret").await?;
        Ok(combine(combine(database, account), secret))
    }

    async fn ensure_db_sync_job(&self, owner: &Owner, job: &DbSyncJob) -> AdapterResult<JobStatus> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &owner.namespace);
        let context = format!("job {}", job.name);
        match api
            .get_opt(&job.name)
            .await
            .map_err(|e| classify_kube_error(&e, &context))?
        {
            Some(existing)
                if existing.annotations().get(DB_SYNC_HASH_ANNOTATION) == Some(&job.hash) =>
            {
                Ok(job_status(&existing))
            }
            Some(_) => {
                info!("♻️  Database inputs changed, replacing job {}", job.name);
                delete_named(&api, &job.name, "job").await?;
                Ok(JobStatus::Running)
            }
            None => match api.create(&PostParams::default(), &self.db_sync_job(owner, job)).await {
                Ok(_) => {
                    info!("🚀 Created db-sync job {}", job.name);
                    Ok(JobStatus::Running)
                }
                Err(e) if is_conflict(&e) => Ok(JobStatus::Running),
                Err(e) => Err(classify_kube_error(&e, &context)),
            },
        }
    }

    async fn delete_db_sync_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> AdapterResult<CleanupOutcome> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        delete_named(&api, name, "job").await
    }
}

/// Persists finalizers and status of `Octavia` objects
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
    cache: OctaviaCache,
}

/// The running controller's reflector store, replaced on every watch restart
#[derive(Clone, Default)]
pub struct OctaviaCache {
    store: Arc<RwLock<Option<Store<Octavia>>>>,
}

impl std::fmt::Debug for OctaviaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctaviaCache").finish_non_exhaustive()
    }
}

impl OctaviaCache {
    pub async fn attach(&self, store: Store<Octavia>) {
        *self.store.write().await = Some(store);
    }

    /// Cached copy of the object, `None` on a miss or before a store is attached
    pub async fn get(&self, namespace: &str, name: &str) -> Option<Octavia> {
        let guard = self.store.read().await;
        guard
            .as_ref()?
            .get(&ObjectRef::new(name).within(namespace))
            .map(|octavia| (*octavia).clone())
    }
}

impl std::fmt::Debug for KubeResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceStore").finish_non_exhaustive()
    }
}

impl KubeResourceStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: OctaviaCache::default(),
        }
    }

    /// Handle the watch loop attaches its reflector store to
    #[must_use]
    pub fn cache(&self) -> OctaviaCache {
        self.cache.clone()
    }

    fn api(&self, namespace: &str) -> Api<Octavia> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_finalizers(&self, octavia: &Octavia, finalizers: Vec<String>) -> anyhow::Result<()> {
        let namespace = octavia.namespace().unwrap_or_default();
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.api(&namespace)
            .patch(
                &octavia.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn fetch(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Octavia>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    /// A cache miss is confirmed against the API server before the object
    /// counts as gone
    async fn fetch_cached(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Octavia>> {
        match self.cache.get(namespace, name).await {
            Some(octavia) => Ok(Some(octavia)),
            None => self.fetch(namespace, name).await,
        }
    }

    async fn add_finalizer(&self, octavia: &Octavia) -> anyhow::Result<()> {
        let mut finalizers = octavia.finalizers().to_vec();
        if !finalizers.iter().any(|f| f == FINALIZER) {
            finalizers.push(FINALIZER.to_string());
        }
        self.patch_finalizers(octavia, finalizers).await
    }

    async fn remove_finalizer(&self, octavia: &Octavia) -> anyhow::Result<()> {
        let finalizers: Vec<String> = octavia
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != FINALIZER)
            .cloned()
            .collect();
        match self.patch_finalizers(octavia, finalizers).await {
            Err(e)
                if e.downcast_ref::<kube::Error>().is_some_and(is_not_found) =>
            {
                Ok(())
            }
            other => other,
        }
    }

    async fn patch_status(&self, octavia: &Octavia, status: &OctaviaStatus) -> anyhow::Result<()> {
        let namespace = octavia.namespace().unwrap_or_default();
        let patch = json!({
            "apiVersion": "octavia.openstack.org/v1beta1",
            "kind": "Octavia",
            "status": status,
        });
        self.api(&namespace)
            .patch_status(
                &octavia.name_any(),
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&patch),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus as K8sJobStatus};

    fn dynamic(data: serde_json::Value) -> DynamicObject {
        let mut object = DynamicObject::new(
            "x",
            &ApiResource::from_gvk(&GroupVersionKind {
                group: "g".into(),
                version: "v1".into(),
                kind: "K".into(),
            }),
        );
        object.data = data;
        object
    }

    #[test]
    fn test_dynamic_ready_requires_ready_true() {
        assert!(dynamic_ready(&dynamic(json!({
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        }))));
        assert!(!dynamic_ready(&dynamic(json!({
            "status": {"conditions": [{"type": "Ready", "status": "False"}]}
        }))));
        assert!(!dynamic_ready(&dynamic(json!({"spec": {}}))));
    }

    #[test]
    fn test_job_status_mapping() {
        let mut job = Job::default();
        assert_eq!(job_status(&job), JobStatus::Running);

        job.status = Some(K8sJobStatus {
            succeeded: Some(1),
            ..K8sJobStatus::default()
        });
        assert_eq!(job_status(&job), JobStatus::Succeeded);

        job.status = Some(K8sJobStatus {
            conditions: Some(vec![JobCondition {
                type_: "Failed".to_string(),
                status: "True".to_string(),
                message: Some("BackoffLimitExceeded".to_string()),
                ..JobCondition::default()
            }]),
            ..K8sJobStatus::default()
        });
        assert_eq!(
            job_status(&job),
            JobStatus::Failed("BackoffLimitExceeded".to_string())
        );
    }

    #[test]
    fn test_combine_prefers_deleted() {
        assert_eq!(
            combine(CleanupOutcome::AlreadyAbsent, CleanupOutcome::Deleted),
            CleanupOutcome::Deleted
        );
        assert_eq!(
            combine(CleanupOutcome::AlreadyAbsent, CleanupOutcome::AlreadyAbsent),
            CleanupOutcome::AlreadyAbsent
        );
    }

    #[test]
    fn test_decode_secret_rejects_non_utf8() {
        let secret = Secret {
            data: Some(BTreeMap::from([(
                "bad".to_string(),
                ByteString(vec![0xff, 0xfe]),
            )])),
            ..Secret::default()
        };
        let err = decode_secret(secret, "secret ns/x").unwrap_err();
        assert_eq!(err.class(), super::super::ErrorClass::Internal);
    }

    #[test]
    fn test_owned_operator_resources_resolve_plurals() {
        let plurals: Vec<String> = owned_operator_resources()
            .into_iter()
            .map(|r| r.plural)
            .collect();
        assert_eq!(plurals, vec!["transporturls", "mariadbdatabases", "mariadbaccounts"]);
        assert_eq!(transport_url_resource().api_version, "rabbitmq.openstack.org/v1beta1");
    }

    #[tokio::test]
    async fn test_cache_serves_attached_reflector() {
        use kube_runtime::{reflector, watcher};

        let cache = OctaviaCache::default();
        assert!(cache.get("openstack", "octavia").await.is_none());

        let (reader, mut writer) = reflector::store::<Octavia>();
        let mut octavia = Octavia::new("octavia", crate::crd::OctaviaSpec::default());
        octavia.metadata.namespace = Some("openstack".to_string());
        octavia.metadata.generation = Some(4);
        writer.apply_watcher_event(&watcher::Event::Apply(octavia));
        cache.attach(reader).await;

        let cached = cache.get("openstack", "octavia").await.unwrap();
        assert_eq!(cached.metadata.generation, Some(4));
        assert!(cache.get("openstack", "other").await.is_none());
        assert!(cache.get("other", "octavia").await.is_none());
    }
}
