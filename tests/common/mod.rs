//! Common test utilities for reconcile scenarios
//!
//! A [`World`] holds one in-memory API server, one simulated cloud and a
//! reconciler wired to both. Scenarios create objects, flip collaborator
//! readiness and run reconcile passes the way the controller runtime would.

#![allow(dead_code, reason = "not every scenario file uses every helper")]

use kube_runtime::controller::Action;
use octavia_controller::adapters::memory::{MemoryCloud, MemoryResourceStore, Mutation};
use octavia_controller::adapters::{Collaborators, ResourceHandle};
use octavia_controller::constants::CA_PASSPHRASE_KEY;
use octavia_controller::controller::conditions::ConditionType;
use octavia_controller::controller::reconciler::{
    reconcile, Reconciler, ReconcilerSettings, ResourceStore,
};
use octavia_controller::controller::stages::StageSettings;
use octavia_controller::crd::{ConditionStatus, OctaviaSpec, OctaviaStatus};
use std::sync::{Arc, Once};
use std::time::Duration;

pub const NAMESPACE: &str = "openstack";
pub const NAME: &str = "octavia";
pub const TRANSPORT_URL: &str = "octavia-octavia-transport";
pub const TRANSPORT_SECRET: &str = "rabbitmq-transport-url-octavia-octavia-transport";
pub const DB_SYNC_JOB: &str = "octavia-db-sync";
pub const DATABASE_INSTANCE: &str = "openstack";
pub const CA_PASSPHRASE_SECRET: &str = "octavia-ca-passphrase";
pub const RESYNC: Duration = Duration::from_secs(600);

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests that talk HTTP
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        stage: StageSettings {
            keystone_url: "http://keystone-public.openstack.svc:5000".to_string(),
        },
        backoff_min: Duration::from_secs(1),
        backoff_max: Duration::from_secs(8),
        resync_interval: RESYNC,
    }
}

pub fn spec() -> OctaviaSpec {
    OctaviaSpec {
        database_instance: DATABASE_INSTANCE.to_string(),
        ..OctaviaSpec::default()
    }
}

pub struct World {
    pub cloud: MemoryCloud,
    pub store: MemoryResourceStore,
    pub reconciler: Arc<Reconciler>,
}

impl World {
    /// Memory-backed world with the credentials and CA passphrase secrets
    /// and the `service` project in place
    pub fn new() -> Self {
        let cloud = MemoryCloud::new();
        let collaborators = cloud.collaborators();
        Self::with_collaborators(cloud, collaborators)
    }

    /// World whose reconciler talks to `collaborators` instead of the
    /// memory cloud's own
    pub fn with_collaborators(cloud: MemoryCloud, collaborators: Collaborators) -> Self {
        Self::with_store(cloud, collaborators, MemoryResourceStore::new(), None)
    }

    /// World whose reconciler reads through `store_override`, while
    /// [`World::store`] still gives direct access to the objects
    pub fn with_store(
        cloud: MemoryCloud,
        collaborators: Collaborators,
        store: MemoryResourceStore,
        store_override: Option<Arc<dyn ResourceStore>>,
    ) -> Self {
        cloud.create_secret(NAMESPACE, "osp-secret", &[("OctaviaPassword", "service-pw")]);
        cloud.create_secret(
            NAMESPACE,
            CA_PASSPHRASE_SECRET,
            &[(CA_PASSPHRASE_KEY, "12345678")],
        );
        cloud.register_project("service");
        let store_handle: Arc<dyn ResourceStore> =
            store_override.unwrap_or_else(|| Arc::new(store.clone()));
        Self {
            reconciler: Arc::new(Reconciler::new(store_handle, collaborators, settings())),
            cloud,
            store,
        }
    }

    pub fn create(&self) {
        self.store.create(NAMESPACE, NAME, spec());
    }

    /// One reconcile pass against the currently stored object
    pub async fn reconcile(&self) -> Action {
        let object = self
            .store
            .get(NAMESPACE, NAME)
            .expect("object should exist before reconciling");
        reconcile(Arc::new(object), Arc::clone(&self.reconciler))
            .await
            .expect("reconcile should not fail")
    }

    pub fn status(&self) -> OctaviaStatus {
        self.store
            .get(NAMESPACE, NAME)
            .and_then(|o| o.status)
            .unwrap_or_default()
    }

    pub fn condition(&self, ty: ConditionType) -> ConditionStatus {
        self.status().conditions.status_of(ty)
    }

    pub fn reason(&self, ty: ConditionType) -> String {
        self.status()
            .conditions
            .get(ty)
            .map(|c| c.reason.clone())
            .unwrap_or_default()
    }

    pub fn transport_ready(&self) {
        self.cloud
            .simulate_transport_ready(NAMESPACE, TRANSPORT_URL, TRANSPORT_SECRET);
    }

    pub fn databases_ready(&self) -> String {
        self.cloud.simulate_database_ready(NAMESPACE, "octavia");
        self.cloud
            .simulate_database_ready(NAMESPACE, "octavia-persistence");
        self.cloud
            .simulate_database_service(NAMESPACE, DATABASE_INSTANCE)
    }

    pub fn db_sync_succeeded(&self) {
        self.cloud.simulate_job_success(NAMESPACE, DB_SYNC_JOB);
    }

    /// Drive a fresh object all the way to `Ready`
    pub async fn provision(&self) {
        self.create();
        self.transport_ready();
        self.databases_ready();
        self.reconcile().await;
        self.db_sync_succeeded();
        self.reconcile().await;
    }

    /// Handles of every resource ensured so far
    pub fn ensured(&self) -> Vec<ResourceHandle> {
        self.cloud
            .journal()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::Ensure(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }
}

/// Check the ordering invariant on a status snapshot
pub fn assert_ordering(status: &OctaviaStatus) {
    let conditions = &status.conditions;
    if conditions.is_true(ConditionType::DbReady) {
        assert!(conditions.is_true(ConditionType::RabbitMqTransportUrlReady));
        assert!(conditions.is_true(ConditionType::AmphoraCertsReady));
    }
    if conditions.is_true(ConditionType::Ready) {
        for ty in ConditionType::READY_CONSTITUENTS {
            assert!(conditions.is_true(ty), "{ty} must be True while Ready is True");
        }
    }
}
