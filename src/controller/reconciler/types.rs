//! # Reconciler Types
//!
//! Shared reconciler context, its error type and the persistence seam.

use crate::adapters::Collaborators;
use crate::controller::backoff::ExponentialBackoff;
use crate::controller::render::ConfigRenderer;
use crate::controller::stages::StageSettings;
use crate::crd::{Octavia, OctaviaStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Persistence of `Octavia` objects: the only writes the reconciler makes
/// to its own resource
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Current copy of the object, `None` once it is gone
    async fn fetch(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Octavia>>;

    /// Copy from a local watch cache where one exists; used for the checks
    /// between stages. Falls back to [`ResourceStore::fetch`].
    async fn fetch_cached(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Octavia>> {
        self.fetch(namespace, name).await
    }

    async fn add_finalizer(&self, octavia: &Octavia) -> anyhow::Result<()>;

    /// Remove the marker; a vanished object counts as success
    async fn remove_finalizer(&self, octavia: &Octavia) -> anyhow::Result<()>;

    async fn patch_status(&self, octavia: &Octavia, status: &OctaviaStatus) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
    #[error("Octavia object has no {0}")]
    MissingMetadata(&'static str),
}

/// Per-object retry state
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(min, max),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

/// Tunables the reconciler reads on every pass
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub stage: StageSettings,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Requeue interval once everything is ready
    pub resync_interval: Duration,
}

/// Reconciler context shared by every reconcile
pub struct Reconciler {
    pub(crate) store: Arc<dyn ResourceStore>,
    pub(crate) collaborators: Collaborators,
    pub(crate) renderer: ConfigRenderer,
    pub(crate) settings: ReconcilerSettings,
    /// Retry state keyed by `namespace/name`
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("collaborators", &self.collaborators)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn ResourceStore>,
        collaborators: Collaborators,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            collaborators,
            renderer: ConfigRenderer::new(),
            settings,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Next retry delay for `key`, advancing its backoff
    pub fn next_backoff(&self, key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(|| {
                    BackoffState::new(self.settings.backoff_min, self.settings.backoff_max)
                });
                state.increment_error();
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using minimum backoff", e);
                (self.settings.backoff_min, 0)
            }
        }
    }

    /// Forget the retry state of `key` after a clean pass
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}
