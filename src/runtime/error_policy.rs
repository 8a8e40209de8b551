//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::Octavia;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with per-object exponential backoff
///
/// Backoff state is tracked per resource so one failing object never delays
/// another.
pub fn handle_reconciliation_error(
    obj: Arc<Octavia>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {:?}", name, error);
    metrics::increment_reconciliation_errors();

    let (delay, error_count) = ctx.next_backoff(&format!("{namespace}/{name}"));
    info!(
        "🔄 Retrying with exponential backoff: {}s (error count: {}, trigger source: error-backoff)",
        delay.as_secs(),
        error_count
    );
    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}

/// How the watch loop should react to a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    Expired,
    Throttled,
    NotFound,
    Other,
}

/// Classify a watch stream error by its rendered message
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    // 404s may carry "WatchFailed" in their chain, so check them before 401
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Handle watch stream errors
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(error_string: &str, restart_delay: Duration) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!("❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("   Verify the controller can still list octavias:");
            error!("      kubectl auth can-i list octavias.octavia.openstack.org --all-namespaces");
            tokio::time::sleep(restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "watch.error.resource_version_expired");
            None
        }
        WatchErrorKind::Throttled => {
            warn!(
                "API server storage reinitializing (429), backing off for {}s before restart...",
                restart_delay.as_secs()
            );
            tokio::time::sleep(restart_delay).await;
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404) - the CRD may be missing. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_error_classification() {
        assert_eq!(
            classify_watch_error("ApiError: Unauthorized (401)"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("WatchFailed: 404 page not found"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            classify_watch_error("too old resource version: 12 (34)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("TooManyRequests: storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(classify_watch_error("connection reset"), WatchErrorKind::Other);
    }

    #[tokio::test]
    async fn test_not_found_keeps_stream() {
        assert_eq!(
            handle_watch_stream_error("ObjectNotFound", Duration::from_secs(0)).await,
            Some(())
        );
        assert_eq!(
            handle_watch_stream_error("410 Gone", Duration::from_secs(0)).await,
            None
        );
    }
}
