//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `octavia_controller_reconciliations_total` - Total number of reconciliations
//! - `octavia_controller_reconciliation_errors_total` - Total number of reconciliation errors
//! - `octavia_controller_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `octavia_controller_stage_executions_total` - Stage executions by stage and result
//! - `octavia_controller_requeues_total` - Requeues by reason
//! - `octavia_controller_cleanup_steps_total` - Cleanup steps by stage and outcome
//! - `octavia_controller_resources_managed` - Octavia objects currently holding the finalizer

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "octavia_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "octavia_controller_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "octavia_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static STAGE_EXECUTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "octavia_controller_stage_executions_total",
            "Total number of stage executions by stage and result",
        ),
        &["stage", "result"],
    )
    .expect("Failed to create STAGE_EXECUTIONS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "octavia_controller_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static CLEANUP_STEPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "octavia_controller_cleanup_steps_total",
            "Total number of cleanup steps by stage and outcome",
        ),
        &["stage", "outcome"],
    )
    .expect("Failed to create CLEANUP_STEPS_TOTAL metric - this should never happen")
});

static RESOURCES_MANAGED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "octavia_controller_resources_managed",
        "Current number of Octavia objects holding the finalizer",
    )
    .expect("Failed to create RESOURCES_MANAGED metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STAGE_EXECUTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLEANUP_STEPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_MANAGED.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

/// Record one stage decision: `satisfied`, `blocked`, `skipped` or an execution result
pub fn record_stage(stage: &str, result: &str) {
    STAGE_EXECUTIONS_TOTAL
        .with_label_values(&[stage, result])
        .inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_cleanup_step(stage: &str, outcome: &str) {
    CLEANUP_STEPS_TOTAL
        .with_label_values(&[stage, outcome])
        .inc();
}

pub fn increment_resources_managed() {
    RESOURCES_MANAGED.inc();
}

pub fn decrement_resources_managed() {
    RESOURCES_MANAGED.dec();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_counter_is_labelled() {
        record_stage("quotas", "complete");
        record_stage("quotas", "complete");
        assert!(
            STAGE_EXECUTIONS_TOTAL
                .with_label_values(&["quotas", "complete"])
                .get()
                >= 2
        );
    }

    #[test]
    fn test_cleanup_counter_is_labelled() {
        record_cleanup_step("certificates", "already-absent");
        assert!(
            CLEANUP_STEPS_TOTAL
                .with_label_values(&["certificates", "already-absent"])
                .get()
                >= 1
        );
    }
}
