//! # Octavia Status
//!
//! Status types for tracking reconciliation state and conditions.

use crate::controller::conditions::ConditionSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of the Octavia resource
///
/// Written once per reconcile pass, and only when something changed.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OctaviaStatus {
    /// Hostname of the database instance, set once both databases are ready
    #[serde(default)]
    pub database_hostname: String,
    /// Secret holding the transport URL, set once the transport is ready
    #[serde(default, rename = "transportURLSecret")]
    pub transport_url_secret: String,
    #[serde(default, rename = "octaviaAPIReadyCount")]
    pub octavia_api_ready_count: i32,
    #[serde(default)]
    pub octavia_worker_ready_count: i32,
    #[serde(default)]
    pub octavia_housekeeping_ready_count: i32,
    #[serde(default)]
    pub octavia_health_manager_ready_count: i32,
    #[serde(default)]
    pub octavia_rsyslog_ready_count: i32,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: ConditionSet,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Idempotency key of the last terminal execution of each stage
    /// (completed or permanently failed), keyed by stage name
    #[serde(default)]
    pub stage_fingerprints: BTreeMap<String, String>,
}

/// Tri-state condition value
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition for status
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub r#type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// RFC3339 time of the last status change
    #[serde(default)]
    pub last_transition_time: String,
}
