//! # Conditions
//!
//! Typed collection of readiness conditions with transition bookkeeping.
//!
//! A condition's `lastTransitionTime` only moves when its status moves.
//! Reason and message may be refreshed without touching the transition time.
//!
//! The aggregate `Ready` condition is computed by [`aggregate`], a pure
//! function over an ordered list: the first `False` constituent wins, so the
//! user sees the most upstream blocking reason.

use crate::crd::{Condition, ConditionStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Condition reasons shared across stages
pub mod reason {
    /// Set on every condition when the object is first seen
    pub const INIT: &str = "Init";
    pub const READY: &str = "Ready";
    /// Waiting on a collaborator, will be retried
    pub const REQUESTED: &str = "Requested";
    /// Transient or internal failure, will be retried with backoff
    pub const ERROR: &str = "Error";
    /// Permanent failure, waits for a spec change
    pub const INVALID_CONFIGURATION: &str = "InvalidConfiguration";
    /// An upstream stage regressed after this one completed
    pub const PREDECESSOR_NOT_READY: &str = "PredecessorNotReady";
}

/// Every condition type the controller manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConditionType {
    Ready,
    InputReady,
    RabbitMqTransportUrlReady,
    AmphoraCertsReady,
    QuotasReady,
    DbReady,
    DbSyncReady,
    ServiceConfigReady,
}

impl ConditionType {
    /// All condition types, seeded as Unknown on first sight of an object
    pub const ALL: [ConditionType; 8] = [
        ConditionType::Ready,
        ConditionType::InputReady,
        ConditionType::RabbitMqTransportUrlReady,
        ConditionType::AmphoraCertsReady,
        ConditionType::QuotasReady,
        ConditionType::DbReady,
        ConditionType::DbSyncReady,
        ConditionType::ServiceConfigReady,
    ];

    /// Constituents of `Ready`, in the order their messages take precedence
    pub const READY_CONSTITUENTS: [ConditionType; 7] = [
        ConditionType::InputReady,
        ConditionType::RabbitMqTransportUrlReady,
        ConditionType::AmphoraCertsReady,
        ConditionType::QuotasReady,
        ConditionType::DbReady,
        ConditionType::DbSyncReady,
        ConditionType::ServiceConfigReady,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::InputReady => "InputReady",
            ConditionType::RabbitMqTransportUrlReady => "RabbitMqTransportURLReady",
            ConditionType::AmphoraCertsReady => "OctaviaAmphoraCertsReady",
            ConditionType::QuotasReady => "OctaviaQuotasReady",
            ConditionType::DbReady => "DBReady",
            ConditionType::DbSyncReady => "DBSyncReady",
            ConditionType::ServiceConfigReady => "ServiceConfigReady",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("condition {0} has never been set")]
    NotFound(ConditionType),
}

/// Result of aggregating an ordered list of conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

/// Aggregate an ordered list of conditions
///
/// True iff every entry is True. If any entry is False the result is False and
/// carries the reason and message of the first False entry. Otherwise the
/// result is Unknown. A missing entry counts as Unknown.
pub fn aggregate<'a, I>(ordered: I) -> Aggregate
where
    I: IntoIterator<Item = (ConditionType, Option<&'a Condition>)>,
{
    let mut first_unknown: Option<(ConditionType, Option<&'a Condition>)> = None;

    for (ty, condition) in ordered {
        match condition {
            Some(c) if c.status == ConditionStatus::True => {}
            Some(c) if c.status == ConditionStatus::False => {
                return Aggregate {
                    status: ConditionStatus::False,
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                };
            }
            _ => {
                if first_unknown.is_none() {
                    first_unknown = Some((ty, condition));
                }
            }
        }
    }

    match first_unknown {
        None => Aggregate {
            status: ConditionStatus::True,
            reason: reason::READY.to_string(),
            message: "Setup complete".to_string(),
        },
        Some((ty, condition)) => Aggregate {
            status: ConditionStatus::Unknown,
            reason: reason::INIT.to_string(),
            message: condition
                .filter(|c| !c.message.is_empty())
                .map_or_else(|| format!("{ty} not started"), |c| c.message.clone()),
        },
    }
}

/// Ordered set of conditions, serialized as a plain list
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Seed every listed type as Unknown unless already present
    pub fn init(&mut self, types: &[ConditionType], now: DateTime<Utc>) {
        for ty in types {
            if self.find(*ty).is_none() {
                self.0.push(Condition {
                    r#type: ty.as_str().to_string(),
                    status: ConditionStatus::Unknown,
                    reason: reason::INIT.to_string(),
                    message: format!("{ty} not started"),
                    last_transition_time: format_time(now),
                });
            }
        }
    }

    /// Set a condition using the current time for a transition
    ///
    /// Returns true if anything about the condition changed.
    pub fn set(
        &mut self,
        ty: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> bool {
        self.set_at(ty, status, reason, message, Utc::now())
    }

    /// Set a condition, stamping `now` only if the status changes
    pub fn set_at(
        &mut self,
        ty: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let message = message.into();
        match self.0.iter_mut().find(|c| c.r#type == ty.as_str()) {
            Some(existing) => {
                let mut changed = false;
                if existing.status != status {
                    existing.status = status;
                    existing.last_transition_time = format_time(now);
                    changed = true;
                }
                if existing.reason != reason {
                    existing.reason = reason.to_string();
                    changed = true;
                }
                if existing.message != message {
                    existing.message = message;
                    changed = true;
                }
                changed
            }
            None => {
                self.0.push(Condition {
                    r#type: ty.as_str().to_string(),
                    status,
                    reason: reason.to_string(),
                    message,
                    last_transition_time: format_time(now),
                });
                true
            }
        }
    }

    /// Get a condition that has been set before
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::NotFound`] if the type was never set.
    pub fn get(&self, ty: ConditionType) -> Result<&Condition, ConditionError> {
        self.find(ty).ok_or(ConditionError::NotFound(ty))
    }

    /// Status of a condition, Unknown if never set
    #[must_use]
    pub fn status_of(&self, ty: ConditionType) -> ConditionStatus {
        self.find(ty).map_or(ConditionStatus::Unknown, |c| c.status)
    }

    #[must_use]
    pub fn is_true(&self, ty: ConditionType) -> bool {
        self.status_of(ty) == ConditionStatus::True
    }

    /// Aggregate the listed conditions in order, see [`aggregate`]
    #[must_use]
    pub fn aggregate(&self, types: &[ConditionType]) -> Aggregate {
        aggregate(types.iter().map(|ty| (*ty, self.find(*ty))))
    }

    /// Recompute `Ready` from its constituents
    pub fn mirror_ready(&mut self, now: DateTime<Utc>) -> bool {
        let verdict = self.aggregate(&ConditionType::READY_CONSTITUENTS);
        self.set_at(
            ConditionType::Ready,
            verdict.status,
            &verdict.reason,
            verdict.message,
            now,
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn find(&self, ty: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.r#type == ty.as_str())
    }
}

fn format_time(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}
