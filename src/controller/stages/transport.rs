//! # Transport Stage
//!
//! Validates the reconcile-time inputs and requests a message-bus
//! TransportURL from the RabbitMQ operator.
//!
//! `RabbitMqTransportURLReady` turns True once the operator reports the
//! TransportURL ready and its secret carries a `transport_url`. `InputReady`
//! turns True once that secret resolved and the credentials secret holds the
//! service password.

use super::{StageContext, StageEffect, StageOutcome};
use crate::adapters::{AdapterResult, CleanupOutcome, TransportStatus};
use crate::constants::TRANSPORT_URL_KEY;
use crate::controller::conditions::ConditionType;
use tracing::{debug, info};

const RABBIT: ConditionType = ConditionType::RabbitMqTransportUrlReady;
const INPUT: ConditionType = ConditionType::InputReady;

#[must_use]
pub fn transport_url_name(ctx: &StageContext<'_>) -> String {
    ctx.derived_name("octavia-transport")
}

/// Names of required spec fields that are empty
fn missing_fields(ctx: &StageContext<'_>) -> Vec<&'static str> {
    let spec = &ctx.octavia.spec;
    [
        ("tenantName", &spec.tenant_name),
        ("databaseInstance", &spec.database_instance),
        ("serviceUser", &spec.service_user),
        ("databaseAccount", &spec.database_account),
        ("persistenceDatabaseAccount", &spec.persistence_database_account),
        ("rabbitMqClusterName", &spec.rabbit_mq_cluster_name),
        ("secret", &spec.secret),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
    .collect()
}

pub async fn execute(ctx: &StageContext<'_>) -> StageOutcome {
    let spec = &ctx.octavia.spec;
    let outcome = StageOutcome::new();

    let missing = missing_fields(ctx);
    if !missing.is_empty() {
        return outcome.invalid(
            INPUT,
            format!("required fields are empty: {}", missing.join(", ")),
        );
    }

    let name = transport_url_name(ctx);
    let (mut outcome, transport_ready) = match ctx
        .collaborators
        .transport
        .ensure_transport_url(&ctx.owner, &name, &spec.rabbit_mq_cluster_name)
        .await
    {
        Err(e) => (outcome.failed(RABBIT, &e), false),
        Ok(TransportStatus::Pending(message)) => {
            debug!(transport = %name, message = %message, "transport.pending");
            (outcome.pending(RABBIT, message), false)
        }
        Ok(TransportStatus::Ready { secret_name }) => {
            match ctx.collaborators.secrets.get_secret(ctx.namespace, &secret_name).await {
                Err(e) => (outcome.failed(RABBIT, &e), false),
                Ok(Some(data))
                    if data
                        .get(TRANSPORT_URL_KEY)
                        .is_some_and(|url| !url.is_empty()) =>
                {
                    info!(transport = %name, secret = %secret_name, "✅ TransportURL ready");
                    (
                        outcome
                            .ready(RABBIT, "TransportURL successfully created")
                            .effect(StageEffect::TransportSecret(secret_name)),
                        true,
                    )
                }
                Ok(Some(_)) => (
                    outcome.pending(
                        RABBIT,
                        format!("transport secret {secret_name} has no {TRANSPORT_URL_KEY} yet"),
                    ),
                    false,
                ),
                Ok(None) => (
                    outcome.pending(RABBIT, format!("transport secret {secret_name} not found")),
                    false,
                ),
            }
        }
    };

    outcome = match ctx.collaborators.secrets.get_secret(ctx.namespace, &spec.secret).await {
        Err(e) => outcome.failed(INPUT, &e),
        Ok(None) => outcome.pending(INPUT, format!("secret {} not found", spec.secret)),
        Ok(Some(data))
            if data
                .get(&spec.password_selectors.service)
                .is_none_or(String::is_empty) =>
        {
            outcome.invalid(
                INPUT,
                format!(
                    "secret {} has no key {}",
                    spec.secret, spec.password_selectors.service
                ),
            )
        }
        Ok(Some(_)) if !transport_ready => {
            outcome.pending(INPUT, "waiting for the transport URL secret")
        }
        Ok(Some(_)) => outcome.ready(INPUT, "Input data complete"),
    };
    outcome
}

pub async fn cleanup(ctx: &StageContext<'_>) -> Vec<AdapterResult<CleanupOutcome>> {
    vec![
        ctx.collaborators
            .transport
            .delete_transport_url(ctx.namespace, &transport_url_name(ctx))
            .await,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::Operation;
    use crate::adapters::ErrorClass;
    use crate::controller::conditions::reason;
    use crate::controller::stages::test_support::{Harness, NAMESPACE};
    use crate::controller::stages::RetryHint;
    use crate::crd::ConditionStatus;

    fn status_of(outcome: &StageOutcome, ty: ConditionType) -> Option<(ConditionStatus, &'static str)> {
        outcome
            .conditions
            .iter()
            .find(|c| c.ty == ty)
            .map(|c| (c.status, c.reason))
    }

    #[tokio::test]
    async fn test_pending_transport_keeps_input_false() {
        let harness = Harness::new();
        harness
            .cloud
            .create_secret(NAMESPACE, "osp-secret", &[("OctaviaPassword", "pw")]);

        let outcome = execute(&harness.ctx()).await;
        assert_eq!(
            status_of(&outcome, RABBIT),
            Some((ConditionStatus::False, reason::REQUESTED))
        );
        assert_eq!(
            status_of(&outcome, INPUT),
            Some((ConditionStatus::False, reason::REQUESTED))
        );
        assert_eq!(outcome.retry, RetryHint::Requeue);
        assert!(harness.cloud.transport_exists(NAMESPACE, "octavia-octavia-transport"));
    }

    #[tokio::test]
    async fn test_ready_transport_publishes_secret() {
        let harness = Harness::new();
        harness
            .cloud
            .create_secret(NAMESPACE, "osp-secret", &[("OctaviaPassword", "pw")]);
        harness
            .cloud
            .simulate_transport_ready(NAMESPACE, "octavia-octavia-transport", "rabbitmq-transport");

        let outcome = execute(&harness.ctx()).await;
        assert_eq!(outcome.retry, RetryHint::None);
        assert_eq!(
            outcome.effects,
            vec![StageEffect::TransportSecret("rabbitmq-transport".to_string())]
        );
        assert_eq!(
            status_of(&outcome, INPUT),
            Some((ConditionStatus::True, reason::READY))
        );
    }

    #[tokio::test]
    async fn test_missing_password_key_is_permanent() {
        let harness = Harness::new();
        harness.cloud.create_secret(NAMESPACE, "osp-secret", &[("Other", "x")]);
        harness
            .cloud
            .simulate_transport_ready(NAMESPACE, "octavia-octavia-transport", "rabbitmq-transport");

        let outcome = execute(&harness.ctx()).await;
        assert!(outcome.is_terminal());
        assert_eq!(
            status_of(&outcome, INPUT),
            Some((ConditionStatus::False, reason::INVALID_CONFIGURATION))
        );
    }

    #[tokio::test]
    async fn test_empty_required_field_short_circuits() {
        let mut harness = Harness::new();
        harness.octavia.spec.database_instance = String::new();

        let outcome = execute(&harness.ctx()).await;
        assert!(outcome.is_terminal());
        assert!(outcome.conditions.iter().all(|c| c.ty == INPUT));
        assert!(harness.cloud.journal().is_empty());
    }

    #[tokio::test]
    async fn test_transport_outage_is_retried() {
        let harness = Harness::new();
        harness
            .cloud
            .inject_failure(Operation::EnsureTransport, ErrorClass::Transient);

        let outcome = execute(&harness.ctx()).await;
        assert_eq!(outcome.retry, RetryHint::Requeue);
        assert_eq!(
            status_of(&outcome, RABBIT),
            Some((ConditionStatus::False, reason::ERROR))
        );
    }
}
