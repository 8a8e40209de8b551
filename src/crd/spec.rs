//! # Octavia Spec
//!
//! Main CRD specification types and default values.

use serde::{Deserialize, Serialize};

/// Octavia Custom Resource Definition
///
/// Desired state of one Octavia deployment. The controller never writes the
/// spec; all progress is reported through [`crate::crd::OctaviaStatus`].
///
/// # Example
///
/// ```yaml
/// apiVersion: octavia.openstack.org/v1beta1
/// kind: Octavia
/// metadata:
///   name: octavia
///   namespace: openstack
/// spec:
///   databaseInstance: openstack
///   secret: osp-secret
///   tenantName: service
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[kube(
    kind = "Octavia",
    group = "octavia.openstack.org",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::OctaviaStatus",
    shortname = "octavia",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Message", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OctaviaSpec {
    /// Project the service user and amphora quotas belong to
    #[serde(default = "default_tenant_name")]
    pub tenant_name: String,
    /// MariaDB instance hosting both Octavia databases
    pub database_instance: String,
    /// MariaDB account used by the primary database
    #[serde(default = "default_database_account")]
    pub database_account: String,
    /// MariaDB account used by the persistence database
    #[serde(default = "default_persistence_database_account")]
    pub persistence_database_account: String,
    /// Secret holding the service password
    #[serde(default = "default_secret")]
    pub secret: String,
    /// Keys to read from `secret`
    #[serde(default)]
    pub password_selectors: PasswordSelector,
    /// Keystone user the service authenticates as
    #[serde(default = "default_service_user")]
    pub service_user: String,
    /// RabbitMQ cluster the transport URL is requested from
    #[serde(default = "default_rabbitmq_cluster_name")]
    pub rabbit_mq_cluster_name: String,
    /// Free-form INI appended to the generated configuration as `custom.conf`
    #[serde(default)]
    pub custom_service_config: String,
}

impl Default for OctaviaSpec {
    fn default() -> Self {
        Self {
            tenant_name: default_tenant_name(),
            database_instance: String::new(),
            database_account: default_database_account(),
            persistence_database_account: default_persistence_database_account(),
            secret: default_secret(),
            password_selectors: PasswordSelector::default(),
            service_user: default_service_user(),
            rabbit_mq_cluster_name: default_rabbitmq_cluster_name(),
            custom_service_config: String::new(),
        }
    }
}

/// Selects the keys to read from the credentials secret
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSelector {
    /// Key holding the service user password
    #[serde(default = "default_service_password_key")]
    pub service: String,
}

impl Default for PasswordSelector {
    fn default() -> Self {
        Self {
            service: default_service_password_key(),
        }
    }
}

#[must_use]
pub fn default_tenant_name() -> String {
    "service".to_string()
}

#[must_use]
pub fn default_database_account() -> String {
    "octavia".to_string()
}

#[must_use]
pub fn default_persistence_database_account() -> String {
    "octavia-persistence".to_string()
}

#[must_use]
pub fn default_secret() -> String {
    "osp-secret".to_string()
}

#[must_use]
pub fn default_service_password_key() -> String {
    "OctaviaPassword".to_string()
}

#[must_use]
pub fn default_service_user() -> String {
    "octavia".to_string()
}

#[must_use]
pub fn default_rabbitmq_cluster_name() -> String {
    "rabbitmq".to_string()
}
