//! # Custom Resource Definitions
//!
//! CRD types for the Octavia controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Octavia` resource, its desired state and default values
//! - `status.rs` - Observed state written by the reconciler

mod spec;
mod status;

// Re-export all public types
pub use spec::{
    default_database_account, default_persistence_database_account, default_rabbitmq_cluster_name,
    default_secret, default_service_password_key, default_service_user, default_tenant_name,
    Octavia, OctaviaSpec, PasswordSelector,
};
pub use status::{Condition, ConditionStatus, OctaviaStatus};
