//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition YAML for `Octavia`.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/octavia.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use octavia_controller::crd::Octavia;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Octavia::crd())?);
    Ok(())
}
