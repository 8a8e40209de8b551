//! # Reconciler
//!
//! - `types.rs` - shared context, error type and the `ResourceStore` seam
//! - `reconcile.rs` - the reconcile pass itself

pub mod reconcile;
pub mod types;

pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError, ReconcilerSettings, ResourceStore};
