//! # Controller
//!
//! Core controller modules for the Octavia controller.
//!
//! - `backoff`: Exponential backoff for requeues
//! - `conditions`: Typed condition set and `Ready` aggregation
//! - `finalizer`: Deletion gate and reverse-order cleanup
//! - `orchestrator`: Ordered, gated stage execution
//! - `reconciler`: Core reconciliation logic
//! - `render`: Configuration templates and rendering
//! - `stages`: Transport, certificates, quotas, database and configuration

pub mod backoff;
pub mod conditions;
pub mod finalizer;
pub mod orchestrator;
pub mod reconciler;
pub mod render;
pub mod stages;
