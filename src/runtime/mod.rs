//! # Runtime
//!
//! Process wiring for the controller binary.
//!
//! - `initialization.rs` - tracing, metrics, probe server and collaborator setup
//! - `watch_loop.rs` - the kube-runtime controller and its restart loop
//! - `error_policy.rs` - per-object backoff for failed reconciles and watch error handling

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
