//! Octavia Controller Library
//!
//! Core functionality of the Octavia controller: the `Octavia` resource,
//! the stage pipeline that provisions it and the adapters it drives.
//! Tests live next to each module and under `tests/`.

pub mod adapters;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod server;

pub use crd::{Octavia, OctaviaSpec, OctaviaStatus};
