//! Reconciliation machinery shared by the app controller.
//!
//! This crate knows nothing about Kubernetes. It provides the typed
//! reconciliation key, the deduplicating rate-limited work queue, and the
//! worker pool that drives a [`Reconcile`] implementation. The convergence
//! logic itself lives with the cluster index.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod key;
pub mod queue;
pub mod worker;

pub use self::{
    key::{ParseKeyError, ReconcileKey},
    queue::WorkQueue,
    worker::{Reconcile, WorkerPool},
};
