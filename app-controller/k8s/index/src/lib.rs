//! App controller index and convergence logic.
//!
//! The controller keeps a composite application converged with the child
//! resources derived from it. It watches the following cluster resources:
//!
//! - Each `App` declares a workload and optional service/ingress exposure.
//!   Add, update, and delete events all enqueue the spec's own key.
//! - `Deployment`, `Service`, and `Ingress` objects carrying the ownership
//!   label are mirrored into the index so reconciliation can diff desired
//!   against observed state without touching the API server. Only their
//!   deletions enqueue work (resolved to the owning `App` through the
//!   ownership marker); in-place drift is corrected by the periodic resync.
//!
//! ```text
//! [ App ] -> [ Deployment ]
//!         -> [ Service ] <- [ Ingress ]
//! ```
//!
//! Reconciliation is level-triggered: every pass re-derives the full set of
//! create/update/delete calls from current state, so keys are idempotent and
//! safe to coalesce, reorder, or replay.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cluster;
mod index;
mod metrics;
mod reconciler;

#[cfg(test)]
mod tests;

pub use self::{
    cluster::{ClusterApi, ClusterClient},
    index::{AppState, ExposureState, Index, SharedIndex, WorkloadState},
    metrics::ReconcilerMetrics,
    reconciler::Reconciler,
};
