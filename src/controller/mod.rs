//! Racecourse controller
//!
//! - [`client`] - object store access behind the [`KubeClient`] trait
//! - [`converge`] - per-kind fetch → create-or-update of child resources
//! - [`status`] - status derived from the Deployment
//! - [`racecourse`] - the reconcile pipeline and its [`Context`]

pub mod client;
pub mod converge;
pub mod racecourse;
pub mod status;

#[cfg(test)]
mod fake;

pub use client::{KubeClient, KubeClientImpl};
pub use converge::{converge, ConvergeAction, Converged, ManagedResource};
pub use racecourse::{
    error_policy, reconcile, Context, ContextBuilder, DEFAULT_ERROR_REQUEUE,
    DEFAULT_RESYNC_INTERVAL,
};
pub use status::aggregate;
