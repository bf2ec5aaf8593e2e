//! Racecourse Operator - Kubernetes operator for racecourse application instances
//!
//! A `Racecourse` custom resource declares one instance of the racecourse
//! application. The operator converges four child objects for it, each owned by
//! the Racecourse so deleting the parent removes them:
//!
//! - a ConfigMap `<name>-config` carrying the signer URL and contract address
//! - a ClusterIP Service on the application port
//! - a Deployment running the application
//! - an Ingress, unless disabled
//!
//! and reports the outcome on the Racecourse status.
//!
//! # Modules
//!
//! - [`crd`] - the Racecourse custom resource
//! - [`resources`] - desired state of every child object
//! - [`controller`] - reconciliation against the cluster
//! - [`events`] - Kubernetes Event publishing
//! - [`error`] - error types for the operator

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod resources;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
