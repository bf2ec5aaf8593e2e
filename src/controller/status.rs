//! Status aggregation
//!
//! The status is derived from the spec and the Deployment alone and replaces
//! whatever was there before.

use k8s_openapi::api::apps::v1::Deployment;

use crate::crd::{Condition, ConditionStatus, Racecourse, RacecoursePhase, RacecourseStatus};
use crate::resources::{external_url, wallet_url};

/// Condition type reporting whether the application serves traffic
pub const AVAILABLE: &str = "Available";

/// Condition reasons for [`AVAILABLE`]
pub mod reasons {
    /// At least one replica is available
    pub const MINIMUM_REPLICAS_AVAILABLE: &str = "MinimumReplicasAvailable";
    /// The Deployment exists but no replica is available yet
    pub const REPLICAS_UNAVAILABLE: &str = "ReplicasUnavailable";
    /// The Deployment has not been observed
    pub const DEPLOYMENT_NOT_FOUND: &str = "DeploymentNotFound";
}

/// Available replicas reported by the Deployment, 0 if it or its status is absent
pub fn available_replicas(deployment: Option<&Deployment>) -> i32 {
    deployment
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.available_replicas)
        .unwrap_or(0)
}

/// Phase for a given Deployment observation
///
/// Failed and Unknown are never derived here: a failed pass leaves the
/// previous status in place.
pub fn derive_phase(deployment: Option<&Deployment>) -> RacecoursePhase {
    if available_replicas(deployment) > 0 {
        RacecoursePhase::Running
    } else {
        RacecoursePhase::Pending
    }
}

/// Compute the full status for `racecourse`
///
/// `previous` supplies the transition time of an unchanged condition so two
/// passes over the same state produce the same status.
pub fn aggregate(
    racecourse: &Racecourse,
    deployment: Option<&Deployment>,
    previous: Option<&RacecourseStatus>,
) -> RacecourseStatus {
    let available = available_replicas(deployment);

    let condition = match (deployment, available) {
        (None, _) => Condition::new(
            AVAILABLE,
            ConditionStatus::False,
            reasons::DEPLOYMENT_NOT_FOUND,
            "Deployment has not been created",
        ),
        (Some(_), 0) => Condition::new(
            AVAILABLE,
            ConditionStatus::False,
            reasons::REPLICAS_UNAVAILABLE,
            "Waiting for replicas to become available",
        ),
        (Some(_), n) => Condition::new(
            AVAILABLE,
            ConditionStatus::True,
            reasons::MINIMUM_REPLICAS_AVAILABLE,
            format!("{n} replica(s) available"),
        ),
    }
    .carry_transition_time(previous.and_then(|s| s.get_condition(AVAILABLE)));

    RacecourseStatus {
        phase: derive_phase(deployment),
        deployment_ready: available > 0,
        available_replicas: available,
        url: external_url(racecourse).unwrap_or_default(),
        wallet_service_endpoint: wallet_url(racecourse),
        observed_generation: racecourse.metadata.generation,
        ..Default::default()
    }
    .condition(condition)
}
