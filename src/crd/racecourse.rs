//! Racecourse Custom Resource Definition
//!
//! A Racecourse describes one deployment of the racecourse application: the
//! image to run, how many replicas, which wallet service signs transactions,
//! and how the application is exposed through an Ingress.

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ImageSpec, IngressSpec, RacecoursePhase, WalletServiceSpec};

/// Desired state of a Racecourse instance
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "racecourse.kaleido.io",
    version = "v1alpha1",
    kind = "Racecourse",
    plural = "racecourses",
    shortname = "rcs",
    status = "RacecourseStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RacecourseSpec {
    /// Container image configuration
    #[serde(default)]
    pub image: ImageSpec,

    /// Number of racecourse pods to run (default: 2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub replicas: Option<i32>,

    /// Resource requests/limits applied to the application container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// How to connect to the wallet service
    pub wallet_service: WalletServiceSpec,

    /// Address of an already deployed Race contract
    ///
    /// Empty means the application deploys a new contract on startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^(0x[a-fA-F0-9]{40})?$"))]
    pub contract_address: Option<String>,

    /// Ingress configuration
    #[serde(default)]
    pub ingress: IngressSpec,
}

impl RacecourseSpec {
    /// Validate the fields the CRD schema is responsible for
    ///
    /// The API server enforces these through the schema; this catches objects
    /// that reached the controller without passing through it.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let Some(replicas) = self.replicas {
            if replicas < 1 {
                return Err(crate::Error::validation(format!(
                    "replicas must be at least 1, got {replicas}"
                )));
            }
        }

        if self.wallet_service.name.is_empty() {
            return Err(crate::Error::validation("walletService.name must not be empty"));
        }

        if let Some(address) = self.contract_address.as_deref() {
            if !is_contract_address(address) {
                return Err(crate::Error::validation(format!(
                    "contractAddress must be empty or a 0x-prefixed 40 digit hex string, got '{address}'"
                )));
            }
        }

        Ok(())
    }
}

/// Empty, or `0x` followed by exactly 40 hex digits
fn is_contract_address(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    match s.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Observed state of a Racecourse, recomputed on every successful pass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RacecourseStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RacecoursePhase,

    /// Latest observations of the instance's state
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Whether the Deployment has at least one available replica
    #[serde(default)]
    pub deployment_ready: bool,

    /// Number of available pods
    #[serde(default)]
    pub available_replicas: i32,

    /// External URL, set only when ingress is enabled with a host
    #[serde(default)]
    pub url: String,

    /// Resolved wallet service endpoint
    #[serde(default)]
    pub wallet_service_endpoint: String,

    /// Generation of the spec this status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl RacecourseStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: RacecoursePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Add a condition, replacing any existing condition of the same type
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// Look up a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
