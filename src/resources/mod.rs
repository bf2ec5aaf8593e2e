//! Desired state for the child resources of a Racecourse
//!
//! Every function here is pure: it takes the parent object and returns the
//! fully specified child it should own. Defaults for optional spec fields are
//! applied here and nowhere else, so the ConfigMap and the status can never
//! disagree about the wallet URL.
//!
//! - [`build_config_map`] - `<name>-config` with the signer URL and contract address
//! - [`build_service`] - ClusterIP Service on the application port
//! - [`build_deployment`] - the application pods
//! - [`build_ingress`] - optional external routing

mod config;
mod deployment;
mod ingress;
mod service;

use std::collections::BTreeMap;

use kube::ResourceExt;

use crate::crd::Racecourse;

pub use config::{build_config_map, CONTRACT_ADDRESS_KEY, SIGNER_URL_KEY};
pub use deployment::build_deployment;
pub use ingress::{build_ingress, ingress_annotations, MANAGED_ANNOTATIONS_KEY};
pub use service::build_service;

/// Port the racecourse application listens on, shared by every child kind
pub const APPLICATION_PORT: i32 = 3000;

/// Name of the application port on the container and the Service
pub const APPLICATION_PORT_NAME: &str = "http";

/// Name of the application container
pub const CONTAINER_NAME: &str = "racecourse";

/// Default image repository
pub const DEFAULT_IMAGE_REPOSITORY: &str = "racecourse";

/// Default image tag
pub const DEFAULT_IMAGE_TAG: &str = "0.0.1";

/// Default replica count
pub const DEFAULT_REPLICAS: i32 = 2;

/// Default JSON-RPC port of the wallet service
pub const DEFAULT_WALLET_PORT: i32 = 8545;

/// Default ingress class
pub const DEFAULT_INGRESS_CLASS: &str = "nginx";

/// Host used in the Ingress rule when none is configured
pub const DEFAULT_INGRESS_HOST: &str = "racecourse.local";

/// Path used in the Ingress rule when none is configured
pub const DEFAULT_INGRESS_PATH: &str = "/";

/// Label identifying the operator as the manager of a child
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGER_NAME: &str = "racecourse-operator";

/// Name of the ConfigMap owned by a Racecourse
pub fn config_map_name(name: &str) -> String {
    format!("{name}-config")
}

/// Selector labels shared by the Deployment, its pods and the Service
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "racecourse".to_string()),
        ("racecourse".to_string(), name.to_string()),
    ])
}

/// Labels stamped on every child object
pub fn child_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(name);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string());
    labels
}

/// Namespace of the Racecourse, empty if unset
pub(crate) fn namespace_of(racecourse: &Racecourse) -> String {
    racecourse.namespace().unwrap_or_default()
}

/// Cluster-local URL of the wallet service
///
/// Falls back to the Racecourse's own namespace and the default wallet port
/// when those are unset.
pub fn wallet_url(racecourse: &Racecourse) -> String {
    let wallet = &racecourse.spec.wallet_service;
    let namespace = wallet
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| namespace_of(racecourse));
    let port = wallet
        .port
        .filter(|p| *p != 0)
        .unwrap_or(DEFAULT_WALLET_PORT);

    format!(
        "http://{}.{}.svc.cluster.local:{}",
        wallet.name, namespace, port
    )
}

/// Externally reachable URL, present only when ingress is enabled with a host
pub fn external_url(racecourse: &Racecourse) -> Option<String> {
    let ingress = &racecourse.spec.ingress;
    if !ingress.is_enabled() {
        return None;
    }
    ingress.host().map(|host| format!("http://{host}"))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::crd::{ImageSpec, IngressSpec, Racecourse, RacecourseSpec, WalletServiceSpec};

    /// A Racecourse with every optional field unset
    pub fn sample_racecourse(name: &str, namespace: &str) -> Racecourse {
        Racecourse {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(format!("{name}-uid")),
                generation: Some(1),
                ..Default::default()
            },
            spec: RacecourseSpec {
                image: ImageSpec::default(),
                replicas: None,
                resources: None,
                wallet_service: WalletServiceSpec {
                    name: "wallet".to_string(),
                    namespace: None,
                    port: None,
                },
                contract_address: None,
                ingress: IngressSpec::default(),
            },
            status: None,
        }
    }
}
