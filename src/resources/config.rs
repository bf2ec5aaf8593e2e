//! ConfigMap carrying the runtime configuration injected into the pods

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::{child_labels, config_map_name, namespace_of, wallet_url};
use crate::crd::Racecourse;

/// ConfigMap key holding the wallet (signer) URL
pub const SIGNER_URL_KEY: &str = "signer-url";

/// ConfigMap key holding the Race contract address
pub const CONTRACT_ADDRESS_KEY: &str = "contract-address";

/// Build the `<name>-config` ConfigMap
pub fn build_config_map(racecourse: &Racecourse) -> ConfigMap {
    let name = racecourse.name_any();

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(&name)),
            namespace: Some(namespace_of(racecourse)),
            labels: Some(child_labels(&name)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (SIGNER_URL_KEY.to_string(), wallet_url(racecourse)),
            (
                CONTRACT_ADDRESS_KEY.to_string(),
                racecourse.spec.contract_address.clone().unwrap_or_default(),
            ),
        ])),
        ..Default::default()
    }
}
