//! Stable network endpoint in front of the application pods

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{child_labels, namespace_of, selector_labels, APPLICATION_PORT, APPLICATION_PORT_NAME};
use crate::crd::Racecourse;

/// Build the ClusterIP Service `<name>`
pub fn build_service(racecourse: &Racecourse) -> Service {
    let name = racecourse.name_any();

    Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace_of(racecourse)),
            labels: Some(child_labels(&name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(&name)),
            ports: Some(vec![ServicePort {
                name: Some(APPLICATION_PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: APPLICATION_PORT,
                target_port: Some(IntOrString::Int(APPLICATION_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
