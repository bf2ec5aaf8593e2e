//! Ingress routing external traffic to the Service

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::{
    child_labels, namespace_of, APPLICATION_PORT, DEFAULT_INGRESS_CLASS, DEFAULT_INGRESS_HOST,
    DEFAULT_INGRESS_PATH,
};
use crate::crd::Racecourse;

const NGINX_PREFIX: &str = "nginx.ingress.kubernetes.io";

/// Seconds nginx keeps idle websocket connections open
const STREAM_TIMEOUT_SECS: &str = "3600";

/// Lifetime of the session-affinity cookie (48h)
const SESSION_COOKIE_SECS: &str = "172800";

/// Comma-separated list of the annotation keys the operator last wrote
///
/// Keys on that list that are no longer wanted get removed on update. Keys
/// not on it belong to someone else.
pub const MANAGED_ANNOTATIONS_KEY: &str = "racecourse.kaleido.io/managed-annotations";

/// Annotations for the Ingress: session affinity and long-lived streaming
/// connections, overlaid by the user's annotations
pub fn ingress_annotations(racecourse: &Racecourse) -> BTreeMap<String, String> {
    let name = racecourse.name_any();

    let mut annotations: BTreeMap<String, String> = [
        ("websocket-services", name.as_str()),
        ("proxy-read-timeout", STREAM_TIMEOUT_SECS),
        ("proxy-send-timeout", STREAM_TIMEOUT_SECS),
        ("affinity", "cookie"),
        ("session-cookie-name", "racecourse-session"),
        ("session-cookie-expires", SESSION_COOKIE_SECS),
        ("session-cookie-max-age", SESSION_COOKIE_SECS),
    ]
    .into_iter()
    .map(|(k, v)| (format!("{NGINX_PREFIX}/{k}"), v.to_string()))
    .collect();

    // user values win
    annotations.extend(
        racecourse
            .spec
            .ingress
            .annotations
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    annotations
}

/// Build the Ingress `<name>`
pub fn build_ingress(racecourse: &Racecourse) -> Ingress {
    let name = racecourse.name_any();
    let spec = &racecourse.spec.ingress;

    let class_name = spec
        .class_name
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_INGRESS_CLASS);
    let host = spec.host().unwrap_or(DEFAULT_INGRESS_HOST);
    let path = spec
        .path
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_INGRESS_PATH);

    let mut annotations = ingress_annotations(racecourse);
    let managed = annotations.keys().cloned().collect::<Vec<_>>().join(",");
    annotations.insert(MANAGED_ANNOTATIONS_KEY.to_string(), managed);

    Ingress {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace_of(racecourse)),
            labels: Some(child_labels(&name)),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(class_name.to_string()),
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(path.to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: name.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(APPLICATION_PORT),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
