//! Deployment running the racecourse application

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction,
    PodSpec, PodTemplateSpec, Probe,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{
    child_labels, config_map_name, namespace_of, selector_labels, APPLICATION_PORT,
    APPLICATION_PORT_NAME, CONTAINER_NAME, CONTRACT_ADDRESS_KEY, DEFAULT_IMAGE_REPOSITORY,
    DEFAULT_IMAGE_TAG, DEFAULT_REPLICAS, SIGNER_URL_KEY,
};
use crate::crd::Racecourse;

/// Build the Deployment `<name>`
///
/// `SIGNER_URL` and `CONTRACT_ADDRESS` are read from the ConfigMap by key
/// reference, so a config change never rewrites the pod template.
pub fn build_deployment(racecourse: &Racecourse) -> Deployment {
    let name = racecourse.name_any();
    let spec = &racecourse.spec;
    let config_name = config_map_name(&name);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image_reference(racecourse)),
        image_pull_policy: Some(
            spec.image
                .pull_policy
                .unwrap_or_default()
                .as_str()
                .to_string(),
        ),
        ports: Some(vec![ContainerPort {
            name: Some(APPLICATION_PORT_NAME.to_string()),
            container_port: APPLICATION_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(vec![
            EnvVar {
                name: "APPLICATION_PORT".to_string(),
                value: Some(APPLICATION_PORT.to_string()),
                ..Default::default()
            },
            config_map_env("SIGNER_URL", &config_name, SIGNER_URL_KEY),
            config_map_env("CONTRACT_ADDRESS", &config_name, CONTRACT_ADDRESS_KEY),
        ]),
        liveness_probe: Some(http_probe(30, 10, 5, 3)),
        readiness_probe: Some(http_probe(10, 5, 3, 3)),
        resources: spec.resources.clone(),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace_of(racecourse)),
            labels: Some(child_labels(&name)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas.unwrap_or(DEFAULT_REPLICAS)),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(child_labels(&name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `<repository>:<tag>` with defaults applied
fn image_reference(racecourse: &Racecourse) -> String {
    let image = &racecourse.spec.image;
    let repository = image
        .repository
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_IMAGE_REPOSITORY);
    let tag = image
        .tag
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_IMAGE_TAG);
    format!("{repository}:{tag}")
}

fn config_map_env(var: &str, config_name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: var.to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: config_name.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// HTTP GET `/` on the application port
fn http_probe(initial_delay: i32, period: i32, timeout: i32, failure_threshold: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/".to_string()),
            port: IntOrString::Int(APPLICATION_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        timeout_seconds: Some(timeout),
        failure_threshold: Some(failure_threshold),
        ..Default::default()
    }
}
