//! Per-kind convergence of child resources
//!
//! Each child kind implements [`ManagedResource`]: how to fetch, create and
//! replace it through the [`KubeClient`], and a pure `merge` that overlays the
//! fields the operator owns onto the observed object and reports whether
//! anything changed. [`converge`] drives the fetch → create-or-update step for
//! any kind.
//!
//! Fields the operator owns are compared exactly, so clearing one in the
//! Racecourse clears it on the child. Only sub-objects the API server fills in
//! (Service ports, probes, Ingress rules) use the semantic [`is_derivative`]
//! compare, where fields the desired object leaves unset are ignored. Server
//! defaults like `clusterIP` or probe `successThreshold` live outside the
//! owned fields and never register as drift.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, PodTemplateSpec, Probe, ResourceRequirements, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::client::KubeClient;
use super::Context;
use crate::crd::Racecourse;
use crate::events::{actions, reasons};
use crate::resources::{CONTRACT_ADDRESS_KEY, MANAGED_ANNOTATIONS_KEY, SIGNER_URL_KEY};
use crate::Error;

/// A child kind the controller converges
#[async_trait]
pub trait ManagedResource:
    Resource<DynamicType = ()> + Clone + Serialize + Send + Sync + Sized + 'static
{
    /// Kind name used in logs and events
    const KIND: &'static str;

    /// Fetch the object, `None` if it does not exist
    async fn fetch(kube: &dyn KubeClient, namespace: &str, name: &str)
        -> Result<Option<Self>, Error>;

    /// Create the object
    async fn create(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error>;

    /// Replace the object, guarded by its resourceVersion
    async fn replace(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error>;

    /// Overlay the operator-owned fields of `desired` onto `observed`
    ///
    /// Returns whether anything changed along with the merged object.
    fn merge(observed: Self, desired: &Self) -> Result<(bool, Self), Error>;
}

/// Outcome of converging one child
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergeAction {
    /// The child did not exist and was created
    Created,
    /// The child existed and differed, and was replaced
    Updated,
    /// The child already matched, nothing was written
    Unchanged,
}

/// A converged child together with what was done to it
#[derive(Clone, Debug)]
pub struct Converged<K> {
    /// The object as last seen from the store
    pub object: K,
    /// What the converge step did
    pub action: ConvergeAction,
}

/// Bring one child in line with its desired state
///
/// Not found → the controller owner reference is attached and the child is
/// created. Found → [`ManagedResource::merge`] decides if a replace is needed.
/// Fetch errors other than not-found, and every write error, are returned
/// unchanged.
pub async fn converge<K: ManagedResource>(
    ctx: &Context,
    owner: &Racecourse,
    mut desired: K,
) -> Result<Converged<K>, Error> {
    let namespace = desired
        .namespace()
        .ok_or_else(|| Error::missing(K::KIND, "metadata.namespace"))?;
    let name = desired.name_any();
    let owner_ref = controller_owner_ref(owner)?;

    let observed = ctx
        .cancellable(K::fetch(ctx.kube.as_ref(), &namespace, &name))
        .await?;

    let Some(observed) = observed else {
        desired.meta_mut().owner_references = Some(vec![owner_ref]);
        info!(kind = K::KIND, %name, "creating child resource");
        let created = ctx
            .cancellable(K::create(ctx.kube.as_ref(), &desired))
            .await?;
        publish(ctx, owner, reasons::CREATED, K::KIND, &name).await;
        return Ok(Converged {
            object: created,
            action: ConvergeAction::Created,
        });
    };

    let (mut changed, mut merged) = K::merge(observed, &desired)?;
    changed |= ensure_owner(&mut merged, owner_ref)?;

    if !changed {
        debug!(kind = K::KIND, %name, "child resource up to date");
        return Ok(Converged {
            object: merged,
            action: ConvergeAction::Unchanged,
        });
    }

    info!(kind = K::KIND, %name, "updating child resource");
    let updated = ctx
        .cancellable(K::replace(ctx.kube.as_ref(), &merged))
        .await?;
    publish(ctx, owner, reasons::UPDATED, K::KIND, &name).await;
    Ok(Converged {
        object: updated,
        action: ConvergeAction::Updated,
    })
}

async fn publish(ctx: &Context, owner: &Racecourse, reason: &str, kind: &str, name: &str) {
    ctx.events
        .publish(
            &owner.object_ref(&()),
            EventType::Normal,
            reason,
            actions::RECONCILE,
            Some(format!("{reason} {kind} {name}")),
        )
        .await;
}

/// Controller owner reference pointing at the Racecourse
pub fn controller_owner_ref(owner: &Racecourse) -> Result<OwnerReference, Error> {
    owner
        .controller_owner_ref(&())
        .ok_or_else(|| Error::missing("Racecourse", "metadata.uid"))
}

/// Append the controller owner reference if it is missing
///
/// Existing owner references are left in place. An object already controlled
/// by someone else is an error: the API server allows one controller.
fn ensure_owner<K: ManagedResource>(
    obj: &mut K,
    owner_ref: OwnerReference,
) -> Result<bool, Error> {
    let name = obj.name_any();
    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
    if refs.iter().any(|r| r.uid == owner_ref.uid) {
        return Ok(false);
    }
    if let Some(other) = refs.iter().find(|r| r.controller == Some(true)) {
        return Err(Error::ForeignController {
            kind: K::KIND,
            name,
            owner: format!("{} {}", other.kind, other.name),
        });
    }
    refs.push(owner_ref);
    Ok(true)
}

/// True if every value set in `desired` is present and equal in `observed`
///
/// Objects are compared key by key, ignoring keys absent (or null) in
/// `desired`. Arrays must have the same length and match element-wise.
pub fn is_derivative(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| {
            value.is_null()
                || have
                    .get(key)
                    .is_some_and(|observed| is_derivative(value, observed))
        }),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len()
                && want
                    .iter()
                    .zip(have.iter())
                    .all(|(w, h)| is_derivative(w, h))
        }
        (want, have) => want == have,
    }
}

/// [`is_derivative`] over any serializable values
fn derives<T: Serialize>(desired: &T, observed: &T) -> Result<bool, Error> {
    Ok(is_derivative(
        &serde_json::to_value(desired)?,
        &serde_json::to_value(observed)?,
    ))
}

/// Overlay `desired` map entries onto `observed`, returning whether any changed
fn merge_map(
    observed: &mut Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return false;
    };
    let target = observed.get_or_insert_with(BTreeMap::new);
    let mut changed = false;
    for (key, value) in desired {
        if target.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Annotations: overlay `desired`, then drop keys the operator wrote before
/// but no longer wants
///
/// Previously written keys are read from [`MANAGED_ANNOTATIONS_KEY`] on the
/// observed object. Keys missing from that list are left alone.
fn merge_annotations(
    observed: &mut Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) -> bool {
    let want = desired.clone().unwrap_or_default();
    let have = observed.get_or_insert_with(BTreeMap::new);

    let stale: Vec<String> = have
        .get(MANAGED_ANNOTATIONS_KEY)
        .map(|list| {
            list.split(',')
                .filter(|key| !key.is_empty() && !want.contains_key(*key))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut changed = false;
    for key in stale {
        changed |= have.remove(&key).is_some();
    }
    let overlaid = merge_map(observed, desired);
    changed || overlaid
}

/// Overwrite `have` with `want` if they differ
fn assign<T: PartialEq>(have: &mut T, want: T) -> bool {
    if *have == want {
        return false;
    }
    *have = want;
    true
}

/// Unset and empty resource requirements are the same thing; the API server
/// stores `resources: {}` for a container that sets none
fn same_resources(
    want: &Option<ResourceRequirements>,
    have: &Option<ResourceRequirements>,
) -> bool {
    let parts = |r: &Option<ResourceRequirements>| {
        let r = r.clone().unwrap_or_default();
        (
            r.limits.unwrap_or_default(),
            r.requests.unwrap_or_default(),
            r.claims.unwrap_or_default(),
        )
    };
    parts(want) == parts(have)
}

/// Probes must both be present or both absent; present ones compare
/// semantically since the server fills in `scheme` and `successThreshold`
fn merge_probe(have: &mut Option<Probe>, want: Option<Probe>) -> Result<bool, Error> {
    let same = match (&want, &*have) {
        (None, None) => true,
        (Some(w), Some(h)) => derives(w, h)?,
        _ => false,
    };
    if same {
        return Ok(false);
    }
    *have = want;
    Ok(true)
}

/// Container: image, pull policy, ports, env, resources and probes
fn merge_container(have: &mut Container, want: Container) -> Result<bool, Error> {
    let mut changed = assign(&mut have.image, want.image);
    changed |= assign(&mut have.image_pull_policy, want.image_pull_policy);
    changed |= assign(&mut have.ports, want.ports);
    changed |= assign(&mut have.env, want.env);
    if !same_resources(&want.resources, &have.resources) {
        have.resources = want.resources;
        changed = true;
    }
    changed |= merge_probe(&mut have.liveness_probe, want.liveness_probe)?;
    changed |= merge_probe(&mut have.readiness_probe, want.readiness_probe)?;
    Ok(changed)
}

/// Pod template: labels, and the containers matched up by name
///
/// A different set of containers replaces the list outright.
fn merge_pod_template(have: &mut PodTemplateSpec, want: PodTemplateSpec) -> Result<bool, Error> {
    let mut changed = merge_map(
        &mut have.metadata.get_or_insert_with(Default::default).labels,
        &want.metadata.and_then(|m| m.labels),
    );

    let want_containers = want.spec.map(|s| s.containers).unwrap_or_default();
    let pod = have.spec.get_or_insert_with(Default::default);

    let same_names = pod.containers.len() == want_containers.len()
        && pod
            .containers
            .iter()
            .zip(&want_containers)
            .all(|(h, w)| h.name == w.name);
    if !same_names {
        pod.containers = want_containers;
        return Ok(true);
    }

    for (container, wanted) in pod.containers.iter_mut().zip(want_containers) {
        changed |= merge_container(container, wanted)?;
    }
    Ok(changed)
}

/// ConfigMap: only the two data entries are owned
pub fn merge_config_map(
    mut observed: ConfigMap,
    desired: &ConfigMap,
) -> Result<(bool, ConfigMap), Error> {
    let want = desired.data.clone().unwrap_or_default();
    let have = observed.data.get_or_insert_with(BTreeMap::new);

    let mut changed = false;
    for key in [SIGNER_URL_KEY, CONTRACT_ADDRESS_KEY] {
        let value = want.get(key).cloned().unwrap_or_default();
        if have.get(key) != Some(&value) {
            have.insert(key.to_string(), value);
            changed = true;
        }
    }
    Ok((changed, observed))
}

/// Service: labels, selector and ports
pub fn merge_service(mut observed: Service, desired: &Service) -> Result<(bool, Service), Error> {
    let mut changed = merge_map(&mut observed.metadata.labels, &desired.metadata.labels);

    let want = desired.spec.clone().unwrap_or_default();
    let have = observed.spec.get_or_insert_with(Default::default);

    if have.selector != want.selector {
        have.selector = want.selector;
        changed = true;
    }
    if !derives(&want.ports, &have.ports)? {
        have.ports = want.ports;
        changed = true;
    }
    Ok((changed, observed))
}

/// Deployment: replica count and the entire pod template
pub fn merge_deployment(
    mut observed: Deployment,
    desired: &Deployment,
) -> Result<(bool, Deployment), Error> {
    let mut changed = merge_map(&mut observed.metadata.labels, &desired.metadata.labels);

    let want = desired.spec.clone().unwrap_or_default();
    let have = observed.spec.get_or_insert_with(Default::default);

    if have.replicas != want.replicas {
        have.replicas = want.replicas;
        changed = true;
    }
    changed |= merge_pod_template(&mut have.template, want.template)?;
    Ok((changed, observed))
}

/// Ingress: annotations, class name and routing rules
pub fn merge_ingress(mut observed: Ingress, desired: &Ingress) -> Result<(bool, Ingress), Error> {
    let mut changed = merge_map(&mut observed.metadata.labels, &desired.metadata.labels);
    changed |= merge_annotations(
        &mut observed.metadata.annotations,
        &desired.metadata.annotations,
    );

    let want = desired.spec.clone().unwrap_or_default();
    let have = observed.spec.get_or_insert_with(Default::default);

    if have.ingress_class_name != want.ingress_class_name {
        have.ingress_class_name = want.ingress_class_name;
        changed = true;
    }
    if !derives(&want.rules, &have.rules)? {
        have.rules = want.rules;
        changed = true;
    }
    Ok((changed, observed))
}

#[async_trait]
impl ManagedResource for ConfigMap {
    const KIND: &'static str = "ConfigMap";

    async fn fetch(
        kube: &dyn KubeClient,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, Error> {
        kube.get_config_map(namespace, name).await
    }

    async fn create(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error> {
        kube.create_config_map(obj).await
    }

    async fn replace(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error> {
        kube.replace_config_map(obj).await
    }

    fn merge(observed: Self, desired: &Self) -> Result<(bool, Self), Error> {
        merge_config_map(observed, desired)
    }
}

#[async_trait]
impl ManagedResource for Service {
    const KIND: &'static str = "Service";

    async fn fetch(
        kube: &dyn KubeClient,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, Error> {
        kube.get_service(namespace, name).await
    }

    async fn create(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error> {
        kube.create_service(obj).await
    }

    async fn replace(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error> {
        kube.replace_service(obj).await
    }

    fn merge(observed: Self, desired: &Self) -> Result<(bool, Self), Error> {
        merge_service(observed, desired)
    }
}

#[async_trait]
impl ManagedResource for Deployment {
    const KIND: &'static str = "Deployment";

    async fn fetch(
        kube: &dyn KubeClient,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, Error> {
        kube.get_deployment(namespace, name).await
    }

    async fn create(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error> {
        kube.create_deployment(obj).await
    }

    async fn replace(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error> {
        kube.replace_deployment(obj).await
    }

    fn merge(observed: Self, desired: &Self) -> Result<(bool, Self), Error> {
        merge_deployment(observed, desired)
    }
}

#[async_trait]
impl ManagedResource for Ingress {
    const KIND: &'static str = "Ingress";

    async fn fetch(
        kube: &dyn KubeClient,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, Error> {
        kube.get_ingress(namespace, name).await
    }

    async fn create(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error> {
        kube.create_ingress(obj).await
    }

    async fn replace(kube: &dyn KubeClient, obj: &Self) -> Result<Self, Error> {
        kube.replace_ingress(obj).await
    }

    fn merge(observed: Self, desired: &Self) -> Result<(bool, Self), Error> {
        merge_ingress(observed, desired)
    }
}
