//! In-memory object store for controller tests
//!
//! Behaves like a minimal API server: it assigns resourceVersions, rejects
//! replaces carrying a stale version with 409, fills in a handful of server
//! defaults on every write, and counts every mutating call.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Resource, ResourceExt};

use super::client::KubeClient;
use crate::crd::{Racecourse, RacecourseStatus};
use crate::error::api_error;
use crate::Error;

type Key = (String, String);

#[derive(Default)]
struct Store {
    racecourses: BTreeMap<Key, Racecourse>,
    config_maps: BTreeMap<Key, ConfigMap>,
    services: BTreeMap<Key, Service>,
    deployments: BTreeMap<Key, Deployment>,
    ingresses: BTreeMap<Key, Ingress>,
    version: u64,
    failures: BTreeMap<&'static str, u16>,
    calls: Vec<String>,
    creates: usize,
    replaces: usize,
    status_writes: usize,
}

impl Store {
    fn record(&mut self, op: &'static str) -> Result<(), Error> {
        self.calls.push(op.to_string());
        match self.failures.get(op) {
            Some(code) => Err(api_error(*code, op)),
            None => Ok(()),
        }
    }

    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

fn key_of<K: Resource>(obj: &K) -> Key {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn insert<K: Resource + Clone>(
    map: &mut BTreeMap<Key, K>,
    version: String,
    obj: &K,
) -> Result<K, Error> {
    let key = key_of(obj);
    if map.contains_key(&key) {
        return Err(api_error(409, "AlreadyExists"));
    }
    let mut stored = obj.clone();
    let meta = stored.meta_mut();
    meta.uid = Some(format!("{}-{}-uid", key.0, key.1));
    meta.resource_version = Some(version);
    map.insert(key, stored.clone());
    Ok(stored)
}

fn update<K: Resource + Clone>(
    map: &mut BTreeMap<Key, K>,
    version: String,
    obj: &K,
) -> Result<K, Error> {
    let key = key_of(obj);
    let current = map.get(&key).ok_or_else(|| api_error(404, "NotFound"))?;
    if current.meta().resource_version != obj.meta().resource_version {
        return Err(api_error(409, "Conflict"));
    }
    let mut stored = obj.clone();
    stored.meta_mut().resource_version = Some(version);
    map.insert(key, stored.clone());
    Ok(stored)
}

/// Fields the API server fills in on a Service
fn default_service(svc: &mut Service) {
    if let Some(spec) = svc.spec.as_mut() {
        spec.cluster_ip = Some("10.96.0.10".to_string());
        spec.cluster_ips = Some(vec!["10.96.0.10".to_string()]);
        spec.session_affinity = Some("None".to_string());
        spec.internal_traffic_policy = Some("Cluster".to_string());
    }
}

/// Fields the API server fills in on a Deployment
fn default_deployment(deployment: &mut Deployment) {
    let Some(spec) = deployment.spec.as_mut() else {
        return;
    };
    spec.revision_history_limit = Some(10);
    spec.progress_deadline_seconds = Some(600);
    if let Some(pod) = spec.template.spec.as_mut() {
        pod.restart_policy = Some("Always".to_string());
        pod.dns_policy = Some("ClusterFirst".to_string());
        pod.termination_grace_period_seconds = Some(30);
        for container in &mut pod.containers {
            container.termination_message_path = Some("/dev/termination-log".to_string());
            container.resources.get_or_insert_with(Default::default);
            for probe in [&mut container.liveness_probe, &mut container.readiness_probe]
                .into_iter()
                .flatten()
            {
                probe.success_threshold = Some(1);
                if let Some(get) = probe.http_get.as_mut() {
                    get.scheme = Some("HTTP".to_string());
                }
            }
        }
    }
}

/// In-memory [`KubeClient`]
#[derive(Default)]
pub struct FakeKube {
    store: Mutex<Store>,
}

impl FakeKube {
    /// A store holding `racecourse`
    pub fn with(racecourse: Racecourse) -> Self {
        let fake = Self::default();
        fake.put_racecourse(racecourse);
        fake
    }

    /// Insert or overwrite a Racecourse
    pub fn put_racecourse(&self, racecourse: Racecourse) {
        let mut store = self.store.lock().unwrap();
        store.racecourses.insert(key_of(&racecourse), racecourse);
    }

    /// Make every later call to `op` fail with `code`
    pub fn fail(&self, op: &'static str, code: u16) {
        self.store.lock().unwrap().failures.insert(op, code);
    }

    /// Report `available` ready replicas on the Deployment
    pub fn set_available(&self, namespace: &str, name: &str, available: i32) {
        let mut store = self.store.lock().unwrap();
        let version = store.next_version();
        if let Some(d) = store.deployments.get_mut(&key(namespace, name)) {
            d.status.get_or_insert_with(Default::default).available_replicas = Some(available);
            d.metadata.resource_version = Some(version);
        }
    }

    /// Names of all calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.store.lock().unwrap().calls.clone()
    }

    /// Number of create calls that succeeded
    pub fn creates(&self) -> usize {
        self.store.lock().unwrap().creates
    }

    /// Number of replace calls that succeeded
    pub fn replaces(&self) -> usize {
        self.store.lock().unwrap().replaces
    }

    /// Number of status writes that succeeded
    pub fn status_writes(&self) -> usize {
        self.store.lock().unwrap().status_writes
    }

    /// Reset the call log and counters
    pub fn reset_counters(&self) {
        let mut store = self.store.lock().unwrap();
        store.calls.clear();
        store.creates = 0;
        store.replaces = 0;
        store.status_writes = 0;
    }

    pub fn racecourse(&self, namespace: &str, name: &str) -> Option<Racecourse> {
        self.store.lock().unwrap().racecourses.get(&key(namespace, name)).cloned()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.store.lock().unwrap().config_maps.get(&key(namespace, name)).cloned()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.store.lock().unwrap().services.get(&key(namespace, name)).cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.store.lock().unwrap().deployments.get(&key(namespace, name)).cloned()
    }

    pub fn ingress(&self, namespace: &str, name: &str) -> Option<Ingress> {
        self.store.lock().unwrap().ingresses.get(&key(namespace, name)).cloned()
    }

    /// Overwrite a stored Deployment as another writer would
    pub fn edit_deployment(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Deployment)) {
        let mut store = self.store.lock().unwrap();
        let version = store.next_version();
        if let Some(d) = store.deployments.get_mut(&key(namespace, name)) {
            edit(d);
            d.metadata.resource_version = Some(version);
        }
    }

    /// Overwrite a stored Ingress as another writer would
    pub fn edit_ingress(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Ingress)) {
        let mut store = self.store.lock().unwrap();
        let version = store.next_version();
        if let Some(ing) = store.ingresses.get_mut(&key(namespace, name)) {
            edit(ing);
            ing.metadata.resource_version = Some(version);
        }
    }

    /// Overwrite a stored ConfigMap as another writer would
    pub fn edit_config_map(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut ConfigMap)) {
        let mut store = self.store.lock().unwrap();
        let version = store.next_version();
        if let Some(cm) = store.config_maps.get_mut(&key(namespace, name)) {
            edit(cm);
            cm.metadata.resource_version = Some(version);
        }
    }
}

#[async_trait]
impl KubeClient for FakeKube {
    async fn get_racecourse(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Racecourse>, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("get_racecourse")?;
        Ok(store.racecourses.get(&key(namespace, name)).cloned())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RacecourseStatus,
    ) -> Result<(), Error> {
        let mut store = self.store.lock().unwrap();
        store.record("patch_status")?;
        let racecourse = store
            .racecourses
            .get_mut(&key(namespace, name))
            .ok_or_else(|| api_error(404, "NotFound"))?;
        racecourse.status = Some(status.clone());
        store.status_writes += 1;
        Ok(())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("get_config_map")?;
        Ok(store.config_maps.get(&key(namespace, name)).cloned())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("create_config_map")?;
        let version = store.next_version();
        let created = insert(&mut store.config_maps, version, config_map)?;
        store.creates += 1;
        Ok(created)
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("replace_config_map")?;
        let version = store.next_version();
        let replaced = update(&mut store.config_maps, version, config_map)?;
        store.replaces += 1;
        Ok(replaced)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("get_service")?;
        Ok(store.services.get(&key(namespace, name)).cloned())
    }

    async fn create_service(&self, service: &Service) -> Result<Service, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("create_service")?;
        let mut service = service.clone();
        default_service(&mut service);
        let version = store.next_version();
        let created = insert(&mut store.services, version, &service)?;
        store.creates += 1;
        Ok(created)
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("replace_service")?;
        let version = store.next_version();
        let replaced = update(&mut store.services, version, service)?;
        store.replaces += 1;
        Ok(replaced)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("get_deployment")?;
        Ok(store.deployments.get(&key(namespace, name)).cloned())
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("create_deployment")?;
        let mut deployment = deployment.clone();
        default_deployment(&mut deployment);
        deployment.status = Some(DeploymentStatus::default());
        let version = store.next_version();
        let created = insert(&mut store.deployments, version, &deployment)?;
        store.creates += 1;
        Ok(created)
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("replace_deployment")?;
        let mut deployment = deployment.clone();
        default_deployment(&mut deployment);
        let version = store.next_version();
        let replaced = update(&mut store.deployments, version, &deployment)?;
        store.replaces += 1;
        Ok(replaced)
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("get_ingress")?;
        Ok(store.ingresses.get(&key(namespace, name)).cloned())
    }

    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("create_ingress")?;
        let version = store.next_version();
        let created = insert(&mut store.ingresses, version, ingress)?;
        store.creates += 1;
        Ok(created)
    }

    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        let mut store = self.store.lock().unwrap();
        store.record("replace_ingress")?;
        let version = store.next_version();
        let replaced = update(&mut store.ingresses, version, ingress)?;
        store.replaces += 1;
        Ok(replaced)
    }
}
