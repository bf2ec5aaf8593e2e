//! Object store access for the Racecourse controller
//!
//! [`KubeClient`] is the only path from the controller to the API server. It is
//! passed explicitly through [`super::Context`] so tests can substitute a mock
//! or an in-memory store.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Racecourse, RacecourseStatus};
use crate::Error;

/// Trait abstracting Kubernetes client operations for Racecourse
///
/// Getters return `Ok(None)` when the object does not exist; every other
/// failure is an error. Writes go through `replace`, which sends the fetched
/// `resourceVersion` so a concurrent modification fails with a conflict.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch the latest version of a Racecourse
    async fn get_racecourse(&self, namespace: &str, name: &str)
        -> Result<Option<Racecourse>, Error>;

    /// Overwrite the status subresource of a Racecourse
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RacecourseStatus,
    ) -> Result<(), Error>;

    /// Fetch a ConfigMap
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> Result<Option<ConfigMap>, Error>;

    /// Create a ConfigMap
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error>;

    /// Replace a ConfigMap
    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error>;

    /// Fetch a Service
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error>;

    /// Create a Service
    async fn create_service(&self, service: &Service) -> Result<Service, Error>;

    /// Replace a Service
    async fn replace_service(&self, service: &Service) -> Result<Service, Error>;

    /// Fetch a Deployment
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, Error>;

    /// Create a Deployment
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error>;

    /// Replace a Deployment
    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error>;

    /// Fetch an Ingress
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error>;

    /// Create an Ingress
    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error>;

    /// Replace an Ingress
    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    field_manager: String,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K>(&self, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + k8s_openapi::Resource
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::missing(<K as k8s_openapi::Resource>::KIND, "metadata.namespace"))?;
        Ok(self.api::<K>(&namespace).create(&self.post_params(), obj).await?)
    }

    async fn replace<K>(&self, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + k8s_openapi::Resource
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::missing(<K as k8s_openapi::Resource>::KIND, "metadata.namespace"))?;
        Ok(self
            .api::<K>(&namespace)
            .replace(&obj.name_any(), &self.post_params(), obj)
            .await?)
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_racecourse(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Racecourse>, Error> {
        self.get(namespace, name).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RacecourseStatus,
    ) -> Result<(), Error> {
        let api: Api<Racecourse> = self.api(namespace);

        let status_patch = serde_json::json!({
            "status": status
        });

        api.patch_status(
            name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        self.get(namespace, name).await
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        self.create(config_map).await
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        self.replace(config_map).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        self.get(namespace, name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, Error> {
        self.create(service).await
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, Error> {
        self.replace(service).await
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        self.get(namespace, name).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        self.create(deployment).await
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        self.replace(deployment).await
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error> {
        self.get(namespace, name).await
    }

    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        self.create(ingress).await
    }

    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        self.replace(ingress).await
    }
}
