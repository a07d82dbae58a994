//! Cluster access for the Service reconciler.
//!
//! `ClusterClient` is the seam between reconcile logic and the API server,
//! so the convergence rules can be exercised against a mock.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::App;
use crate::error::{Error, Result};

/// Outcome of reading a single object.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Failed(Error),
}

impl<T> Lookup<T> {
    pub fn from_api(result: std::result::Result<T, kube::Error>) -> Self {
        match result {
            Ok(obj) => Lookup::Found(obj),
            Err(kube::Error::Api(e)) if e.code == 404 => Lookup::NotFound,
            Err(e) => Lookup::Failed(Error::Kube(e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Persist,
    /// Run admission and defaulting without storing the result.
    DryRun,
}

impl WriteMode {
    fn post_params(self, field_manager: &str) -> PostParams {
        PostParams {
            dry_run: self == WriteMode::DryRun,
            field_manager: Some(field_manager.to_string()),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_app(&self, name: &str, namespace: &str) -> Lookup<App>;

    async fn get_service(&self, name: &str, namespace: &str) -> Lookup<Service>;

    async fn create_service(&self, service: &Service) -> Result<Service>;

    /// Replace a Service, returning the object as the server sees it.
    async fn update_service(&self, service: &Service, mode: WriteMode) -> Result<Service>;

    async fn update_app_status(&self, app: &App) -> Result<()>;
}

pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
}

impl KubeClusterClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn services(&self, service: &Service) -> Result<Api<Service>> {
        let namespace = service
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_app(&self, name: &str, namespace: &str) -> Lookup<App> {
        let api: Api<App> = Api::namespaced(self.client.clone(), namespace);
        Lookup::from_api(api.get(name).await)
    }

    async fn get_service(&self, name: &str, namespace: &str) -> Lookup<Service> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Lookup::from_api(api.get(name).await)
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let api = self.services(service)?;
        let params = WriteMode::Persist.post_params(&self.field_manager);
        Ok(api.create(&params, service).await?)
    }

    async fn update_service(&self, service: &Service, mode: WriteMode) -> Result<Service> {
        let api = self.services(service)?;
        let name = service.metadata.name.as_deref().ok_or(Error::MissingField("metadata.name"))?;
        let params = mode.post_params(&self.field_manager);

        let updated = api.replace(name, &params, service).await?;
        debug!(service = %name, ?mode, "replaced Service");
        Ok(updated)
    }

    async fn update_app_status(&self, app: &App) -> Result<()> {
        let namespace = app.namespace().ok_or(Error::MissingField("metadata.namespace"))?;
        let api: Api<App> = Api::namespaced(self.client.clone(), &namespace);

        let patch = serde_json::json!({ "status": app.status });
        api.patch_status(
            &app.name_any(),
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }
}
