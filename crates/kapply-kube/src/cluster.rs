//! Seam between the apply pipeline and the API server
//!
//! [`ClusterApi`] is everything the pipeline needs from a cluster: one
//! discovery call and a generic per-coordinate client. [`KubeCluster`] talks
//! to a real server; `MockCluster` keeps state in memory for tests.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kapply_core::GenericResource;
use kube::{
    Client, Config,
    api::{Api, DynamicObject, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::discovery::ResourceCoordinate;
use crate::error::{KubeError, Result};

/// Discovery and client construction
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Resource list the server publishes for a group-version
    ///
    /// `v1` is served by the core endpoint, everything else by
    /// `/apis/<group>/<version>`.
    async fn server_resources(&self, group_version: &str) -> kube::Result<APIResourceList>;

    /// Client bound to one resource collection
    ///
    /// `namespace` is `Some` only for namespaced coordinates.
    fn resource_client(
        &self,
        coordinate: &ResourceCoordinate,
        namespace: Option<&str>,
    ) -> Box<dyn ResourceClient>;
}

/// Create and patch on a single resource collection
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn create(&self, resource: &GenericResource) -> kube::Result<()>;

    async fn patch_strategic(&self, name: &str, body: &JsonValue) -> kube::Result<()>;
}

/// [`ClusterApi`] backed by a live API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an explicit kubeconfig and/or context
    ///
    /// With neither, the configuration is inferred (in-cluster service
    /// account, `KUBECONFIG`, then `~/.kube/config`).
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Self> {
        let config = match (kubeconfig, context) {
            (None, None) => Config::infer()
                .await
                .map_err(|e| KubeError::Credentials(format!("failed to infer config: {}", e)))?,
            (path, context) => {
                let kubeconfig = match path {
                    Some(path) => Kubeconfig::read_from(path).map_err(|e| {
                        KubeError::Credentials(format!(
                            "failed to read kubeconfig {}: {}",
                            path.display(),
                            e
                        ))
                    })?,
                    None => Kubeconfig::read().map_err(|e| {
                        KubeError::Credentials(format!("failed to read kubeconfig: {}", e))
                    })?,
                };
                let options = KubeConfigOptions {
                    context: context.map(str::to_string),
                    ..Default::default()
                };
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| {
                        KubeError::Credentials(format!("failed to load kubeconfig: {}", e))
                    })?
            }
        };

        tracing::debug!(cluster_url = %config.cluster_url, "connecting to cluster");
        let client = Client::try_from(config)
            .map_err(|e| KubeError::Credentials(format!("failed to create client: {}", e)))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn server_resources(&self, group_version: &str) -> kube::Result<APIResourceList> {
        if group_version == "v1" {
            self.client.list_core_api_resources(group_version).await
        } else {
            self.client.list_api_group_resources(group_version).await
        }
    }

    fn resource_client(
        &self,
        coordinate: &ResourceCoordinate,
        namespace: Option<&str>,
    ) -> Box<dyn ResourceClient> {
        let api_resource = coordinate.to_api_resource();
        let api = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &api_resource),
            None => Api::all_with(self.client.clone(), &api_resource),
        };
        Box::new(KubeResourceClient { api })
    }
}

struct KubeResourceClient {
    api: Api<DynamicObject>,
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn create(&self, resource: &GenericResource) -> kube::Result<()> {
        let object: DynamicObject =
            serde_json::from_value(resource.to_value()).map_err(kube::Error::SerdeError)?;
        self.api.create(&PostParams::default(), &object).await?;
        Ok(())
    }

    async fn patch_strategic(&self, name: &str, body: &JsonValue) -> kube::Result<()> {
        self.api
            .patch(name, &PatchParams::default(), &Patch::Strategic(body))
            .await?;
        Ok(())
    }
}
