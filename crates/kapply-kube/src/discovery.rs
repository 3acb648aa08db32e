//! Runtime resolution of a document's kind to its REST collection
//!
//! Nothing about resource kinds is compiled in: the server's resource list
//! for the document's group-version is fetched and scanned for the kind.
//! Lists are cached per group-version for the lifetime of one resolver, and
//! a resolver lives for one apply.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kapply_core::TypeRef;
use kube::discovery::ApiResource;
use std::collections::HashMap;

use crate::cluster::ClusterApi;
use crate::error::{KubeError, Result, is_not_found};

/// Where a kind lives on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCoordinate {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name used in URLs, e.g. `deployments`
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceCoordinate {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn to_api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

/// Kind-to-collection resolver with a per-group-version cache
pub struct ResourceResolver<'a> {
    cluster: &'a dyn ClusterApi,
    cache: HashMap<String, APIResourceList>,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(cluster: &'a dyn ClusterApi) -> Self {
        Self {
            cluster,
            cache: HashMap::new(),
        }
    }

    /// Resolve a document type
    ///
    /// Returns `Ok(None)` when the server does not serve the kind (including
    /// an unknown group-version). Sub-resources such as `deployments/scale`
    /// never match.
    pub async fn resolve(&mut self, type_ref: &TypeRef) -> Result<Option<ResourceCoordinate>> {
        let group_version = type_ref.api_version.as_str();
        if self.cache.contains_key(group_version) {
            tracing::debug!(group_version, "discovery cache hit");
        } else {
            let list = self.fetch(type_ref).await?;
            self.cache.insert(group_version.to_string(), list);
        }

        let coordinate = self.cache[group_version]
            .resources
            .iter()
            .find(|r| r.kind == type_ref.kind && !r.name.contains('/'))
            .map(|r| ResourceCoordinate {
                group: type_ref.group().to_string(),
                version: type_ref.version().to_string(),
                kind: r.kind.clone(),
                plural: r.name.clone(),
                namespaced: r.namespaced,
            });

        Ok(coordinate)
    }

    async fn fetch(&self, type_ref: &TypeRef) -> Result<APIResourceList> {
        let group_version = type_ref.api_version.as_str();
        tracing::debug!(group_version, "fetching server resources");

        match self.cluster.server_resources(group_version).await {
            Ok(list) => Ok(list),
            Err(err) if is_not_found(&err) => {
                tracing::debug!(group_version, "group-version not served");
                Ok(APIResourceList {
                    group_version: group_version.to_string(),
                    resources: Vec::new(),
                })
            }
            Err(source) => Err(KubeError::Discovery {
                gvk: type_ref.to_string(),
                source,
            }),
        }
    }

    /// Number of group-versions fetched so far
    pub fn cached_group_versions(&self) -> usize {
        self.cache.len()
    }
}
