//! In-memory cluster for testing
//!
//! Serves a configurable discovery document and stores created objects so
//! the apply pipeline can run without an API server. Failures can be injected
//! per group-version (discovery) or per kind (create, patch).

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kapply_core::GenericResource;
use kube::core::ErrorResponse;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cluster::{ClusterApi, ResourceClient};
use crate::discovery::ResourceCoordinate;

/// Counts of operations performed, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub discovery_calls: usize,
    pub creates: usize,
    pub patches: usize,
}

/// (plural, namespace, name)
type ObjectKey = (String, Option<String>, String);

#[derive(Default)]
struct MockState {
    discovery: HashMap<String, APIResourceList>,
    objects: HashMap<ObjectKey, JsonValue>,
    failing_discovery: HashSet<String>,
    rejected_creates: HashMap<String, (u16, String)>,
    rejected_patches: HashMap<String, (u16, String)>,
    counts: OperationCounts,
}

/// In-memory [`ClusterApi`]
///
/// Clones share state, so a test can keep a handle while the pipeline owns
/// another.
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovery for a handful of common core and apps kinds, including
    /// sub-resources the resolver must skip
    pub fn with_builtin_discovery() -> Self {
        let cluster = Self::new();
        for (plural, kind, namespaced) in [
            ("configmaps", "ConfigMap", true),
            ("secrets", "Secret", true),
            ("services", "Service", true),
            ("services/status", "Service", true),
            ("serviceaccounts", "ServiceAccount", true),
            ("pods", "Pod", true),
            ("pods/log", "Pod", true),
            ("namespaces", "Namespace", false),
        ] {
            cluster.add_resource("v1", plural, kind, namespaced);
        }
        for (plural, kind) in [
            ("deployments/scale", "Scale"),
            ("deployments", "Deployment"),
            ("statefulsets", "StatefulSet"),
            ("daemonsets", "DaemonSet"),
        ] {
            cluster.add_resource("apps/v1", plural, kind, true);
        }
        cluster
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a resource in the discovery document of a group-version
    pub fn add_resource(&self, group_version: &str, plural: &str, kind: &str, namespaced: bool) {
        let mut state = self.write();
        let list = state
            .discovery
            .entry(group_version.to_string())
            .or_insert_with(|| APIResourceList {
                group_version: group_version.to_string(),
                resources: Vec::new(),
            });
        list.resources.push(APIResource {
            name: plural.to_string(),
            kind: kind.to_string(),
            namespaced,
            verbs: vec!["create".to_string(), "get".to_string(), "patch".to_string()],
            ..Default::default()
        });
    }

    /// Make discovery of a group-version fail with a 503
    pub fn fail_discovery(&self, group_version: &str) {
        self.write()
            .failing_discovery
            .insert(group_version.to_string());
    }

    /// Make every create of a kind fail with the given status
    pub fn reject_creates(&self, kind: &str, code: u16, reason: &str) {
        self.write()
            .rejected_creates
            .insert(kind.to_string(), (code, reason.to_string()));
    }

    /// Make every patch of a kind fail with the given status
    pub fn fail_patches(&self, kind: &str, code: u16, reason: &str) {
        self.write()
            .rejected_patches
            .insert(kind.to_string(), (code, reason.to_string()));
    }

    /// Stored object, as last created or patched
    pub fn object(&self, plural: &str, namespace: Option<&str>, name: &str) -> Option<JsonValue> {
        let key = (
            plural.to_string(),
            namespace.map(str::to_string),
            name.to_string(),
        );
        self.read().objects.get(&key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.read().objects.len()
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.read().counts.clone()
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn server_resources(&self, group_version: &str) -> kube::Result<APIResourceList> {
        let mut state = self.write();
        state.counts.discovery_calls += 1;

        if state.failing_discovery.contains(group_version) {
            return Err(api_error(
                503,
                "ServiceUnavailable",
                format!("the server is currently unable to handle {}", group_version),
            ));
        }

        state.discovery.get(group_version).cloned().ok_or_else(|| {
            api_error(
                404,
                "NotFound",
                format!("the server could not find the requested resource {}", group_version),
            )
        })
    }

    fn resource_client(
        &self,
        coordinate: &ResourceCoordinate,
        namespace: Option<&str>,
    ) -> Box<dyn ResourceClient> {
        Box::new(MockResourceClient {
            cluster: self.clone(),
            kind: coordinate.kind.clone(),
            plural: coordinate.plural.clone(),
            namespace: namespace.map(str::to_string),
        })
    }
}

struct MockResourceClient {
    cluster: MockCluster,
    kind: String,
    plural: String,
    namespace: Option<String>,
}

impl MockResourceClient {
    fn key(&self, name: &str) -> ObjectKey {
        (self.plural.clone(), self.namespace.clone(), name.to_string())
    }
}

#[async_trait]
impl ResourceClient for MockResourceClient {
    async fn create(&self, resource: &GenericResource) -> kube::Result<()> {
        let mut state = self.cluster.write();
        state.counts.creates += 1;

        if let Some((code, reason)) = state.rejected_creates.get(&self.kind) {
            return Err(api_error(
                *code,
                reason,
                format!("{} \"{}\" rejected", self.plural, resource.name()),
            ));
        }

        let key = self.key(resource.name());
        if state.objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", self.plural, resource.name()),
            ));
        }

        state.objects.insert(key, resource.to_value());
        Ok(())
    }

    async fn patch_strategic(&self, name: &str, body: &JsonValue) -> kube::Result<()> {
        let mut state = self.cluster.write();
        state.counts.patches += 1;

        if let Some((code, reason)) = state.rejected_patches.get(&self.kind) {
            return Err(api_error(
                *code,
                reason,
                format!("{} \"{}\" is invalid", self.plural, name),
            ));
        }

        let Some(existing) = state.objects.get_mut(&self.key(name)) else {
            return Err(api_error(
                404,
                "NotFound",
                format!("{} \"{}\" not found", self.plural, name),
            ));
        };
        merge_patch(existing, body);
        Ok(())
    }
}

/// Mappings merge, `null` deletes, everything else replaces
fn merge_patch(target: &mut JsonValue, patch: &JsonValue) {
    match (target, patch) {
        (JsonValue::Object(target_map), JsonValue::Object(patch_map)) => {
            for (key, value) in patch_map {
                if value.is_null() {
                    target_map.remove(key);
                } else if let Some(existing) = target_map.get_mut(key) {
                    merge_patch(existing, value);
                } else {
                    target_map.insert(key.clone(), value.clone());
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_map(name: &str, data: JsonValue) -> GenericResource {
        GenericResource::from_value(
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": name, "namespace": "default"},
                "data": data
            }),
            "test",
        )
        .unwrap()
    }

    fn config_map_coordinate() -> ResourceCoordinate {
        ResourceCoordinate {
            group: String::new(),
            version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            plural: "configmaps".to_string(),
            namespaced: true,
        }
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let cluster = MockCluster::new();
        let client = cluster.resource_client(&config_map_coordinate(), Some("default"));

        client.create(&config_map("cfg", json!({"a": "1"}))).await.unwrap();
        let err = client
            .create(&config_map("cfg", json!({"a": "2"})))
            .await
            .unwrap_err();

        assert!(crate::error::is_already_exists(&err));
        assert_eq!(cluster.object_count(), 1);
        assert_eq!(cluster.operation_counts().creates, 2);
    }

    #[tokio::test]
    async fn test_patch_merges_into_stored_object() {
        let cluster = MockCluster::new();
        let client = cluster.resource_client(&config_map_coordinate(), Some("default"));
        client
            .create(&config_map("cfg", json!({"a": "1", "b": "2"})))
            .await
            .unwrap();

        client
            .patch_strategic("cfg", &json!({"data": {"b": "3", "a": null}}))
            .await
            .unwrap();

        let stored = cluster.object("configmaps", Some("default"), "cfg").unwrap();
        assert_eq!(stored["data"], json!({"b": "3"}));
    }

    #[tokio::test]
    async fn test_patch_missing_object() {
        let cluster = MockCluster::new();
        let client = cluster.resource_client(&config_map_coordinate(), Some("default"));
        let err = client.patch_strategic("nope", &json!({})).await.unwrap_err();
        assert!(crate::error::is_not_found(&err));
    }

    #[tokio::test]
    async fn test_rejected_creates() {
        let cluster = MockCluster::new();
        cluster.reject_creates("ConfigMap", 403, "Forbidden");
        let client = cluster.resource_client(&config_map_coordinate(), Some("default"));

        let err = client.create(&config_map("cfg", json!({}))).await.unwrap_err();
        assert!(matches!(err, kube::Error::Api(ref resp) if resp.code == 403));
        assert_eq!(cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_patches_leave_object_untouched() {
        let cluster = MockCluster::new();
        let client = cluster.resource_client(&config_map_coordinate(), Some("default"));
        client.create(&config_map("cfg", json!({"a": "1"}))).await.unwrap();
        cluster.fail_patches("ConfigMap", 422, "Invalid");

        let err = client
            .patch_strategic("cfg", &json!({"data": {"a": "2"}}))
            .await
            .unwrap_err();

        assert!(matches!(err, kube::Error::Api(ref resp) if resp.code == 422));
        let stored = cluster.object("configmaps", Some("default"), "cfg").unwrap();
        assert_eq!(stored["data"], json!({"a": "1"}));
        assert_eq!(cluster.operation_counts().patches, 1);
    }

    #[tokio::test]
    async fn test_unknown_group_version_is_not_found() {
        let cluster = MockCluster::with_builtin_discovery();
        let err = cluster.server_resources("example.com/v1").await.unwrap_err();
        assert!(crate::error::is_not_found(&err));
    }
}
