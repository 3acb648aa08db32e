//! Idempotent create-or-patch of a single resource

use kapply_core::GenericResource;
use serde_json::Value as JsonValue;
use std::fmt;

use crate::cluster::ClusterApi;
use crate::discovery::ResourceCoordinate;
use crate::error::{KubeError, Result, is_already_exists};
use crate::registry::TypeRegistry;

/// What to do with `metadata.ownerReferences` found in a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OwnerReferencePolicy {
    /// Remove them before create and patch
    #[default]
    Strip,
    /// Send them as written
    Preserve,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub owner_references: OwnerReferencePolicy,
}

/// Result of reconciling one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Skipped { reason: String },
    Failed { reason: String },
}

impl ReconcileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Skipped { reason } => write!(f, "skipped: {}", reason),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome tagged with the resource it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub outcome: ReconcileOutcome,
}

impl ResourceOutcome {
    pub fn for_resource(resource: &GenericResource, outcome: ReconcileOutcome) -> Self {
        Self {
            kind: resource.kind().to_string(),
            name: resource.name().to_string(),
            namespace: resource.namespace().map(str::to_string),
            outcome,
        }
    }

    /// `Kind namespace/name`, or `Kind name` when cluster-scoped
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{} {}/{}", self.kind, ns, self.name),
            None => format!("{} {}", self.kind, self.name),
        }
    }
}

/// Create-or-patch against a resolved collection
pub struct Reconciler<'a> {
    registry: &'a TypeRegistry,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a TypeRegistry, options: ReconcileOptions) -> Self {
        Self { registry, options }
    }

    /// Set the namespace and strip server-managed metadata
    ///
    /// Namespaced resources keep their own namespace and fall back to
    /// `default_namespace`. Cluster-scoped resources are left unscoped.
    pub fn prepare(
        &self,
        resource: &mut GenericResource,
        coordinate: &ResourceCoordinate,
        default_namespace: &str,
    ) {
        if coordinate.namespaced && resource.namespace().is_none() {
            resource.set_namespace(default_namespace);
        }
        resource.strip_server_fields(self.options.owner_references == OwnerReferencePolicy::Preserve);
    }

    /// Create the resource, or patch it if it already exists
    ///
    /// Returns `Created` or `Updated`; any failure is an error naming the
    /// resource and the operation that failed.
    pub async fn reconcile(
        &self,
        cluster: &dyn ClusterApi,
        coordinate: &ResourceCoordinate,
        resource: &mut GenericResource,
        default_namespace: &str,
    ) -> Result<ReconcileOutcome> {
        self.prepare(resource, coordinate, default_namespace);

        let namespace = if coordinate.namespaced {
            resource.namespace()
        } else {
            None
        };
        let client = cluster.resource_client(coordinate, namespace);

        let err = match client.create(resource).await {
            Ok(()) => return Ok(ReconcileOutcome::Created),
            Err(err) => err,
        };

        if !is_already_exists(&err) {
            return Err(KubeError::Create {
                kind: resource.kind().to_string(),
                namespace: namespace.unwrap_or_default().to_string(),
                name: resource.name().to_string(),
                source: err,
            });
        }

        tracing::info!(
            kind = resource.kind(),
            namespace = namespace.unwrap_or_default(),
            name = resource.name(),
            "resource already exists, updating"
        );

        let body = self.patch_body(resource)?;
        client
            .patch_strategic(resource.name(), &body)
            .await
            .map_err(|source| KubeError::Patch {
                kind: resource.kind().to_string(),
                namespace: namespace.unwrap_or_default().to_string(),
                name: resource.name().to_string(),
                source,
            })?;

        Ok(ReconcileOutcome::Updated)
    }

    /// Patch body: a copy of the resource stamped with its registered type
    pub fn patch_body(&self, resource: &GenericResource) -> Result<JsonValue> {
        let registered = self
            .registry
            .lookup(resource.type_ref())
            .ok_or_else(|| KubeError::PatchBody {
                kind: resource.kind().to_string(),
                namespace: resource.namespace().unwrap_or_default().to_string(),
                name: resource.name().to_string(),
                reason: format!(
                    "{} is not in the type registry (add it with --register-kind)",
                    resource.type_ref()
                ),
            })?;

        Ok(resource.to_value_as(&registered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use kapply_core::TypeRef;
    use serde_json::json;

    fn coordinate(kind: &str, plural: &str, namespaced: bool) -> ResourceCoordinate {
        ResourceCoordinate {
            group: String::new(),
            version: "v1".to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced,
        }
    }

    fn resource(value: JsonValue) -> GenericResource {
        GenericResource::from_value(value, "test").unwrap()
    }

    fn service(name: &str) -> GenericResource {
        resource(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": name,
                "uid": "1234",
                "resourceVersion": "99",
                "ownerReferences": [{"apiVersion": "apps/v1", "kind": "Deployment", "name": "web", "uid": "abcd"}]
            },
            "spec": {"ports": [{"port": 80}]}
        }))
    }

    #[test]
    fn test_prepare_injects_namespace_for_namespaced_kinds() {
        let registry = TypeRegistry::builtin();
        let reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        let mut svc = service("svc");
        reconciler.prepare(&mut svc, &coordinate("Service", "services", true), "team-a");
        assert_eq!(svc.namespace(), Some("team-a"));
        assert!(svc.owner_references().is_none());
        assert!(svc.to_value()["metadata"].get("uid").is_none());
    }

    #[test]
    fn test_prepare_keeps_document_namespace() {
        let registry = TypeRegistry::builtin();
        let reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        let mut svc = service("svc");
        svc.set_namespace("explicit");
        reconciler.prepare(&mut svc, &coordinate("Service", "services", true), "team-a");
        assert_eq!(svc.namespace(), Some("explicit"));
    }

    #[test]
    fn test_prepare_leaves_cluster_scoped_unscoped() {
        let registry = TypeRegistry::builtin();
        let reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        let mut ns = resource(json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "team-a"}}));
        reconciler.prepare(&mut ns, &coordinate("Namespace", "namespaces", false), "default");
        assert_eq!(ns.namespace(), None);
    }

    #[test]
    fn test_preserve_owner_references() {
        let registry = TypeRegistry::builtin();
        let options = ReconcileOptions {
            owner_references: OwnerReferencePolicy::Preserve,
        };
        let reconciler = Reconciler::new(&registry, options);

        let mut svc = service("svc");
        reconciler.prepare(&mut svc, &coordinate("Service", "services", true), "default");
        assert!(svc.owner_references().is_some());
        assert!(svc.to_value()["metadata"].get("resourceVersion").is_none());
    }

    #[tokio::test]
    async fn test_create_then_update() {
        let cluster = MockCluster::with_builtin_discovery();
        let registry = TypeRegistry::builtin();
        let reconciler = Reconciler::new(&registry, ReconcileOptions::default());
        let coord = coordinate("Service", "services", true);

        let first = reconciler
            .reconcile(&cluster, &coord, &mut service("svc"), "team-a")
            .await
            .unwrap();
        assert_eq!(first, ReconcileOutcome::Created);

        let second = reconciler
            .reconcile(&cluster, &coord, &mut service("svc"), "team-a")
            .await
            .unwrap();
        assert_eq!(second, ReconcileOutcome::Updated);

        let counts = cluster.operation_counts();
        assert_eq!(counts.creates, 2);
        assert_eq!(counts.patches, 1);
        assert!(cluster.object("services", Some("team-a"), "svc").is_some());
    }

    #[tokio::test]
    async fn test_update_of_unregistered_kind_fails() {
        let cluster = MockCluster::new();
        let registry = TypeRegistry::builtin();
        let reconciler = Reconciler::new(&registry, ReconcileOptions::default());
        let coord = ResourceCoordinate {
            group: "example.com".to_string(),
            version: "v1".to_string(),
            kind: "Widget".to_string(),
            plural: "widgets".to_string(),
            namespaced: true,
        };
        let widget = || {
            resource(json!({"apiVersion": "example.com/v1", "kind": "Widget", "metadata": {"name": "w"}}))
        };

        reconciler
            .reconcile(&cluster, &coord, &mut widget(), "default")
            .await
            .unwrap();
        let err = reconciler
            .reconcile(&cluster, &coord, &mut widget(), "default")
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::PatchBody { .. }));
        assert!(err.to_string().contains("example.com/v1, Kind=Widget"));
        assert_eq!(cluster.operation_counts().patches, 0);
    }

    #[tokio::test]
    async fn test_create_failure_carries_resource_identity() {
        let cluster = MockCluster::new();
        cluster.reject_creates("Service", 403, "Forbidden");
        let registry = TypeRegistry::builtin();
        let reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        let err = reconciler
            .reconcile(&cluster, &coordinate("Service", "services", true), &mut service("svc"), "team-a")
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("could not create Service 'team-a/svc'"));
    }

    #[test]
    fn test_patch_body_uses_registered_type() {
        let registry = TypeRegistry::builtin();
        let reconciler = Reconciler::new(&registry, ReconcileOptions::default());
        let deployment = resource(json!({
            "apiVersion": "apps/v1beta2",
            "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"replicas": 3}
        }));

        let body = reconciler.patch_body(&deployment).unwrap();
        assert_eq!(body["apiVersion"], "apps/v1");
        assert_eq!(body["spec"]["replicas"], 3);
        assert_eq!(deployment.type_ref(), &TypeRef::new("apps/v1beta2", "Deployment"));
    }

    #[test]
    fn test_outcome_display() {
        let outcome = ResourceOutcome {
            kind: "Service".to_string(),
            name: "svc".to_string(),
            namespace: Some("team-a".to_string()),
            outcome: ReconcileOutcome::Skipped {
                reason: "kind not found".to_string(),
            },
        };
        assert_eq!(outcome.display_name(), "Service team-a/svc");
        assert_eq!(outcome.outcome.to_string(), "skipped: kind not found");
    }
}
