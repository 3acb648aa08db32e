//! Local type catalog used to build patch bodies
//!
//! Built once, then shared read-only. A kind must be registered here for an
//! existing object to be updated; creation only needs discovery.

use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
    autoscaling::v2::HorizontalPodAutoscaler,
    batch::v1::{CronJob, Job},
    core::v1::{
        ConfigMap, Namespace, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
    },
    networking::v1::{Ingress, NetworkPolicy},
    policy::v1::PodDisruptionBudget,
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
use kapply_core::TypeRef;
use kube::core::GroupVersionKind;
use std::collections::HashMap;

use crate::error::{KubeError, Result};

/// Registered versions per (group, kind), in registration order
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    kinds: HashMap<(String, String), Vec<String>>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Registry holding the common built-in kinds
    pub fn builtin() -> Self {
        Self::builtin_builder().build()
    }

    /// Builder pre-loaded with the built-in kinds, for adding more
    pub fn builtin_builder() -> TypeRegistryBuilder {
        Self::builder()
            .register::<Deployment>()
            .register::<StatefulSet>()
            .register::<DaemonSet>()
            .register::<ReplicaSet>()
            .register::<Service>()
            .register::<ConfigMap>()
            .register::<Secret>()
            .register::<ServiceAccount>()
            .register::<Namespace>()
            .register::<PersistentVolumeClaim>()
            .register::<Pod>()
            .register::<Job>()
            .register::<CronJob>()
            .register::<Ingress>()
            .register::<NetworkPolicy>()
            .register::<Role>()
            .register::<RoleBinding>()
            .register::<ClusterRole>()
            .register::<ClusterRoleBinding>()
            .register::<HorizontalPodAutoscaler>()
            .register::<PodDisruptionBudget>()
    }

    /// Registered type for a document type
    ///
    /// Matches on group and kind. The document's own version wins when it is
    /// registered, otherwise the first registered version is used.
    pub fn lookup(&self, type_ref: &TypeRef) -> Option<TypeRef> {
        let key = (type_ref.group().to_string(), type_ref.kind.clone());
        let versions = self.kinds.get(&key)?;

        let version = versions
            .iter()
            .find(|v| v.as_str() == type_ref.version())
            .or_else(|| versions.first())?;

        let api_version = if key.0.is_empty() {
            version.clone()
        } else {
            format!("{}/{}", key.0, version)
        };
        Some(TypeRef::new(api_version, key.1))
    }

    pub fn len(&self) -> usize {
        self.kinds.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    registry: TypeRegistry,
}

impl TypeRegistryBuilder {
    /// Register a compiled Kubernetes type
    pub fn register<K: k8s_openapi::Resource>(self) -> Self {
        self.register_gvk(GroupVersionKind::gvk(K::GROUP, K::VERSION, K::KIND))
    }

    pub fn register_gvk(mut self, gvk: GroupVersionKind) -> Self {
        let versions = self
            .registry
            .kinds
            .entry((gvk.group, gvk.kind))
            .or_default();
        if !versions.contains(&gvk.version) {
            versions.push(gvk.version);
        }
        self
    }

    pub fn build(self) -> TypeRegistry {
        self.registry
    }
}

/// Parse `group/version/Kind`, or `version/Kind` for the core group
pub fn parse_gvk(spec: &str) -> Result<GroupVersionKind> {
    let parts: Vec<&str> = spec.trim().split('/').collect();
    let gvk = match parts.as_slice() {
        [version, kind] => GroupVersionKind::gvk("", version, kind),
        [group, version, kind] => GroupVersionKind::gvk(group, version, kind),
        _ => {
            return Err(KubeError::InvalidConfig(format!(
                "expected group/version/Kind or version/Kind, got '{}'",
                spec
            )));
        }
    };

    if gvk.version.is_empty() || gvk.kind.is_empty() {
        return Err(KubeError::InvalidConfig(format!(
            "version and kind must not be empty in '{}'",
            spec
        )));
    }
    Ok(gvk)
}
