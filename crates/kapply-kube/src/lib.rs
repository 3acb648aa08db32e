//! kapply Kube - applying rendered templates to a cluster
//!
//! This crate provides:
//! - **Apply pipeline**: values, render, decode, then create-or-patch each resource
//! - **Discovery**: runtime kind-to-collection resolution with a per-group-version cache
//! - **Reconciliation**: create, falling back to a strategic merge patch on conflict
//! - **Type registry**: the kinds an existing object may be updated as
//! - **Mock cluster**: an in-memory [`ClusterApi`] for tests

pub mod apply;
pub mod cluster;
pub mod discovery;
pub mod error;
pub mod mock;
pub mod reconcile;
pub mod registry;

pub use apply::{
    ApplyOptions, ApplyReport, ApplyRequest, Applier, NAMESPACE_KEY, NoopObserver,
    OutcomeObserver, RenderedManifest, render,
};
pub use cluster::{ClusterApi, KubeCluster, ResourceClient};
pub use discovery::{ResourceCoordinate, ResourceResolver};
pub use error::{KubeError, Result};
pub use mock::{MockCluster, OperationCounts};
pub use reconcile::{
    OwnerReferencePolicy, ReconcileOptions, ReconcileOutcome, Reconciler, ResourceOutcome,
};
pub use registry::{TypeRegistry, TypeRegistryBuilder, parse_gvk};
