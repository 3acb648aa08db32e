//! The apply pipeline
//!
//! values -> render -> decode -> (per resource) resolve -> reconcile
//!
//! Anything that goes wrong before the first resource is reached aborts the
//! apply. After that, every resource is handled on its own: a failure is
//! reported and the next resource is processed. Nothing is rolled back.

use kapply_core::{
    GenericResource, MergeOptions, ParsedItem, Values, ValuesMerger, parse_manifest,
    parse_set_values,
};
use kapply_engine::{DEFAULT_MAX_PASSES, Engine, RenderOutput};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::PathBuf;

use crate::cluster::ClusterApi;
use crate::discovery::ResourceResolver;
use crate::error::{KubeError, Result};
use crate::reconcile::{ReconcileOptions, ReconcileOutcome, Reconciler, ResourceOutcome};
use crate::registry::TypeRegistry;

/// Parameter key the target namespace is exposed under
pub const NAMESPACE_KEY: &str = "namespace";

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub merge: MergeOptions,
    /// Fail on undefined template variables
    pub strict: bool,
    pub max_render_passes: usize,
    /// Directory for intermediate render artifacts (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,
    pub reconcile: ReconcileOptions,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            merge: MergeOptions::default(),
            strict: true,
            max_render_passes: DEFAULT_MAX_PASSES,
            temp_dir: None,
            reconcile: ReconcileOptions::default(),
        }
    }
}

impl ApplyOptions {
    fn engine(&self) -> Engine {
        let builder = Engine::builder()
            .strict(self.strict)
            .max_passes(self.max_render_passes);
        match &self.temp_dir {
            Some(dir) => builder.temp_dir(dir.clone()).build(),
            None => builder.build(),
        }
    }
}

/// Inputs of one apply
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    pub template: PathBuf,
    pub namespace: String,
    /// Merged in order, later files win
    pub value_files: Vec<PathBuf>,
    /// `key.path=value` overrides, merged after the value files
    pub set_values: Vec<String>,
}

impl ApplyRequest {
    pub fn new(template: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_values_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.value_files.push(path.into());
        self
    }

    pub fn with_set(mut self, assignment: impl Into<String>) -> Self {
        self.set_values.push(assignment.into());
        self
    }
}

/// Rendered template together with the parameters it was rendered from
#[derive(Debug, Clone)]
pub struct RenderedManifest {
    pub values: Values,
    pub output: RenderOutput,
}

/// Build the parameter set and render the template, without a cluster
pub fn render(request: &ApplyRequest, options: &ApplyOptions) -> Result<RenderedManifest> {
    let mut values = ValuesMerger::new(options.merge).merge_files(&request.value_files)?;
    if !request.set_values.is_empty() {
        let overrides = parse_set_values(&request.set_values)?;
        values.merge_with(&overrides, options.merge);
    }
    values.set(NAMESPACE_KEY, JsonValue::String(request.namespace.clone()));

    fs::metadata(&request.template).map_err(|source| KubeError::Stat {
        path: request.template.clone(),
        source,
    })?;

    let output = options.engine().render_file(&request.template, &values)?;
    tracing::debug!(
        template = %request.template.display(),
        passes = output.passes,
        bytes = output.bytes.len(),
        "rendered template"
    );

    Ok(RenderedManifest { values, output })
}

/// Receives each outcome as soon as it is known
pub trait OutcomeObserver: Send + Sync {
    fn on_outcome(&self, outcome: &ResourceOutcome);
}

pub struct NoopObserver;

impl OutcomeObserver for NoopObserver {
    fn on_outcome(&self, _outcome: &ResourceOutcome) {}
}

/// Every outcome of one apply, in manifest order
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub outcomes: Vec<ResourceOutcome>,
}

impl ApplyReport {
    fn count(&self, matches: impl Fn(&ReconcileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| matches(&o.outcome)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, ReconcileOutcome::Created))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, ReconcileOutcome::Updated))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ReconcileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(ReconcileOutcome::is_failure)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// e.g. "2 created, 1 updated, 1 failed"
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [
            (self.created(), "created"),
            (self.updated(), "updated"),
            (self.skipped(), "skipped"),
            (self.failed(), "failed"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{} {}", count, label))
        .collect();

        if parts.is_empty() {
            "no resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Applies rendered templates to a cluster
pub struct Applier<C: ClusterApi> {
    cluster: C,
    registry: TypeRegistry,
    options: ApplyOptions,
}

impl<C: ClusterApi> Applier<C> {
    pub fn new(cluster: C, registry: TypeRegistry, options: ApplyOptions) -> Self {
        Self {
            cluster,
            registry,
            options,
        }
    }

    pub async fn apply(&self, request: &ApplyRequest) -> Result<ApplyReport> {
        self.apply_with_observer(request, &NoopObserver).await
    }

    /// Run the pipeline, reporting each resource to `observer` as it completes
    pub async fn apply_with_observer(
        &self,
        request: &ApplyRequest,
        observer: &dyn OutcomeObserver,
    ) -> Result<ApplyReport> {
        let rendered = render(request, &self.options)?;
        let items = parse_manifest(&rendered.output.bytes)?;
        tracing::debug!(count = items.len(), "decoded manifest");

        let mut resolver = ResourceResolver::new(&self.cluster);
        let reconciler = Reconciler::new(&self.registry, self.options.reconcile);
        let mut report = ApplyReport::default();

        for item in items {
            let outcome = self
                .apply_item(item, &mut resolver, &reconciler, &request.namespace)
                .await;
            log_outcome(&outcome);
            observer.on_outcome(&outcome);
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    async fn apply_item(
        &self,
        item: ParsedItem,
        resolver: &mut ResourceResolver<'_>,
        reconciler: &Reconciler<'_>,
        namespace: &str,
    ) -> ResourceOutcome {
        let mut resource: GenericResource = match item {
            Ok(resource) => resource,
            Err(err) => {
                return ResourceOutcome {
                    kind: "<invalid>".to_string(),
                    name: String::new(),
                    namespace: None,
                    outcome: ReconcileOutcome::Failed {
                        reason: err.to_string(),
                    },
                };
            }
        };

        let coordinate = match resolver.resolve(resource.type_ref()).await {
            Ok(Some(coordinate)) => coordinate,
            Ok(None) => {
                let reason = format!("kind {} not found", resource.type_ref());
                let outcome = ReconcileOutcome::Skipped { reason };
                return ResourceOutcome::for_resource(&resource, outcome);
            }
            Err(err) => {
                let outcome = ReconcileOutcome::Failed {
                    reason: err.to_string(),
                };
                return ResourceOutcome::for_resource(&resource, outcome);
            }
        };

        let outcome = match reconciler
            .reconcile(&self.cluster, &coordinate, &mut resource, namespace)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => ReconcileOutcome::Failed {
                reason: err.to_string(),
            },
        };

        ResourceOutcome::for_resource(&resource, outcome)
    }
}

fn log_outcome(outcome: &ResourceOutcome) {
    let namespace = outcome.namespace.as_deref().unwrap_or_default();
    match &outcome.outcome {
        ReconcileOutcome::Created => tracing::info!(
            kind = %outcome.kind,
            namespace,
            name = %outcome.name,
            "resource created"
        ),
        ReconcileOutcome::Updated => tracing::info!(
            kind = %outcome.kind,
            namespace,
            name = %outcome.name,
            "resource updated"
        ),
        ReconcileOutcome::Skipped { reason } => tracing::warn!(
            kind = %outcome.kind,
            namespace,
            name = %outcome.name,
            %reason,
            "resource skipped"
        ),
        ReconcileOutcome::Failed { reason } => tracing::warn!(
            kind = %outcome.kind,
            namespace,
            name = %outcome.name,
            %reason,
            "resource failed"
        ),
    }
}
