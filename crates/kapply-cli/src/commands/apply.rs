//! Apply command - render a template and reconcile it into a cluster

use console::style;
use kapply_kube::{
    Applier, KubeCluster, OwnerReferencePolicy, ReconcileOptions, TypeRegistry, parse_gvk,
};
use std::path::PathBuf;

use super::RenderArgs;
use crate::display::{ConsoleObserver, print_summary};
use crate::error::{CliError, Result};

pub struct ApplyArgs {
    pub render: RenderArgs,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub preserve_owner_references: bool,
    pub register_kinds: Vec<String>,
}

/// Built-in kinds plus every `--register-kind`
fn build_registry(register_kinds: &[String]) -> Result<TypeRegistry> {
    let mut builder = TypeRegistry::builtin_builder();
    for spec in register_kinds {
        let gvk = parse_gvk(spec).map_err(|e| CliError::usage(format!("--register-kind: {}", e)))?;
        builder = builder.register_gvk(gvk);
    }
    Ok(builder.build())
}

pub async fn run(args: ApplyArgs) -> Result<()> {
    // Argument problems are reported before any cluster access
    let registry = build_registry(&args.register_kinds)?;
    tracing::debug!(kinds = registry.len(), "type registry ready");

    let mut options = args.render.options();
    options.reconcile = ReconcileOptions {
        owner_references: if args.preserve_owner_references {
            OwnerReferencePolicy::Preserve
        } else {
            OwnerReferencePolicy::Strip
        },
    };

    let cluster = KubeCluster::connect(args.kubeconfig.as_deref(), args.context.as_deref()).await?;

    println!(
        "{} Applying {} to namespace {}",
        style("→").blue().bold(),
        style(args.render.template.display()).cyan(),
        style(&args.render.namespace).yellow()
    );

    let applier = Applier::new(cluster, registry, options);
    let report = applier
        .apply_with_observer(&args.render.request(), &ConsoleObserver)
        .await?;

    print_summary(&report);

    if report.has_failures() {
        return Err(CliError::PartialFailure {
            failed: report.failed(),
            total: report.outcomes.len(),
        });
    }
    Ok(())
}
