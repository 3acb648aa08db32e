//! CLI commands

pub mod apply;
pub mod template;

use clap::Args;
use kapply_core::MergeOptions;
use kapply_engine::DEFAULT_MAX_PASSES;
use kapply_kube::{ApplyOptions, ApplyRequest};
use std::path::PathBuf;

/// Arguments shared by every command that renders a template
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Template file to render
    pub template: PathBuf,

    /// Values file(s) to merge, later files win
    #[arg(short = 'f', long = "values")]
    pub values: Vec<PathBuf>,

    /// Set values on command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Target namespace, exposed to the template as `namespace`
    #[arg(short, long, env = "KAPPLY_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Concatenate sequences when merging value files instead of replacing them
    #[arg(long)]
    pub recurse_arrays: bool,

    /// Give up when the output still contains template syntax after this many passes
    #[arg(long, env = "KAPPLY_MAX_RENDER_PASSES", default_value_t = DEFAULT_MAX_PASSES)]
    pub max_render_passes: usize,

    /// Render undefined variables as empty instead of failing
    #[arg(long)]
    pub lenient: bool,
}

impl RenderArgs {
    pub fn request(&self) -> ApplyRequest {
        ApplyRequest {
            template: self.template.clone(),
            namespace: self.namespace.clone(),
            value_files: self.values.clone(),
            set_values: self.set.clone(),
        }
    }

    pub fn options(&self) -> ApplyOptions {
        ApplyOptions {
            merge: MergeOptions {
                recurse_arrays: self.recurse_arrays,
            },
            strict: !self.lenient,
            max_render_passes: self.max_render_passes,
            ..Default::default()
        }
    }
}
