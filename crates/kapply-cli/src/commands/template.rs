//! Template command - render a template locally

use console::style;
use kapply_kube::render;

use super::RenderArgs;
use crate::error::{CliError, Result};

pub fn run(args: &RenderArgs, show_values: bool, debug: bool) -> Result<()> {
    let rendered = render(&args.request(), &args.options())?;

    if debug {
        eprintln!(
            "{} Rendered {} in {} pass(es)",
            style("DEBUG").dim(),
            args.template.display(),
            rendered.output.passes
        );
    }

    // Show merged values if requested
    if show_values {
        println!("{}", style("# Computed Values").cyan().bold());
        println!("---");
        let yaml = serde_yaml::to_string(rendered.values.inner()).map_err(|e| CliError::Other {
            message: format!("Failed to serialize values: {}", e),
        })?;
        println!("{}", yaml);
        println!("---");
        println!();
    }

    println!(
        "{}",
        style(format!("# Source: {}", args.template.display())).dim()
    );
    println!("{}", rendered.output.as_str().trim_end());

    Ok(())
}
