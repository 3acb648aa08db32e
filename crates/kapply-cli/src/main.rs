//! kapply CLI - render a Jinja2 template and apply it to Kubernetes

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::RenderArgs;
use commands::apply::ApplyArgs;

#[derive(Parser)]
#[command(name = "kapply")]
#[command(version)]
#[command(about = "Render a Jinja2 template and apply the result to a Kubernetes cluster", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the template and create or update every resource in it
    Apply {
        #[command(flatten)]
        render: RenderArgs,

        /// Kubeconfig file (defaults to KUBECONFIG, then ~/.kube/config)
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        /// Kubeconfig context to use instead of the current one
        #[arg(long)]
        context: Option<String>,

        /// Send metadata.ownerReferences as written instead of stripping them
        #[arg(long)]
        preserve_owner_references: bool,

        /// Allow updates of an extra kind (group/version/Kind, or version/Kind for core)
        #[arg(long = "register-kind", value_name = "GVK")]
        register_kinds: Vec<String>,
    },

    /// Render the template locally and print the result
    Template {
        #[command(flatten)]
        render: RenderArgs,

        /// Show merged values
        #[arg(long)]
        show_values: bool,
    },
}

/// Log filter from KAPPLY_LOG, falling back to `warn` (`debug` with --debug)
fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = std::env::var("KAPPLY_LOG")
        .ok()
        .and_then(|env| EnvFilter::from_str(&env).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Apply {
            render,
            kubeconfig,
            context,
            preserve_owner_references,
            register_kinds,
        } => {
            commands::apply::run(ApplyArgs {
                render,
                kubeconfig,
                context,
                preserve_owner_references,
                register_kinds,
            })
            .await
        }

        Commands::Template {
            render,
            show_values,
        } => commands::template::run(&render, show_values, cli.debug),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
