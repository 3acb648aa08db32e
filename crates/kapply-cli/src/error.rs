//! CLI error types with exit code handling
//!
//! Library errors are folded into [`CliError`] so that each failure class
//! maps to one process exit code. Template diagnostics pass through untouched
//! so miette can still point at the offending line.

use kapply_core::CoreError;
use kapply_engine::EngineError;
use kapply_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Rendering failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Render(#[from] EngineError),

    /// Value files or --set arguments
    #[error("Values error: {message}")]
    #[diagnostic(code(kapply::cli::values))]
    Values {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Rendered output could not be decoded
    #[error("Manifest error: {message}")]
    #[diagnostic(
        code(kapply::cli::manifest),
        help("run `kapply template` with the same arguments to inspect the rendered output")
    )]
    Manifest { message: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(kapply::cli::io))]
    Io { message: String },

    #[error("Cluster error: {message}")]
    #[diagnostic(
        code(kapply::cli::cluster),
        help("check --kubeconfig, --context and the KUBECONFIG environment variable")
    )]
    Cluster { message: String },

    /// Apply finished but some resources failed
    #[error("{failed} of {total} resource(s) failed")]
    #[diagnostic(code(kapply::cli::partial_failure))]
    PartialFailure { failed: usize, total: usize },

    #[error("Invalid argument: {message}")]
    #[diagnostic(code(kapply::cli::usage))]
    Usage { message: String },

    #[error("{message}")]
    #[diagnostic(code(kapply::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Render(EngineError::Io { .. }) => exit_codes::IO_ERROR,
            CliError::Render(_) => exit_codes::TEMPLATE_ERROR,
            CliError::Values { .. } => exit_codes::VALUES_ERROR,
            CliError::Manifest { .. } => exit_codes::MANIFEST_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::PartialFailure { .. } => exit_codes::PARTIAL_FAILURE,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidSetValue { .. } => CliError::Values {
                message: err.to_string(),
                help: Some("use --set key.path=value, e.g. --set image.tag=1.2.3".to_string()),
            },
            CoreError::ValuesRead { .. }
            | CoreError::ValuesDecode { .. }
            | CoreError::ValuesNotMapping { .. } => CliError::Values {
                message: err.to_string(),
                help: None,
            },
            CoreError::ManifestDecode(_) | CoreError::InvalidResource { .. } => CliError::Manifest {
                message: err.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Decode(core) => core.into(),
            KubeError::Render(engine) => CliError::Render(engine),
            KubeError::Stat { .. } => CliError::Io {
                message: err.to_string(),
            },
            KubeError::Credentials(_) | KubeError::Discovery { .. } => CliError::Cluster {
                message: err.to_string(),
            },
            KubeError::InvalidConfig(message) => CliError::Usage { message },
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
