//! Error types for kapply-kube

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KubeError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Values or manifest could not be decoded
    #[error(transparent)]
    Decode(#[from] kapply_core::CoreError),

    #[error("template file {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Render(#[from] kapply_engine::EngineError),

    #[error("discovery failed for {gvk}: {source}")]
    Discovery {
        gvk: String,
        #[source]
        source: kube::Error,
    },

    #[error("could not create {kind} '{namespace}/{name}': {source}")]
    Create {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("could not patch {kind} '{namespace}/{name}': {source}")]
    Patch {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("could not build patch body for {kind} '{namespace}/{name}': {reason}")]
    PatchBody {
        kind: String,
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("could not load cluster credentials: {0}")]
    Credentials(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// True if the server rejected a create because the object exists
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.reason == "AlreadyExists")
}

/// True if the server answered 404 Not Found
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
