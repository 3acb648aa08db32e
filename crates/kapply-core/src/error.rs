//! Core error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unable to read values file {}: {source}", path.display())]
    ValuesRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode values file {}: {source}", path.display())]
    ValuesDecode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("values file {} must contain a mapping at the top level", path.display())]
    ValuesNotMapping { path: PathBuf },

    #[error("invalid --set value: {message}")]
    InvalidSetValue { message: String },

    #[error("could not decode manifest: {0}")]
    ManifestDecode(#[from] serde_yaml::Error),

    #[error("invalid resource at {location}: {message}")]
    InvalidResource { location: String, message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
