//! Error types for sheetsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading the job configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("{path} not found. Please create it.")]
    NotFound { path: PathBuf },

    /// JSON parse error on load.
    #[error("{path} is not a valid JSON file: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error on load.
    #[error("{path} is not a valid YAML file: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The file parsed but its content cannot drive a sync.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
