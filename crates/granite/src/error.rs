use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid value for environment variable '{name}': {reason}")]
    InvalidEnv { name: String, reason: String },

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Secret resolution failed: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Provide at least a file or a concept description")]
    EmptyRequest,

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job already finished: {0}")]
    AlreadyFinished(String),

    #[error("Failed to register job: {0}")]
    Register(#[from] crate::broadcast::JobStoreError),
}
