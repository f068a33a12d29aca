use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or writing the file tree.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Files directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Failed to serialize YAML: {0}")]
    SerializeYaml(String),

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Export path '{path}' is claimed by both {first} and {second}")]
    PathConflict {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<serde_yaml::Error> for SourceError {
    fn from(err: serde_yaml::Error) -> Self {
        SourceError::SerializeYaml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
