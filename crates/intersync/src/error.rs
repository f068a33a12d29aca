use thiserror::Error;

use crate::remote::ApiError;
use crate::schema::SchemaError;
use crate::secrets::SecretError;
use crate::store::SourceError;
use crate::sync::SyncError;

#[derive(Error, Debug)]
pub enum IntersyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("File error: {0}")]
    Source(#[from] SourceError),

    #[error("Remote API error: {0}")]
    Api(#[from] ApiError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {name} is required")]
    MissingVar { name: &'static str },

    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to resolve {name}: {source}")]
    Secret {
        name: &'static str,
        #[source]
        source: SecretError,
    },
}

pub type Result<T> = std::result::Result<T, IntersyncError>;
