use std::path::PathBuf;

use thiserror::Error;

use crate::model::Identity;
use crate::remote::ApiError;
use crate::schema::SchemaError;

/// Per-object failures raised while resolving, ordering or applying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("field {field} references {target_name} ({target}), which exists neither in files nor remotely")]
    UnresolvedReference {
        field: String,
        target_name: String,
        target: Identity,
    },

    #[error("dependency cycle between: {}", join(.identities))]
    DependencyCycle { identities: Vec<Identity> },

    #[error("{identity} is defined more than once ({})", join_paths(.origins))]
    DuplicateIdentity {
        identity: Identity,
        origins: Vec<PathBuf>,
    },

    #[error("{identity} in {} could not be read: {message}", .path.display())]
    InvalidDefinition {
        identity: Identity,
        path: PathBuf,
        message: String,
    },

    #[error("no remote handle known for {0}")]
    MissingHandle(Identity),

    #[error("worker stopped before finishing the operation")]
    WorkerLost,

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

fn join(identities: &[Identity]) -> String {
    identities
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, SyncError>;
