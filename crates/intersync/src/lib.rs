pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod sanitize;
pub mod schema;
pub mod secrets;
pub mod store;
pub mod sync;

pub use config::Settings;
pub use error::{ConfigError, IntersyncError, Result};
pub use model::{Fields, Identity, ManagedObject, RemoteHandle};
pub use remote::{ApiError, HttpRemote, InMemoryRemote, RemoteApi};
pub use schema::{SchemaError, SchemaRegistry, ValidationLevel};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use store::{DesiredSource, FileSource, FileWriter, ObjectStore};
pub use sync::{
    CancelToken, ExportOptions, Exporter, Reconciler, RunReport, SyncError, SyncOptions,
};
