//! Collaborator contract for the remote infrastructure-management API.
//!
//! Calls are synchronous from the caller's point of view. Retrying is the
//! implementation's business; an error returned here is final.

pub mod http;
pub mod memory;

use serde_json::Value;
use thiserror::Error;

use crate::model::{Fields, RemoteHandle};

pub use http::{Credentials, HttpRemote};
pub use memory::{CallKind, InMemoryRemote, RemoteCall};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("API error {status}: {message}")]
pub struct ApiError {
    /// HTTP status, `0` when no response was received.
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    /// Connection failures, timeouts, throttling and server errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, 0 | 408 | 429) || self.status >= 500
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// An object as listed by the backend, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedObject {
    pub handle: RemoteHandle,
    pub fields: Fields,
}

impl ObservedObject {
    /// Wraps a listed JSON object; the `Moid` becomes the handle.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(ApiError::new(0, "listed item is not an object"));
        };
        let moid = fields
            .get("Moid")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::new(0, "listed object has no Moid"))?;
        Ok(Self {
            handle: RemoteHandle::new(moid),
            fields,
        })
    }
}

pub trait RemoteApi: Send + Sync {
    fn list_objects(&self, object_type: &str) -> Result<Vec<ObservedObject>>;

    fn create_object(&self, object_type: &str, fields: &Fields) -> Result<RemoteHandle>;

    fn update_object(&self, object_type: &str, handle: &RemoteHandle, fields: &Fields)
        -> Result<()>;

    fn delete_object(&self, object_type: &str, handle: &RemoteHandle) -> Result<()>;
}
