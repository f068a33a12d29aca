//! Identities and the objects they name.

pub mod fingerprint;
pub mod identity;
pub mod object;

pub use fingerprint::{canonical_fields, canonical_value, changed_fields, ContentFingerprint};
pub use identity::{Identity, DEFAULT_ORGANIZATION};
pub use object::{reference_name, Fields, ManagedObject, ObjectRef, RemoteHandle};
