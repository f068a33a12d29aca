//! Desired and observed object collections.
//!
//! Both sides of a run are held in an [`ObjectStore`]: an immutable-after-
//! load snapshot keyed by identity that remembers insertion order, so every
//! later stage iterates deterministically.

pub mod error;
pub mod normalize;
pub mod source;
pub mod writer;

use std::collections::HashMap;

use crate::model::{Identity, ManagedObject, RemoteHandle};

pub use error::SourceError;
pub use normalize::{is_system_default, normalize_observed, ObservedSnapshot, RejectedObject};
pub use source::{DesiredSource, FileError, FileSource, InvalidEntry, Loaded};
pub use writer::FileWriter;

#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: Vec<ManagedObject>,
    by_identity: HashMap<Identity, usize>,
    by_handle: HashMap<RemoteHandle, usize>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object. An object whose identity is already present is
    /// handed back untouched.
    pub fn insert(&mut self, object: ManagedObject) -> Result<(), ManagedObject> {
        if self.by_identity.contains_key(object.identity()) {
            return Err(object);
        }
        let index = self.objects.len();
        self.by_identity.insert(object.identity().clone(), index);
        if let Some(handle) = object.handle() {
            self.by_handle.insert(handle.clone(), index);
        }
        self.objects.push(object);
        Ok(())
    }

    pub fn get(&self, identity: &Identity) -> Option<&ManagedObject> {
        self.by_identity.get(identity).map(|&i| &self.objects[i])
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.by_identity.contains_key(identity)
    }

    pub fn by_handle(&self, handle: &RemoteHandle) -> Option<&ManagedObject> {
        self.by_handle.get(handle).map(|&i| &self.objects[i])
    }

    /// Objects in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedObject> {
        self.objects.iter()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.objects.iter().map(ManagedObject::identity)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use serde_json::{json, Value};

    fn object(registry: &SchemaRegistry, value: Value, handle: Option<&str>) -> ManagedObject {
        let Value::Object(fields) = value else {
            unreachable!()
        };
        match handle {
            Some(h) => ManagedObject::observed(registry, fields, RemoteHandle::new(h)).unwrap(),
            None => ManagedObject::desired(registry, fields, None).unwrap(),
        }
    }

    #[test]
    fn test_insert_rejects_duplicate_identity() {
        let registry = SchemaRegistry::builtin();
        let mut store = ObjectStore::new();
        store
            .insert(object(&registry, json!({"ObjectType": "ntp.Policy", "Name": "a"}), None))
            .unwrap();
        let dup = store
            .insert(object(&registry, json!({"ObjectType": "ntp.Policy", "Name": "a", "Enabled": true}), None))
            .unwrap_err();
        assert_eq!(dup.name(), "a");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lookup_by_handle_and_order() {
        let registry = SchemaRegistry::builtin();
        let mut store = ObjectStore::new();
        for (name, moid) in [("b", "m2"), ("a", "m1")] {
            store
                .insert(object(
                    &registry,
                    json!({"ObjectType": "ntp.Policy", "Name": name}),
                    Some(moid),
                ))
                .unwrap();
        }
        assert_eq!(store.by_handle(&RemoteHandle::new("m1")).unwrap().name(), "a");
        let names: Vec<&str> = store.iter().map(ManagedObject::name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
