//! Turns listed backend objects into comparable observed state.
//!
//! The backend refers to other objects by `{ObjectType, Moid}`; files refer
//! to them by name. Observed references are rewritten to names through the
//! snapshot's own handle index so both sides fingerprint the same way.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};

use super::ObjectStore;
use crate::model::{reference_name, Fields, Identity, ManagedObject, RemoteHandle};
use crate::remote::ObservedObject;
use crate::schema::{is_system_field, FieldKind, ObjectSchema, SchemaRegistry};

const SYSTEM_DEFAULT_TAGS: &[&str] = &["cisco.meta.SystemDefault", "cisco.meta.CiscoProvided"];

/// Listed object that could not be turned into observed state.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedObject {
    pub object_type: String,
    pub handle: RemoteHandle,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ObservedSnapshot {
    pub store: ObjectStore,
    /// Vendor-provided objects: resolvable, never exported or deleted.
    pub system_defaults: HashSet<Identity>,
    pub rejected: Vec<RejectedObject>,
}

impl ObservedSnapshot {
    pub fn is_system_default(&self, identity: &Identity) -> bool {
        self.system_defaults.contains(identity)
    }
}

/// True when the object carries a vendor system-default tag set to `true`.
pub fn is_system_default(fields: &Fields) -> bool {
    fields
        .get("Tags")
        .and_then(Value::as_array)
        .is_some_and(|tags| {
            tags.iter().any(|tag| {
                let key = tag.get("Key").and_then(Value::as_str).unwrap_or("");
                let value = tag.get("Value").and_then(Value::as_str).unwrap_or("");
                SYSTEM_DEFAULT_TAGS.contains(&key) && value.eq_ignore_ascii_case("true")
            })
        })
}

/// Builds the observed snapshot from listings grouped by object type.
pub fn normalize_observed(
    registry: &SchemaRegistry,
    listings: Vec<(String, Vec<ObservedObject>)>,
) -> ObservedSnapshot {
    let mut snapshot = ObservedSnapshot::default();

    // Global objects first: scoped objects need their organization's name.
    let mut pending: Vec<(&ObjectSchema, ObservedObject)> = Vec::new();
    for (object_type, objects) in listings {
        let schema = match registry.lookup(&object_type) {
            Ok(schema) => schema,
            Err(e) => {
                log::warn!("Ignoring listing: {}", e);
                continue;
            }
        };
        for object in objects {
            pending.push((schema, object));
        }
    }
    pending.sort_by_key(|(schema, _)| !schema.is_global());

    let mut index: HashMap<RemoteHandle, Identity> = HashMap::new();
    let mut keyed: Vec<(&ObjectSchema, ObservedObject, Identity)> = Vec::new();
    for (schema, object) in pending {
        match identity_of(schema, &object.fields, &index) {
            Ok(identity) => {
                index.insert(object.handle.clone(), identity.clone());
                keyed.push((schema, object, identity));
            }
            Err(reason) => snapshot.rejected.push(RejectedObject {
                object_type: schema.object_type.clone(),
                handle: object.handle,
                reason,
            }),
        }
    }

    for (schema, object, identity) in keyed {
        let system_default = is_system_default(&object.fields);
        let fields = rewrite_fields(schema, object.fields, &index);
        match ManagedObject::observed(registry, fields, object.handle.clone()) {
            Ok(managed) => {
                if managed.identity() != &identity {
                    log::debug!("Observed {} keyed as {}", identity, managed.identity());
                }
                let identity = managed.identity().clone();
                if let Err(duplicate) = snapshot.store.insert(managed) {
                    log::warn!(
                        "Backend lists {} twice; ignoring handle {}",
                        duplicate.identity(),
                        object.handle
                    );
                    continue;
                }
                if system_default {
                    snapshot.system_defaults.insert(identity);
                }
            }
            Err(e) => snapshot.rejected.push(RejectedObject {
                object_type: schema.object_type.clone(),
                handle: object.handle,
                reason: e.to_string(),
            }),
        }
    }

    for rejected in &snapshot.rejected {
        log::warn!(
            "Ignoring observed {} {}: {}",
            rejected.object_type,
            rejected.handle,
            rejected.reason
        );
    }
    snapshot
}

fn identity_of(
    schema: &ObjectSchema,
    fields: &Fields,
    index: &HashMap<RemoteHandle, Identity>,
) -> Result<Identity, String> {
    let name = fields
        .get("Name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "object has no Name".to_string())?;
    if schema.is_global() {
        return Ok(Identity::global(&schema.object_type, name));
    }

    let organization = fields
        .get("Organization")
        .and_then(|org| {
            reference_name(org).or_else(|| {
                handle_of(org)
                    .and_then(|h| index.get(&h))
                    .map(|id| id.name.clone())
            })
        })
        .ok_or_else(|| "organization could not be resolved".to_string())?;
    Ok(Identity::scoped(&schema.object_type, organization, name))
}

fn handle_of(value: &Value) -> Option<RemoteHandle> {
    value
        .get("Moid")
        .and_then(Value::as_str)
        .map(RemoteHandle::new)
}

/// Rewrites handle references to name references and drops fields a
/// closed schema does not declare.
fn rewrite_fields(
    schema: &ObjectSchema,
    fields: Fields,
    index: &HashMap<RemoteHandle, Identity>,
) -> Fields {
    let mut out = Map::new();
    for (name, value) in fields {
        let keep = name == "ObjectType"
            || is_system_field(&name)
            || schema.open
            || schema.field(&name).is_some();
        if !keep {
            continue;
        }

        let value = match schema.field(&name).map(|f| &f.kind) {
            Some(FieldKind::Reference { .. }) => rewrite_reference(value, index),
            _ => value,
        };
        out.insert(name, value);
    }
    out
}

fn rewrite_reference(value: Value, index: &HashMap<RemoteHandle, Identity>) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| rewrite_reference(item, index))
                .collect(),
        ),
        Value::Object(map) => {
            let target = map
                .get("Moid")
                .and_then(Value::as_str)
                .and_then(|moid| index.get(&RemoteHandle::new(moid)));
            match target {
                Some(identity) => {
                    let mut named = Map::new();
                    named.insert("Name".to_string(), Value::String(identity.name.clone()));
                    named.insert(
                        "ObjectType".to_string(),
                        Value::String(identity.object_type.clone()),
                    );
                    if let Some(org) = &identity.organization {
                        named.insert("Organization".to_string(), Value::String(org.clone()));
                    }
                    Value::Object(named)
                }
                None => Value::Object(map),
            }
        }
        other => other,
    }
}
