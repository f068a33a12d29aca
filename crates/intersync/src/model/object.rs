use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fingerprint::ContentFingerprint;
use super::identity::{Identity, DEFAULT_ORGANIZATION};
use crate::schema::{FieldKind, ObjectSchema, SchemaError, SchemaRegistry, ORGANIZATION_TYPE};

pub type Fields = Map<String, Value>;

/// Opaque backend identifier of an object (the `Moid`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteHandle(String);

impl RemoteHandle {
    pub fn new(moid: impl Into<String>) -> Self {
        Self(moid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference held by one field of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub field: String,
    pub target: Identity,
}

/// An object of desired or observed state.
///
/// Objects are built once per run and never mutated afterwards; planning
/// and execution produce new records instead.
#[derive(Debug, Clone)]
pub struct ManagedObject {
    identity: Identity,
    fields: Fields,
    references: Vec<ObjectRef>,
    handle: Option<RemoteHandle>,
    fingerprint: ContentFingerprint,
    origin: Option<PathBuf>,
}

impl ManagedObject {
    /// Builds a desired object from file content.
    ///
    /// `fields` must carry a canonical `ObjectType` and a `Name`. Reference
    /// fields are rewritten to their canonical name form; a missing
    /// `Organization` on an organization-scoped type defaults to `default`.
    pub fn desired(
        registry: &SchemaRegistry,
        fields: Fields,
        origin: Option<PathBuf>,
    ) -> Result<Self, SchemaError> {
        let mut object = Self::build(registry, fields, None, true)?;
        object.origin = origin;
        Ok(object)
    }

    /// Builds an observed object from normalized backend content.
    ///
    /// Reference values that could not be mapped back to names are kept
    /// verbatim and do not take part in resolution.
    pub fn observed(
        registry: &SchemaRegistry,
        fields: Fields,
        handle: RemoteHandle,
    ) -> Result<Self, SchemaError> {
        Self::build(registry, fields, Some(handle), false)
    }

    fn build(
        registry: &SchemaRegistry,
        mut fields: Fields,
        handle: Option<RemoteHandle>,
        strict: bool,
    ) -> Result<Self, SchemaError> {
        let object_type = fields
            .get("ObjectType")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::InvalidObject {
                object_type: "<unknown>".to_string(),
                reason: "missing ObjectType".to_string(),
            })?
            .to_string();
        let schema = registry.lookup(&object_type)?;
        let invalid = |reason: String| SchemaError::InvalidObject {
            object_type: object_type.clone(),
            reason,
        };

        let name = fields
            .get("Name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid("missing Name".to_string()))?
            .to_string();

        let organization = if schema.is_global() {
            None
        } else {
            let org = match fields.get("Organization") {
                None | Some(Value::Null) => DEFAULT_ORGANIZATION.to_string(),
                Some(value) => reference_name(value).ok_or_else(|| {
                    invalid(format!("Organization of '{}' is not a name", name))
                })?,
            };
            fields.insert("Organization".to_string(), Value::String(org.clone()));
            Some(org)
        };

        let identity = Identity {
            object_type: object_type.clone(),
            organization,
            name,
        };

        let mut references = Vec::new();
        for def in schema.reference_fields() {
            let FieldKind::Reference { target, many } = &def.kind else {
                continue;
            };
            let Some(value) = fields.get(&def.name).filter(|v| !v.is_null()) else {
                continue;
            };

            let items: Vec<&Value> = match (value, *many) {
                (Value::Array(items), true) => items.iter().collect(),
                (single, false) => vec![single],
                _ if strict => {
                    return Err(invalid(format!("{} must be a list of names", def.name)));
                }
                _ => continue,
            };

            let mut canonical = Vec::with_capacity(items.len());
            for item in items {
                match parse_reference(registry, item, target, identity.organization.as_deref()) {
                    Some((target_identity, value)) => {
                        references.push(ObjectRef {
                            field: def.name.clone(),
                            target: target_identity,
                        });
                        canonical.push(value);
                    }
                    None if strict => {
                        return Err(invalid(format!(
                            "{} of '{}' is not a valid reference",
                            def.name, identity.name
                        )));
                    }
                    None => canonical.push(item.clone()),
                }
            }

            let rewritten = if *many {
                Value::Array(canonical)
            } else {
                canonical.pop().unwrap_or(Value::Null)
            };
            fields.insert(def.name.clone(), rewritten);
        }

        let fingerprint = ContentFingerprint::of(schema, &fields);
        Ok(Self {
            identity,
            fields,
            references,
            handle,
            fingerprint,
            origin: None,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn object_type(&self) -> &str {
        &self.identity.object_type
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn references(&self) -> &[ObjectRef] {
        &self.references
    }

    pub fn handle(&self) -> Option<&RemoteHandle> {
        self.handle.as_ref()
    }

    pub fn fingerprint(&self) -> ContentFingerprint {
        self.fingerprint
    }

    /// File the object was read from, for desired objects.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Fields a user maintains: everything except system and read-only
    /// fields, in stored order.
    pub fn user_fields(&self, schema: &ObjectSchema) -> Fields {
        self.fields
            .iter()
            .filter(|(k, _)| !schema.is_read_only(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Name carried by a reference value, either a plain string or a mapping
/// with a `Name` key.
pub fn reference_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("Name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Parses one reference value into the target identity and its canonical
/// value: a bare name when type and organization are the defaults, a
/// mapping naming only what differs otherwise.
fn parse_reference(
    registry: &SchemaRegistry,
    value: &Value,
    declared_type: &str,
    owner_org: Option<&str>,
) -> Option<(Identity, Value)> {
    let name = reference_name(value)?;
    let map = value.as_object();

    let object_type = match map.and_then(|m| m.get("ObjectType")).and_then(Value::as_str) {
        Some(raw) => registry.resolve_type_name(raw)?.to_string(),
        None => declared_type.to_string(),
    };

    let target_global = object_type == ORGANIZATION_TYPE
        || registry.lookup(&object_type).map_or(false, |s| s.is_global());
    let default_org = owner_org.unwrap_or(DEFAULT_ORGANIZATION);
    let organization = if target_global {
        None
    } else {
        let explicit = map
            .and_then(|m| m.get("Organization"))
            .and_then(reference_name);
        Some(explicit.unwrap_or_else(|| default_org.to_string()))
    };

    let mut canonical = Map::new();
    canonical.insert("Name".to_string(), Value::String(name.clone()));
    if object_type != declared_type {
        canonical.insert("ObjectType".to_string(), Value::String(object_type.clone()));
    }
    if let Some(org) = organization.as_deref().filter(|o| *o != default_org) {
        canonical.insert("Organization".to_string(), Value::String(org.to_string()));
    }
    let canonical = if canonical.len() == 1 {
        Value::String(name.clone())
    } else {
        Value::Object(canonical)
    };

    Some((
        Identity {
            object_type,
            organization,
            name,
        },
        canonical,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_scoped_object_defaults_organization() {
        let registry = SchemaRegistry::builtin();
        let object = ManagedObject::desired(
            &registry,
            fields(json!({"ObjectType": "ntp.Policy", "Name": "ntp1"})),
            None,
        )
        .unwrap();
        assert_eq!(object.identity(), &Identity::scoped("ntp.Policy", "default", "ntp1"));
        assert_eq!(object.fields()["Organization"], json!("default"));
        assert_eq!(
            object.references(),
            &[ObjectRef {
                field: "Organization".to_string(),
                target: Identity::global(ORGANIZATION_TYPE, "default"),
            }]
        );
    }

    #[test]
    fn test_reference_forms_are_canonicalized() {
        let registry = SchemaRegistry::builtin();
        let object = ManagedObject::desired(
            &registry,
            fields(json!({
                "ObjectType": "server.Profile",
                "Name": "web",
                "Organization": {"Name": "prod"},
                "BiosPolicy": {"Name": "bios1"},
                "NtpPolicy": {"Name": "ntp1", "Organization": "shared"},
                "AssignedServer": {"Name": "rack-1", "ObjectType": "compute.RackUnit"}
            })),
            None,
        )
        .unwrap();

        assert_eq!(object.fields()["Organization"], json!("prod"));
        assert_eq!(object.fields()["BiosPolicy"], json!("bios1"));
        assert_eq!(
            object.fields()["NtpPolicy"],
            json!({"Name": "ntp1", "Organization": "shared"})
        );
        assert_eq!(
            object.fields()["AssignedServer"],
            json!({"Name": "rack-1", "ObjectType": "compute.RackUnit"})
        );

        let targets: Vec<String> = object
            .references()
            .iter()
            .map(|r| r.target.to_string())
            .collect();
        assert_eq!(
            targets,
            vec![
                "organization.Organization prod",
                "compute.RackUnit rack-1",
                "bios.Policy prod/bios1",
                "ntp.Policy shared/ntp1",
            ]
        );
    }

    #[test]
    fn test_equivalent_reference_forms_share_fingerprint() {
        let registry = SchemaRegistry::builtin();
        let a = ManagedObject::desired(
            &registry,
            fields(json!({"ObjectType": "vnic.LanConnectivityPolicy", "Name": "lan", "IqnPool": "iqn"})),
            None,
        )
        .unwrap();
        let b = ManagedObject::observed(
            &registry,
            fields(json!({
                "ObjectType": "vnic.LanConnectivityPolicy",
                "Name": "lan",
                "Organization": {"Name": "default", "ObjectType": "organization.Organization"},
                "IqnPool": {"Name": "iqn", "ObjectType": "iqnpool.Pool", "Organization": "default"},
                "Moid": "m-1"
            })),
            RemoteHandle::new("m-1"),
        )
        .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(b.handle().map(RemoteHandle::as_str), Some("m-1"));
    }

    #[test]
    fn test_missing_name_is_invalid() {
        let registry = SchemaRegistry::builtin();
        let err = ManagedObject::desired(&registry, fields(json!({"ObjectType": "ntp.Policy"})), None)
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidObject { .. }));
    }

    #[test]
    fn test_malformed_reference_is_rejected_for_desired_only() {
        let registry = SchemaRegistry::builtin();
        let raw = json!({
            "ObjectType": "vnic.LanConnectivityPolicy",
            "Name": "lan",
            "IqnPool": {"Moid": "abc", "ObjectType": "iqnpool.Pool"}
        });
        assert!(ManagedObject::desired(&registry, fields(raw.clone()), None).is_err());

        let observed =
            ManagedObject::observed(&registry, fields(raw), RemoteHandle::new("m")).unwrap();
        assert_eq!(observed.references().len(), 1);
        assert_eq!(observed.references()[0].field, "Organization");
    }
}
