//! Classification of every object into the operation that reconciles it.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::model::{changed_fields, Identity, ManagedObject};
use crate::schema::{SchemaError, SchemaRegistry};
use crate::store::{ObjectStore, ObservedSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    NoOp,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        f.write_str(name)
    }
}

/// Restricts a run to a subset of managed object types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeFilter {
    types: Option<HashSet<String>>,
}

impl TypeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Accepts canonical names, folders and short keys. An empty list means
    /// every type.
    pub fn parse(registry: &SchemaRegistry, raw: &[String]) -> Result<Self, SchemaError> {
        let mut types = HashSet::new();
        for entry in raw.iter().flat_map(|r| r.split(',')) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let object_type = registry
                .resolve_type_name(entry)
                .ok_or_else(|| SchemaError::UnknownType(entry.to_string()))?;
            if !registry.lookup(object_type)?.is_managed() {
                return Err(SchemaError::InvalidObject {
                    object_type: object_type.to_string(),
                    reason: "type is reference-only and cannot be synced".to_string(),
                });
            }
            types.insert(object_type.to_string());
        }
        Ok(Self {
            types: (!types.is_empty()).then_some(types),
        })
    }

    pub fn includes(&self, object_type: &str) -> bool {
        self.types.as_ref().map_or(true, |t| t.contains(object_type))
    }

    pub fn is_all(&self) -> bool {
        self.types.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub identity: Identity,
    pub desired: Option<ManagedObject>,
    pub observed: Option<ManagedObject>,
    /// User fields that differ, for updates.
    pub changed_fields: Vec<String>,
}

impl Operation {
    /// Whichever side is authoritative for the operation.
    pub fn object(&self) -> Option<&ManagedObject> {
        self.desired.as_ref().or(self.observed.as_ref())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub noop: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    operations: Vec<Operation>,
}

impl Plan {
    /// Compares desired with observed state.
    ///
    /// Desired objects come first in desired order, followed by deletions
    /// in observed order. Observed objects of reference-only types,
    /// filtered-out types and system defaults are never deleted.
    pub fn compute(
        registry: &SchemaRegistry,
        desired: &ObjectStore,
        observed: &ObservedSnapshot,
        filter: &TypeFilter,
    ) -> Self {
        Self::compute_holding(registry, desired, observed, filter, &HashSet::new())
    }

    /// Like [`Plan::compute`], for a file tree where the definitions of
    /// `held` objects could not be read. A held object gets an update (or
    /// create) without desired content, which the caller must fail; it is
    /// never deleted.
    pub fn compute_holding(
        registry: &SchemaRegistry,
        desired: &ObjectStore,
        observed: &ObservedSnapshot,
        filter: &TypeFilter,
        held: &HashSet<Identity>,
    ) -> Self {
        let mut operations = Vec::with_capacity(desired.len() + held.len());

        for object in desired.iter() {
            if !filter.includes(object.object_type()) {
                continue;
            }
            let identity = object.identity().clone();
            let current = observed.store.get(&identity);
            let (kind, changed) = match current {
                None => (OperationKind::Create, Vec::new()),
                Some(current) if current.fingerprint() == object.fingerprint() => {
                    (OperationKind::NoOp, Vec::new())
                }
                Some(current) => {
                    let changed = registry
                        .lookup(object.object_type())
                        .map(|schema| changed_fields(schema, object.fields(), current.fields()))
                        .unwrap_or_default();
                    (OperationKind::Update, changed)
                }
            };
            operations.push(Operation {
                kind,
                identity,
                desired: Some(object.clone()),
                observed: current.cloned(),
                changed_fields: changed,
            });
        }

        let mut unreadable: Vec<&Identity> = held
            .iter()
            .filter(|id| !desired.contains(id) && filter.includes(&id.object_type))
            .collect();
        unreadable.sort_by_key(|id| id.to_string());
        for identity in unreadable {
            let current = observed.store.get(identity);
            let kind = if current.is_some() {
                OperationKind::Update
            } else {
                OperationKind::Create
            };
            operations.push(Operation {
                kind,
                identity: identity.clone(),
                desired: None,
                observed: current.cloned(),
                changed_fields: Vec::new(),
            });
        }

        for object in observed.store.iter() {
            let identity = object.identity();
            if desired.contains(identity)
                || held.contains(identity)
                || observed.is_system_default(identity)
                || !filter.includes(object.object_type())
                || !registry
                    .lookup(object.object_type())
                    .is_ok_and(|s| s.is_managed())
            {
                continue;
            }
            operations.push(Operation {
                kind: OperationKind::Delete,
                identity: identity.clone(),
                desired: None,
                observed: Some(object.clone()),
                changed_fields: Vec::new(),
            });
        }

        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn get(&self, identity: &Identity) -> Option<&Operation> {
        self.operations.iter().find(|op| &op.identity == identity)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn classification(&self) -> Classification {
        let mut counts = Classification::default();
        for op in &self.operations {
            match op.kind {
                OperationKind::Create => counts.create += 1,
                OperationKind::Update => counts.update += 1,
                OperationKind::Delete => counts.delete += 1,
                OperationKind::NoOp => counts.noop += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RemoteHandle;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn desired(registry: &SchemaRegistry, value: Value) -> ManagedObject {
        let Value::Object(fields) = value else { unreachable!() };
        ManagedObject::desired(registry, fields, None).unwrap()
    }

    fn observed(registry: &SchemaRegistry, value: Value, moid: &str) -> ManagedObject {
        let Value::Object(fields) = value else { unreachable!() };
        ManagedObject::observed(registry, fields, RemoteHandle::new(moid)).unwrap()
    }

    fn kinds(plan: &Plan) -> Vec<(String, OperationKind)> {
        plan.operations()
            .iter()
            .map(|op| (op.identity.name.clone(), op.kind))
            .collect()
    }

    #[test]
    fn test_classifies_each_object_once() {
        let registry = SchemaRegistry::builtin();
        let mut files = ObjectStore::new();
        for value in [
            json!({"ObjectType": "ntp.Policy", "Name": "same", "Enabled": true}),
            json!({"ObjectType": "ntp.Policy", "Name": "changed", "Enabled": true}),
            json!({"ObjectType": "ntp.Policy", "Name": "new"}),
        ] {
            files.insert(desired(&registry, value)).unwrap();
        }

        let mut snapshot = ObservedSnapshot::default();
        for (value, moid) in [
            (json!({"ObjectType": "ntp.Policy", "Name": "same", "Organization": "default", "Enabled": true, "Moid": "m1"}), "m1"),
            (json!({"ObjectType": "ntp.Policy", "Name": "changed", "Organization": "default", "Enabled": false}), "m2"),
            (json!({"ObjectType": "ntp.Policy", "Name": "gone", "Organization": "default"}), "m3"),
            (json!({"ObjectType": "ntp.Policy", "Name": "vendor", "Organization": "default"}), "m4"),
        ] {
            snapshot.store.insert(observed(&registry, value, moid)).unwrap();
        }
        snapshot
            .system_defaults
            .insert(Identity::scoped("ntp.Policy", "default", "vendor"));

        let plan = Plan::compute(&registry, &files, &snapshot, &TypeFilter::all());
        assert_eq!(
            kinds(&plan),
            vec![
                ("same".to_string(), OperationKind::NoOp),
                ("changed".to_string(), OperationKind::Update),
                ("new".to_string(), OperationKind::Create),
                ("gone".to_string(), OperationKind::Delete),
            ]
        );
        let changed = plan
            .get(&Identity::scoped("ntp.Policy", "default", "changed"))
            .unwrap();
        assert_eq!(changed.changed_fields, vec!["Enabled".to_string()]);
        assert_eq!(
            plan.classification(),
            Classification { create: 1, update: 1, delete: 1, noop: 1 }
        );
    }

    #[test]
    fn test_held_objects_are_never_deleted() {
        let registry = SchemaRegistry::builtin();
        let mut snapshot = ObservedSnapshot::default();
        snapshot
            .store
            .insert(observed(
                &registry,
                json!({"ObjectType": "ntp.Policy", "Name": "keep", "Organization": "default"}),
                "m1",
            ))
            .unwrap();
        let keep = Identity::scoped("ntp.Policy", "default", "keep");
        let fresh = Identity::scoped("ntp.Policy", "default", "fresh");
        let held: HashSet<Identity> = [keep.clone(), fresh.clone()].into_iter().collect();

        let plan = Plan::compute_holding(
            &registry,
            &ObjectStore::new(),
            &snapshot,
            &TypeFilter::all(),
            &held,
        );
        assert_eq!(
            kinds(&plan),
            vec![
                ("fresh".to_string(), OperationKind::Create),
                ("keep".to_string(), OperationKind::Update),
            ]
        );
        assert!(plan.get(&keep).unwrap().desired.is_none());
        assert!(plan.get(&keep).unwrap().observed.is_some());
        assert_eq!(plan.classification().delete, 0);
    }

    #[test]
    fn test_filter_limits_deletes() {
        let registry = SchemaRegistry::builtin();
        let mut snapshot = ObservedSnapshot::default();
        snapshot
            .store
            .insert(observed(
                &registry,
                json!({"ObjectType": "ntp.Policy", "Name": "n", "Organization": "default"}),
                "m1",
            ))
            .unwrap();
        snapshot
            .store
            .insert(observed(
                &registry,
                json!({"ObjectType": "compute.RackUnit", "Name": "rack-1"}),
                "m2",
            ))
            .unwrap();

        let filter = TypeFilter::parse(&registry, &["bios".to_string()]).unwrap();
        let plan = Plan::compute(&registry, &ObjectStore::new(), &snapshot, &filter);
        assert!(plan.is_empty());

        let plan = Plan::compute(&registry, &ObjectStore::new(), &snapshot, &TypeFilter::all());
        assert_eq!(kinds(&plan), vec![("n".to_string(), OperationKind::Delete)]);
    }

    #[test]
    fn test_filter_parsing() {
        let registry = SchemaRegistry::builtin();
        let filter =
            TypeFilter::parse(&registry, &["ntp,policies/bios".to_string()]).unwrap();
        assert!(filter.includes("ntp.Policy"));
        assert!(filter.includes("bios.Policy"));
        assert!(!filter.includes("server.Profile"));
        assert!(TypeFilter::parse(&registry, &[]).unwrap().is_all());
        assert_eq!(
            TypeFilter::parse(&registry, &["nope".to_string()]),
            Err(SchemaError::UnknownType("nope".to_string()))
        );
        assert!(TypeFilter::parse(&registry, &["compute.Blade".to_string()]).is_err());
    }
}
