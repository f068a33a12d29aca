use std::fmt;

use serde_json::{Map, Value};

use crate::schema::ObjectSchema;

/// Digest over the user-managed content of an object.
///
/// Backend-managed and read-only fields are left out, as are empty values,
/// so an object that only differs in those compares equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFingerprint([u8; 32]);

impl ContentFingerprint {
    pub fn of(schema: &ObjectSchema, fields: &Map<String, Value>) -> Self {
        let canonical = canonical_fields(schema, fields);
        let hash = blake3::hash(canonical.to_string().as_bytes());
        Self(*hash.as_bytes())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentFingerprint({})", &self.to_hex()[..12])
    }
}

/// User fields with keys sorted at every level and empty values removed.
pub fn canonical_fields(schema: &ObjectSchema, fields: &Map<String, Value>) -> Value {
    let mut keys: Vec<&String> = fields
        .keys()
        .filter(|k| !schema.is_read_only(k))
        .collect();
    keys.sort();

    let mut out = Map::new();
    for key in keys {
        if let Some(value) = fields.get(key).and_then(canonical_value) {
            out.insert(key.clone(), value);
        }
    }
    Value::Object(out)
}

/// Canonical form of a value, `None` when the value is empty.
pub fn canonical_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let items: Vec<Value> = items.iter().filter_map(canonical_value).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                if let Some(v) = map.get(key).and_then(canonical_value) {
                    out.insert(key.clone(), v);
                }
            }
            (!out.is_empty()).then_some(Value::Object(out))
        }
        other => Some(other.clone()),
    }
}

/// Names of the user fields whose canonical values differ, in the order
/// they appear in `desired` followed by fields only present in `observed`.
pub fn changed_fields(
    schema: &ObjectSchema,
    desired: &Map<String, Value>,
    observed: &Map<String, Value>,
) -> Vec<String> {
    let mut changed = Vec::new();
    let names = desired
        .keys()
        .chain(observed.keys().filter(|k| !desired.contains_key(*k)));
    for name in names {
        if schema.is_read_only(name) {
            continue;
        }
        let left = desired.get(name).and_then(canonical_value);
        let right = observed.get(name).and_then(canonical_value);
        if left != right {
            changed.push(name.clone());
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_key_order_and_empty_values_do_not_matter() {
        let registry = SchemaRegistry::builtin();
        let schema = registry.lookup("ntp.Policy").unwrap();
        let a = map(json!({"Name": "ntp", "Enabled": true, "Description": "", "Tags": []}));
        let b = map(json!({"Enabled": true, "Name": "ntp"}));
        assert_eq!(ContentFingerprint::of(schema, &a), ContentFingerprint::of(schema, &b));
    }

    #[test]
    fn test_read_only_fields_are_ignored() {
        let registry = SchemaRegistry::builtin();
        let schema = registry.lookup("server.Profile").unwrap();
        let a = map(json!({"Name": "web", "Moid": "1", "ConfigChanges": {"Changes": ["x"]}}));
        let b = map(json!({"Name": "web", "DeployStatus": {"State": "Done"}}));
        assert_eq!(ContentFingerprint::of(schema, &a), ContentFingerprint::of(schema, &b));
    }

    #[test]
    fn test_value_change_is_detected() {
        let registry = SchemaRegistry::builtin();
        let schema = registry.lookup("ntp.Policy").unwrap();
        let a = map(json!({"Name": "ntp", "Enabled": true}));
        let b = map(json!({"Name": "ntp", "Enabled": false, "Timezone": "UTC"}));
        assert_ne!(ContentFingerprint::of(schema, &a), ContentFingerprint::of(schema, &b));
        assert_eq!(changed_fields(schema, &a, &b), vec!["Enabled", "Timezone"]);
    }
}
