//! Builders for object definitions and test registries.

#![allow(dead_code)]

use serde_json::{json, Map, Value};

use intersync::schema::{FieldDef, ObjectSchema, Role, Scope, NAME_PATTERN};
use intersync::{Fields, SchemaRegistry};

/// Object type whose instances may reference each other, for cycle tests.
pub const NODE_TYPE: &str = "test.Node";

/// Builder for one object definition as it appears in a file.
pub struct ObjectBuilder {
    fields: Map<String, Value>,
}

impl ObjectBuilder {
    pub fn new(object_type: &str, name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("ObjectType".to_string(), json!(object_type));
        fields.insert("Name".to_string(), json!(name));
        Self { fields }
    }

    pub fn organization(name: &str) -> Self {
        Self::new("organization.Organization", name)
    }

    pub fn ntp(name: &str) -> Self {
        Self::new("ntp.Policy", name)
    }

    pub fn org(mut self, organization: &str) -> Self {
        self.fields
            .insert("Organization".to_string(), json!(organization));
        self
    }

    pub fn field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn yaml(self) -> String {
        serde_yaml::to_string(&self.build()).expect("Failed to serialize test object")
    }
}

/// Converts a JSON object literal into a field map.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Registry with a single global type whose `Next` field references the
/// same type.
pub fn node_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(ObjectSchema {
            object_type: NODE_TYPE.to_string(),
            display_name: "Node".to_string(),
            folder: Some("nodes".to_string()),
            short_key: Some("node".to_string()),
            scope: Scope::Global,
            role: Role::Managed,
            open: false,
            fields: vec![
                FieldDef::string("Name")
                    .required()
                    .pattern(NAME_PATTERN.clone()),
                FieldDef::reference("Next", NODE_TYPE),
            ],
            extra_dependencies: Vec::new(),
        })
        .expect("Failed to register test type");
    registry
}

pub fn node(name: &str, next: Option<&str>) -> String {
    let mut builder = ObjectBuilder::new(NODE_TYPE, name);
    if let Some(next) = next {
        builder = builder.field("Next", json!(next));
    }
    builder.yaml()
}
