use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.:-]{1,64}$").unwrap());

/// Fields maintained by the backend. They never take part in diffing, are
/// never exported and are stripped from payloads.
pub const SYSTEM_FIELDS: &[&str] = &[
    "Moid",
    "ClassId",
    "AccountMoid",
    "CreateTime",
    "ModTime",
    "SharedScope",
    "Owners",
    "DomainGroupMoid",
    "VersionContext",
    "Ancestors",
    "Parent",
    "PermissionResources",
    "DisplayNames",
    "DeviceRegistration",
    "RegisteredDevice",
    "ConfigChanges",
    "ConfigChangeContext",
    "ConfigChangeDetails",
    "ConfigContext",
    "ConfigResult",
    "RunningWorkflows",
    "ScheduledActions",
];

pub fn is_system_field(name: &str) -> bool {
    SYSTEM_FIELDS.contains(&name)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Unknown object type: {0}")]
    UnknownType(String),

    #[error("Object type '{0}' is registered twice")]
    DuplicateType(String),

    #[error("Declared type dependencies form a cycle between: {}", .0.join(", "))]
    TypeCycle(Vec<String>),

    #[error("Invalid {object_type} object: {reason}")]
    InvalidObject { object_type: String, reason: String },

    #[error("Validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// A single violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// How fields absent from a schema are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Undeclared fields are errors unless the schema is open.
    #[default]
    Strict,
    /// Only declared fields are checked.
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Organization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Read from files, planned and applied.
    Managed,
    /// Listed from the backend so references can bind to it, never planned.
    ReferenceOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Reference { target: String, many: bool },
}

#[derive(Debug, Clone)]
pub enum FieldRule {
    Pattern(Regex),
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    OneOf(Vec<String>),
    Range {
        min: Option<i64>,
        max: Option<i64>,
    },
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub read_only: bool,
    pub rules: Vec<FieldRule>,
}

impl FieldDef {
    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            read_only: false,
            rules: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Array)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Object)
    }

    /// A field naming a single object of `target` type.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                target: target.into(),
                many: false,
            },
        )
    }

    /// A field naming a list of objects of `target` type.
    pub fn references(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                target: target.into(),
                many: true,
            },
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.rules.push(FieldRule::Pattern(pattern));
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.rules.push(FieldRule::Length { min, max });
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.rules
            .push(FieldRule::OneOf(values.iter().map(|v| v.to_string()).collect()));
        self
    }

    pub fn range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.rules.push(FieldRule::Range { min, max });
        self
    }

    pub fn reference_target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Reference { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// Metadata of one object type.
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    pub object_type: String,
    pub display_name: String,
    /// Folder below the files directory, e.g. `policies/bios`.
    pub folder: Option<String>,
    /// Short alias accepted in place of the full type name, e.g. `bios`.
    pub short_key: Option<String>,
    pub scope: Scope,
    pub role: Role,
    /// Undeclared fields are accepted even under strict validation.
    pub open: bool,
    pub fields: Vec<FieldDef>,
    pub extra_dependencies: Vec<String>,
}

impl ObjectSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Field definitions with their constraints, in declaration order.
    pub fn validators(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.reference_target().is_some())
    }

    /// Types whose objects must exist before objects of this type.
    ///
    /// Derived from reference targets plus explicitly declared extras;
    /// references to the type itself are not type-level dependencies.
    pub fn dependency_types(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        let targets = self
            .reference_fields()
            .filter_map(FieldDef::reference_target)
            .chain(self.extra_dependencies.iter().map(String::as_str));
        for target in targets {
            if target != self.object_type && !deps.contains(&target) {
                deps.push(target);
            }
        }
        deps
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        is_system_field(name) || self.field(name).is_some_and(|f| f.read_only)
    }

    pub fn is_managed(&self) -> bool {
        self.role == Role::Managed
    }

    pub fn is_global(&self) -> bool {
        self.scope == Scope::Global
    }
}

/// Static lookup of object-type metadata.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Vec<ObjectSchema>,
    by_type: HashMap<String, usize>,
    aliases: HashMap<String, usize>,
    level: ValidationLevel,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in object type catalog.
    pub fn builtin() -> Self {
        super::catalog::builtin()
    }

    pub fn with_level(mut self, level: ValidationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn level(&self) -> ValidationLevel {
        self.level
    }

    pub fn register(&mut self, schema: ObjectSchema) -> Result<()> {
        if self.by_type.contains_key(&schema.object_type) {
            return Err(SchemaError::DuplicateType(schema.object_type));
        }
        let index = self.schemas.len();
        self.by_type.insert(schema.object_type.clone(), index);
        for alias in schema.folder.iter().chain(schema.short_key.iter()) {
            self.aliases.entry(alias.to_lowercase()).or_insert(index);
        }
        self.schemas.push(schema);
        Ok(())
    }

    /// Looks up a type by its canonical name.
    pub fn lookup(&self, object_type: &str) -> Result<&ObjectSchema> {
        self.by_type
            .get(object_type)
            .map(|&i| &self.schemas[i])
            .ok_or_else(|| SchemaError::UnknownType(object_type.to_string()))
    }

    /// Expands a canonical name, folder path or short key to the canonical
    /// type name.
    pub fn resolve_type_name(&self, raw: &str) -> Option<&str> {
        let raw = raw.trim();
        if let Some(&i) = self.by_type.get(raw) {
            return Some(&self.schemas[i].object_type);
        }
        let key = raw.trim_matches('/').to_lowercase();
        self.aliases
            .get(&key)
            .map(|&i| self.schemas[i].object_type.as_str())
    }

    pub fn schemas(&self) -> impl Iterator<Item = &ObjectSchema> {
        self.schemas.iter()
    }

    pub fn managed(&self) -> impl Iterator<Item = &ObjectSchema> {
        self.schemas.iter().filter(|s| s.is_managed())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Orders all registered types so every type follows the types it
    /// depends on. Registration order breaks ties.
    pub fn type_order(&self) -> Result<Vec<&str>> {
        let n = self.schemas.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, schema) in self.schemas.iter().enumerate() {
            for dep in schema.dependency_types() {
                // Dependencies on unregistered types impose no order.
                if let Some(&d) = self.by_type.get(dep) {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop_front() {
            order.push(self.schemas[i].object_type.as_str());
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() < n {
            let blocked = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.schemas[i].object_type.clone())
                .collect();
            return Err(SchemaError::TypeCycle(blocked));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(object_type: &str, fields: Vec<FieldDef>) -> ObjectSchema {
        ObjectSchema {
            object_type: object_type.to_string(),
            display_name: object_type.to_string(),
            folder: None,
            short_key: None,
            scope: Scope::Organization,
            role: Role::Managed,
            open: false,
            fields,
            extra_dependencies: Vec::new(),
        }
    }

    #[test]
    fn test_lookup_unknown_type_fails() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            registry.lookup("bios.Policy").unwrap_err(),
            SchemaError::UnknownType("bios.Policy".to_string())
        );
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = SchemaRegistry::new();
        registry.register(schema("a.A", vec![])).unwrap();
        assert!(matches!(
            registry.register(schema("a.A", vec![])),
            Err(SchemaError::DuplicateType(_))
        ));
    }

    #[test]
    fn test_dependency_types_skip_self_and_duplicates() {
        let s = schema(
            "a.A",
            vec![
                FieldDef::reference("Parent", "a.A"),
                FieldDef::reference("First", "b.B"),
                FieldDef::references("Many", "b.B"),
                FieldDef::reference("Other", "c.C"),
            ],
        );
        assert_eq!(s.dependency_types(), vec!["b.B", "c.C"]);
    }

    #[test]
    fn test_type_order_follows_dependencies() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(schema("p.Profile", vec![FieldDef::reference("Policy", "x.Policy")]))
            .unwrap();
        registry.register(schema("x.Policy", vec![])).unwrap();
        assert_eq!(registry.type_order().unwrap(), vec!["x.Policy", "p.Profile"]);
    }

    #[test]
    fn test_type_order_reports_cycle() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(schema("a.A", vec![FieldDef::reference("B", "b.B")]))
            .unwrap();
        registry
            .register(schema("b.B", vec![FieldDef::reference("A", "a.A")]))
            .unwrap();
        let err = registry.type_order().unwrap_err();
        assert_eq!(
            err,
            SchemaError::TypeCycle(vec!["a.A".to_string(), "b.B".to_string()])
        );
    }

    #[test]
    fn test_resolve_type_name_accepts_aliases() {
        let mut registry = SchemaRegistry::new();
        let mut bios = schema("bios.Policy", vec![]);
        bios.folder = Some("policies/bios".to_string());
        bios.short_key = Some("bios".to_string());
        registry.register(bios).unwrap();

        assert_eq!(registry.resolve_type_name("bios.Policy"), Some("bios.Policy"));
        assert_eq!(registry.resolve_type_name("policies/bios"), Some("bios.Policy"));
        assert_eq!(registry.resolve_type_name("BIOS"), Some("bios.Policy"));
        assert_eq!(registry.resolve_type_name("policies/boot"), None);
    }

    #[test]
    fn test_name_pattern() {
        assert!(NAME_PATTERN.is_match("web-01_a.b:c"));
        assert!(!NAME_PATTERN.is_match(""));
        assert!(!NAME_PATTERN.is_match("has space"));
        assert!(!NAME_PATTERN.is_match(&"x".repeat(65)));
    }
}
