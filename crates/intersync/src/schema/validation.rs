//! Field-level validation of objects against their schema.
//!
//! Validation is pure: it reads the schema and the object and reports every
//! violated constraint, it never stops at the first one.

use serde_json::{Map, Value};

use super::registry::{
    is_system_field, FieldDef, FieldKind, FieldRule, ObjectSchema, Result, SchemaError,
    SchemaRegistry, ValidationIssue, ValidationLevel,
};
use crate::model::ManagedObject;

impl SchemaRegistry {
    /// Validates an object against the schema of its type.
    pub fn validate(&self, object: &ManagedObject) -> Result<()> {
        let schema = self.lookup(&object.identity().object_type)?;
        let issues = validate_fields(schema, object.fields(), self.level());
        if issues.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Validation(issues))
        }
    }
}

pub fn validate_fields(
    schema: &ObjectSchema,
    fields: &Map<String, Value>,
    level: ValidationLevel,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for name in schema.required_fields() {
        match fields.get(name) {
            None | Some(Value::Null) => issues.push(ValidationIssue::new(name, "is required")),
            Some(Value::String(s)) if s.is_empty() => {
                issues.push(ValidationIssue::new(name, "must not be empty"))
            }
            _ => {}
        }
    }

    for (name, value) in fields {
        if name == "ObjectType" || is_system_field(name) || value.is_null() {
            continue;
        }
        match schema.field(name) {
            Some(def) => check_field(def, value, &mut issues),
            None if level == ValidationLevel::Strict && !schema.open => {
                issues.push(ValidationIssue::new(
                    name.as_str(),
                    format!("is not a known field of {}", schema.object_type),
                ));
            }
            None => {}
        }
    }

    issues
}

fn check_field(def: &FieldDef, value: &Value, issues: &mut Vec<ValidationIssue>) {
    if let Some(expected) = kind_mismatch(&def.kind, value) {
        issues.push(ValidationIssue::new(
            def.name.as_str(),
            format!("expected {}", expected),
        ));
        return;
    }

    for rule in &def.rules {
        if let Some(message) = check_rule(rule, value) {
            issues.push(ValidationIssue::new(def.name.as_str(), message));
        }
    }
}

/// Returns a description of the expected kind when `value` does not fit.
fn kind_mismatch(kind: &FieldKind, value: &Value) -> Option<&'static str> {
    let ok = match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Integer => value.is_i64() || value.is_u64(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Array => value.is_array(),
        FieldKind::Object => value.is_object(),
        FieldKind::Reference { many: false, .. } => is_reference_value(value),
        FieldKind::Reference { many: true, .. } => value
            .as_array()
            .is_some_and(|items| items.iter().all(is_reference_value)),
    };
    if ok {
        return None;
    }
    Some(match kind {
        FieldKind::String => "a string",
        FieldKind::Integer => "an integer",
        FieldKind::Number => "a number",
        FieldKind::Boolean => "a boolean",
        FieldKind::Array => "a list",
        FieldKind::Object => "a mapping",
        FieldKind::Reference { many: false, .. } => "a name or a mapping with a Name",
        FieldKind::Reference { many: true, .. } => "a list of names",
    })
}

fn is_reference_value(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.is_empty(),
        Value::Object(map) => map.get("Name").and_then(Value::as_str).is_some(),
        _ => false,
    }
}

fn check_rule(rule: &FieldRule, value: &Value) -> Option<String> {
    match rule {
        FieldRule::Pattern(re) => value
            .as_str()
            .filter(|s| !re.is_match(s))
            .map(|s| format!("'{}' does not match pattern {}", s, re.as_str())),
        FieldRule::Length { min, max } => {
            let len = match value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                _ => return None,
            };
            if min.is_some_and(|m| len < m) || max.is_some_and(|m| len > m) {
                Some(format!(
                    "length {} is outside {}..={}",
                    len,
                    min.map_or("0".to_string(), |m| m.to_string()),
                    max.map_or("∞".to_string(), |m| m.to_string())
                ))
            } else {
                None
            }
        }
        FieldRule::OneOf(allowed) => value
            .as_str()
            .filter(|s| !allowed.iter().any(|a| a == s))
            .map(|s| format!("'{}' is not one of [{}]", s, allowed.join(", "))),
        FieldRule::Range { min, max } => {
            let n = value.as_f64()?;
            if min.is_some_and(|m| n < m as f64) || max.is_some_and(|m| n > m as f64) {
                Some(format!(
                    "{} is outside {}..={}",
                    value,
                    min.map_or("-∞".to_string(), |m| m.to_string()),
                    max.map_or("∞".to_string(), |m| m.to_string())
                ))
            } else {
                None
            }
        }
    }
}
