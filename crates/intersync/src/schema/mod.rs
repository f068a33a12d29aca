//! Object type metadata: required fields, field constraints and declared
//! type dependencies.

pub mod catalog;
pub mod registry;
pub mod validation;

pub use catalog::ORGANIZATION_TYPE;
pub use registry::{
    is_system_field, FieldDef, FieldKind, FieldRule, ObjectSchema, Role, SchemaError,
    SchemaRegistry, Scope, ValidationIssue, ValidationLevel, NAME_PATTERN, SYSTEM_FIELDS,
};
pub use validation::validate_fields;
