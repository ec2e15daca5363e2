//! JSON Schema validation for caller-supplied reference data.
//!
//! Known classes and existing students arrive as JSON (CLI files, multipart
//! fields). They are checked against embedded Draft 7 schemas before being
//! deserialized, so a malformed list is reported as a whole instead of
//! silently weakening the referential and duplicate rules.
//!
//! Schemas are embedded at compile time from `schemas/`:
//! - `known-classes.json`
//! - `existing-students.json`

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::error::{ReferenceError, ReferenceResult};
use crate::models::{ClassRef, ExistingStudent};

static KNOWN_CLASSES_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/known-classes.json"))
        .expect("Invalid embedded schema")
});

static EXISTING_STUDENTS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/existing-students.json"))
        .expect("Invalid embedded schema")
});

/// Kinds of reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    KnownClasses,
    ExistingStudents,
}

impl ReferenceKind {
    fn schema(&self) -> &'static Value {
        match self {
            ReferenceKind::KnownClasses => &KNOWN_CLASSES_SCHEMA,
            ReferenceKind::ExistingStudents => &EXISTING_STUDENTS_SCHEMA,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReferenceKind::KnownClasses => "known classes",
            ReferenceKind::ExistingStudents => "existing students",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every error otherwise
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use rollbook::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["grade"],
///     "properties": { "grade": { "type": "string" } }
/// });
///
/// assert!(validate(&schema, &json!({ "grade": "5" })).is_ok());
/// assert!(validate(&schema, &json!({ "section": "A" })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Same as [`validate`], as a boolean.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Check reference JSON against the embedded schema for its kind.
pub fn validate_reference_json(kind: ReferenceKind, data: &Value) -> ReferenceResult<()> {
    validate(kind.schema(), data).map_err(|errors| ReferenceError::Schema {
        kind: kind.label(),
        errors,
    })
}

fn load<T: DeserializeOwned>(kind: ReferenceKind, data: Value) -> ReferenceResult<Vec<T>> {
    validate_reference_json(kind, &data)?;
    Ok(serde_json::from_value(data)?)
}

/// Check and deserialize a known-classes list.
pub fn load_known_classes(data: Value) -> ReferenceResult<Vec<ClassRef>> {
    load(ReferenceKind::KnownClasses, data)
}

/// Check and deserialize an existing-students list.
pub fn load_existing_students(data: Value) -> ReferenceResult<Vec<ExistingStudent>> {
    load(ReferenceKind::ExistingStudents, data)
}

/// Read a JSON reference file and return it once it passes its schema.
pub fn load_reference_file(path: &Path, kind: ReferenceKind) -> ReferenceResult<Value> {
    let content = std::fs::read_to_string(path)?;
    let data: Value = serde_json::from_str(&content)?;
    validate_reference_json(kind, &data)?;
    Ok(data)
}
