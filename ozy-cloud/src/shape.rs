//! Structural validation of fetched documents.
//!
//! Runs before any password is known, so it never touches cryptography. The
//! envelope is described by a rule table and every violated rule is
//! reported, not just the first.

use crate::document::DocumentAppState;
use serde_json::{Map, Value};
use thiserror::Error;

/// What a field must look like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Array of exactly two strings.
    StringPair,
    /// Object with a positive 32-bit integer `iterations`.
    KdfParams,
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::StringPair => "array of 2 strings",
            FieldKind::KdfParams => "object with positive integer iterations",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::StringPair => value
                .as_array()
                .is_some_and(|items| items.len() == 2 && items.iter().all(Value::is_string)),
            FieldKind::KdfParams => value
                .get("iterations")
                .and_then(Value::as_u64)
                .is_some_and(|n| n > 0 && u32::try_from(n).is_ok()),
        }
    }
}

struct FieldRule {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

const ENVELOPE_RULES: &[FieldRule] = &[
    FieldRule {
        name: "salt",
        kind: FieldKind::StringPair,
        required: true,
    },
    FieldRule {
        name: "revision",
        kind: FieldKind::String,
        required: true,
    },
    FieldRule {
        name: "encrypted",
        kind: FieldKind::String,
        required: true,
    },
    FieldRule {
        name: "kdf",
        kind: FieldKind::KdfParams,
        required: false,
    },
];

impl FieldRule {
    fn check(&self, doc: &Map<String, Value>) -> Option<FieldViolation> {
        let found = match doc.get(self.name) {
            None if self.required => "missing".to_string(),
            None => return None,
            Some(value) if self.kind.accepts(value) => return None,
            Some(value) => describe_value(value),
        };
        Some(FieldViolation {
            field: self.name.to_string(),
            expected: self.kind.expected(),
            found,
        })
    }
}

/// One field that does not match the envelope shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub expected: &'static str,
    pub found: String,
}

/// A fetched document is not a well-formed envelope.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}", describe(.violations))]
pub struct ShapeError {
    pub violations: Vec<FieldViolation>,
}

impl ShapeError {
    fn whole_document(expected: &'static str, found: String) -> Self {
        Self {
            violations: vec![FieldViolation {
                field: "document".to_string(),
                expected,
                found,
            }],
        }
    }

    /// Names of the violated fields, in rule order.
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

fn describe(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("'{}' expected {}, found {}", v.field, v.expected, v.found))
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Object(_) => "object".to_string(),
    }
}

/// Checks that `raw` is a well-formed envelope and parses it.
pub fn validate_shape(raw: &str) -> Result<DocumentAppState, ShapeError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ShapeError::whole_document("JSON object", format!("invalid JSON ({e})")))?;

    let Value::Object(doc) = &value else {
        return Err(ShapeError::whole_document("JSON object", describe_value(&value)));
    };

    let violations: Vec<FieldViolation> = ENVELOPE_RULES
        .iter()
        .filter_map(|rule| rule.check(doc))
        .collect();
    if !violations.is_empty() {
        return Err(ShapeError { violations });
    }

    serde_json::from_value(value)
        .map_err(|e| ShapeError::whole_document("envelope", e.to_string()))
}
