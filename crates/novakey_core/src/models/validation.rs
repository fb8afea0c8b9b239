//! Declarative request constraints and the violations they produce.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single constraint that can be attached to a request field.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Present and not a zero value (`null`, `""`, `0`, `false`, `[]`, `{}`).
    Required,
    /// A syntactically valid e-mail address.
    Email,
    /// A hyphenated or simple-form UUID.
    Uuid,
    /// Lower bound: character count for strings, length for arrays, value for numbers.
    Min(i64),
    /// Upper bound: character count for strings, length for arrays, value for numbers.
    Max(i64),
}

impl Constraint {
    /// Tag reported in violations.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Email => "email",
            Self::Uuid => "uuid",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
        }
    }
}

/// Constraints declared for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    /// JSON field name; dots address nested objects (`owner.email`)
    pub field: &'static str,
    /// Checked in order; the first failure is reported
    pub constraints: Vec<Constraint>,
}

/// The full set of field rules for a request shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    rules: Vec<FieldRule>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare constraints for a field.
    pub fn field(
        mut self,
        field: &'static str,
        constraints: impl IntoIterator<Item = Constraint>,
    ) -> Self {
        self.rules.push(FieldRule { field, constraints: constraints.into_iter().collect() });
        self
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Whether no rules were declared.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Implemented by every request type the gateway accepts.
///
/// The default schema has no rules.
pub trait Validate {
    /// Constraints to check before the request reaches the database.
    fn schema() -> Schema {
        Schema::new()
    }
}

/// One violated constraint.
///
/// Serialized as `{"failedField", "value", "error": true, "tag"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Offending field
    #[serde(rename = "failedField")]
    pub field: String,
    /// Value that was rejected (`null` when absent)
    #[serde(rename = "value")]
    pub rejected_value: Value,
    /// Always `true`; kept for clients that branch on it
    pub error: bool,
    /// Violated constraint tag
    pub tag: String,
}

impl ValidationError {
    /// Create a violation record.
    pub fn new(field: impl Into<String>, rejected_value: Value, tag: impl Into<String>) -> Self {
        Self { field: field.into(), rejected_value, error: true, tag: tag.into() }
    }
}
