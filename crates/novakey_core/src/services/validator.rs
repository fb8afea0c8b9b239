//! Schema-driven request validation.
//!
//! A single generic validator serves every request type: the request is
//! viewed through its serialized JSON form and each [`FieldRule`] of its
//! [`Schema`] is evaluated against that document.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{Constraint, FieldRule, Schema, Validate, ValidationError};

use serde::Serialize;
use serde_json::Value;

/// Validate a typed request against its declared schema.
///
/// Returns every violation (one per failing field) rather than stopping at
/// the first.
pub fn validate<T>(request: &T) -> GatewayResult<()>
where
    T: Serialize + Validate,
{
    let schema = T::schema();
    if schema.is_empty() {
        return Ok(());
    }

    let document = serde_json::to_value(request)
        .map_err(|e| GatewayError::serialize(format!("cannot inspect request: {e}")))?;

    let errors = check_document(&schema, &document);
    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(violations = errors.len(), "Request failed validation");
        Err(GatewayError::validation(errors))
    }
}

/// Evaluate a schema against an arbitrary JSON document.
pub fn check_document(schema: &Schema, document: &Value) -> Vec<ValidationError> {
    schema.rules().iter().filter_map(|rule| check_rule(rule, document)).collect()
}

fn check_rule(rule: &FieldRule, document: &Value) -> Option<ValidationError> {
    let value = lookup(document, rule.field);
    let absent = value.map_or(true, Value::is_null);

    for constraint in &rule.constraints {
        let ok = match constraint {
            Constraint::Required => value.is_some_and(|v| !is_zero(v)),
            // Optional fields that were left out are not checked further
            _ if absent => true,
            Constraint::Email => value.and_then(Value::as_str).is_some_and(is_email),
            Constraint::Uuid => {
                value.and_then(Value::as_str).is_some_and(|s| uuid::Uuid::parse_str(s).is_ok())
            }
            Constraint::Min(min) => value.and_then(measure).is_some_and(|m| m >= *min as f64),
            Constraint::Max(max) => value.and_then(measure).is_some_and(|m| m <= *max as f64),
        };
        if !ok {
            return Some(ValidationError::new(
                rule.field,
                value.cloned().unwrap_or(Value::Null),
                constraint.tag(),
            ));
        }
    }
    None
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |current, key| current.get(key))
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn measure(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        _ => None,
    }
}

fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
