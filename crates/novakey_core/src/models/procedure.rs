//! Stored procedure identities.

use crate::error::{GatewayError, GatewayResult};

use std::fmt;

/// A schema-qualified database function taking one `jsonb` argument.
///
/// The name is checked once at construction so it can be spliced into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Procedure {
    name: String,
    statement: String,
}

impl Procedure {
    /// Validate `name` (e.g. `users.set_user`) and render its call statement.
    pub fn new(name: impl Into<String>) -> GatewayResult<Self> {
        let name = name.into();
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
            return Err(GatewayError::InvalidProcedure { name });
        }
        let statement = format!("select {name}($1::jsonb)");
        Ok(Self { name, statement })
    }

    /// Qualified function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Single-parameter SQL statement calling the function.
    pub fn statement(&self) -> &str {
        &self.statement
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    part.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_rendering() {
        let proc = Procedure::new("users.set_user").unwrap();
        assert_eq!(proc.statement(), "select users.set_user($1::jsonb)");
        assert_eq!(proc.to_string(), "users.set_user");

        let unqualified = Procedure::new("ping").unwrap();
        assert_eq!(unqualified.statement(), "select ping($1::jsonb)");
    }

    #[test]
    fn test_rejects_non_identifiers() {
        for bad in ["", "users.", ".x", "a.b.c", "users.set_user(1); drop table x", "9lives", "a-b"] {
            let err = Procedure::new(bad).unwrap_err();
            assert!(matches!(err, GatewayError::InvalidProcedure { .. }), "{bad:?} accepted");
        }
    }
}
