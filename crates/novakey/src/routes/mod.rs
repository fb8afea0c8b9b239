//! Request and response envelopes for each entity.
//!
//! Every mutating request is signed by the caller's key: `publicKey`,
//! `signature`, `message` and `timestamp` travel with the payload and are
//! checked by the database procedure.

pub mod projects;
pub mod users;
pub mod workspaces;

use novakey_core::{Constraint, Schema};

/// Constraints shared by every signed request.
pub(crate) fn signed(schema: Schema) -> Schema {
    schema
        .field("publicKey", [Constraint::Required])
        .field("signature", [Constraint::Required])
        .field("message", [Constraint::Required])
        .field("timestamp", [Constraint::Required, Constraint::Min(1)])
}

/// Absent or empty strings are left out of the document sent to the database.
pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

/// Absent or zero numbers are left out of the document.
pub(crate) fn is_unset(value: &Option<i64>) -> bool {
    value.map_or(true, |v| v == 0)
}
