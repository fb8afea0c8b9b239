//! Data models for the NovaKey data-access core.
//!
//! - `endpoint` - EndpointConfig, AccessMode, SshConfig, DatabaseConfig
//! - `pool` - PoolSettings, PoolStatus
//! - `procedure` - Procedure
//! - `validation` - Schema, Constraint, Validate, ValidationError

pub mod endpoint;
pub mod pool;
pub mod procedure;
pub mod validation;

pub use endpoint::{AccessMode, DatabaseConfig, EndpointConfig, SshConfig};
pub use pool::{PoolSettings, PoolStatus};
pub use procedure::Procedure;
pub use validation::{Constraint, FieldRule, Schema, Validate, ValidationError};
