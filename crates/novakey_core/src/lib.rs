//! Core types and services for the NovaKey gateway.
//!
//! This crate is the data-access layer behind the HTTP surface:
//!
//! - **error**: Error handling with PostgreSQL-specific details
//! - **models**: Endpoint configuration, pool settings, procedures, validation schemas
//! - **services**: SSH tunnel, connection pool, request pipeline, remote settings
//! - **state**: Process-wide lazily-initialized tunnel and pool
//! - **logging**: Structured logging setup

pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

pub use error::{ErrorClass, GatewayError, GatewayResult};
pub use models::{
    AccessMode, Constraint, DatabaseConfig, EndpointConfig, FieldRule, PoolSettings, PoolStatus,
    Procedure, Schema, SshConfig, Validate, ValidationError,
};
pub use services::{
    ConnectionPool, Gateway, PgRpcEndpoint, RemoteSettings, RpcEndpoint, SshTunnelService,
    TunnelHandle, TunnelStats,
};
pub use state::GatewayContext;
