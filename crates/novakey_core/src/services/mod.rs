//! Services of the NovaKey data-access core.
//!
//! - `ssh_tunnel` - SSH bastion tunnel with per-connection forwarding tasks
//! - `connection` - PostgreSQL connection pooling with deadpool-postgres
//! - `validator` - Schema-driven request validation
//! - `gateway` - The generic parse/validate/call/decode pipeline
//! - `settings` - Database-published settings document

pub mod connection;
pub mod gateway;
pub mod settings;
pub mod ssh_tunnel;
pub mod validator;

pub use connection::ConnectionPool;
pub use gateway::{Gateway, PgRpcEndpoint, RpcEndpoint};
pub use settings::RemoteSettings;
pub use ssh_tunnel::{
    BoxedStream, ChannelDialer, SshDialer, SshTunnelService, TunnelHandle, TunnelStats,
    TunnelStream, SSH_CONNECT_TIMEOUT,
};
pub use validator::validate;
