//! HTTP server settings read from the environment.

use anyhow::{Context, Result};
use std::net::SocketAddr;

/// Default bind address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:5000";

/// Origins allowed when `CORS_ALLOWED_ORIGINS` is unset.
pub const DEFAULT_ALLOWED_ORIGINS: &str = "https://novakey.core-regulus.com, http://localhost:9001";

/// Listener and CORS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Read `NOVAKEY_LISTEN` and `CORS_ALLOWED_ORIGINS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen = lookup("NOVAKEY_LISTEN")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen: SocketAddr = listen
            .trim()
            .parse()
            .with_context(|| format!("invalid NOVAKEY_LISTEN address: {listen}"))?;

        let origins = lookup("CORS_ALLOWED_ORIGINS")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string());

        Ok(Self { listen, allowed_origins: split_origins(&origins) })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 5000)),
            allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|o| !o.is_empty()).map(String::from).collect()
}
