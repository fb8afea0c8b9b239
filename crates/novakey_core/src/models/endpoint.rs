//! Endpoint configuration: where the database lives and how to reach it.

use crate::error::{GatewayError, GatewayResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Value of `ENVIRONMENT` that selects tunneled access.
pub const LOCAL_ENVIRONMENT: &str = "local";

/// How the process reaches the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// The database address is routable from this host.
    Direct,
    /// The database is reached through an SSH bastion.
    #[default]
    Tunneled,
}

impl AccessMode {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Tunneled => "tunneled",
        }
    }

    /// Derive the mode from a deployment environment name.
    ///
    /// Only the `local` environment sits outside the database network.
    pub fn for_environment(environment: &str) -> Self {
        if environment == LOCAL_ENVIRONMENT {
            Self::Tunneled
        } else {
            Self::Direct
        }
    }
}

/// SSH bastion parameters.
#[derive(Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Bastion hostname
    pub host: String,
    /// Bastion port
    pub port: u16,
    /// Login user
    pub user: String,
    /// OpenSSH or PEM private key material (not a path)
    pub private_key: String,
}

impl SshConfig {
    /// Create SSH parameters with the default port.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self { host: host.into(), port: 22, user: user.into(), private_key: private_key.into() }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` of the bastion.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// PostgreSQL parameters.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Server hostname or IP (also the tunnel's local bind address)
    pub host: String,
    /// Server port (also the tunnel's local bind port)
    pub port: u16,
    /// Login user
    pub user: String,
    /// Login password
    pub password: String,
    /// Database name
    pub name: String,
}

impl DatabaseConfig {
    /// Create database parameters with the default port.
    pub fn new(
        host: impl Into<String>,
        name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 5432,
            user: user.into(),
            password: password.into(),
            name: name.into(),
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` of the database.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection string for display (without password).
    pub fn display_url(&self) -> String {
        format!("postgresql://{}@{}:{}/{}", self.user, self.host, self.port, self.name)
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

/// Everything the core needs to reach the database.
///
/// Immutable once built; shared read-only by the tunnel and pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Deployment environment name (`local`, `production`, ...)
    pub environment: String,
    /// Direct or tunneled access
    pub mode: AccessMode,
    /// Bastion parameters (required when tunneled)
    pub ssh: Option<SshConfig>,
    /// Database parameters
    pub database: DatabaseConfig,
}

impl EndpointConfig {
    /// Configuration for a directly reachable database.
    pub fn direct(database: DatabaseConfig) -> Self {
        Self { environment: "production".to_string(), mode: AccessMode::Direct, ssh: None, database }
    }

    /// Configuration for a database behind an SSH bastion.
    pub fn tunneled(ssh: SshConfig, database: DatabaseConfig) -> Self {
        Self {
            environment: LOCAL_ENVIRONMENT.to_string(),
            mode: AccessMode::Tunneled,
            ssh: Some(ssh),
            database,
        }
    }

    /// Load from the process environment.
    ///
    /// `ENVIRONMENT` defaults to `local`. In the local environment a `.env`
    /// file in the working directory is loaded first and SSH variables are
    /// required.
    pub fn from_env() -> GatewayResult<Self> {
        let environment = environment_name(std::env::var("ENVIRONMENT").ok());
        if environment == LOCAL_ENVIRONMENT {
            match dotenvy::dotenv() {
                Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
                Err(e) => tracing::debug!(error = %e, "No .env file loaded"),
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a dotenv-style file, falling back to the process environment
    /// for keys the file does not define.
    pub fn from_env_file(path: &Path) -> GatewayResult<Self> {
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            GatewayError::config(format!("Cannot read {}: {e}", path.display()))
        })?;
        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                GatewayError::config(format!("Malformed line in {}: {e}", path.display()))
            })?;
            values.insert(key, value);
        }
        Self::from_lookup(|key| values.get(key).cloned().or_else(|| std::env::var(key).ok()))
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = environment_name(lookup("ENVIRONMENT"));
        let mode = AccessMode::for_environment(&environment);

        let ssh = if mode == AccessMode::Tunneled {
            Some(SshConfig {
                // Keys pasted into a single env line carry escaped newlines
                private_key: required(&lookup, "SSH_PRIVATE_KEY")?.replace("\\n", "\n"),
                host: required(&lookup, "SSH_HOST")?,
                port: required_port(&lookup, "SSH_PORT")?,
                user: required(&lookup, "SSH_USER")?,
            })
        } else {
            None
        };

        let database = DatabaseConfig {
            port: required_port(&lookup, "DB_PORT")?,
            user: required(&lookup, "DB_USER")?,
            password: required(&lookup, "DB_PASSWORD")?,
            name: required(&lookup, "DB_NAME")?,
            host: required(&lookup, "DB_HOST")?,
        };

        let config = Self { environment, mode, ssh, database };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.database.host.is_empty() {
            return Err(GatewayError::config("Database host is required"));
        }
        if self.database.name.is_empty() {
            return Err(GatewayError::config("Database name is required"));
        }
        if self.mode == AccessMode::Tunneled && self.ssh.is_none() {
            return Err(GatewayError::config("SSH settings are required in tunneled mode"));
        }
        Ok(())
    }

    /// Whether access goes through the SSH bastion.
    pub fn is_tunneled(&self) -> bool {
        self.mode == AccessMode::Tunneled
    }

    /// SSH parameters, or a config error if absent.
    pub fn ssh_config(&self) -> GatewayResult<&SshConfig> {
        self.ssh
            .as_ref()
            .ok_or_else(|| GatewayError::config("SSH settings are required in tunneled mode"))
    }
}

fn environment_name(value: Option<String>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or_else(|| LOCAL_ENVIRONMENT.to_string())
}

fn required<F>(lookup: &F, key: &str) -> GatewayResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::config(format!("missing env var: {key}")))
}

fn required_port<F>(lookup: &F, key: &str) -> GatewayResult<u16>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = required(lookup, key)?;
    raw.trim()
        .parse()
        .map_err(|_| GatewayError::config(format!("invalid port in {key}: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn database_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DB_HOST", "127.0.0.1"),
            ("DB_PORT", "6432"),
            ("DB_USER", "novakey"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "novakey"),
        ]
    }

    #[test]
    fn test_production_environment_is_direct() {
        let mut pairs = database_vars();
        pairs.push(("ENVIRONMENT", "production"));
        let map = vars(&pairs);

        let config = EndpointConfig::from_lookup(|k| map.get(k).cloned()).unwrap();
        assert_eq!(config.mode, AccessMode::Direct);
        assert!(config.ssh.is_none());
        assert_eq!(config.database.port, 6432);
        assert_eq!(config.database.address(), "127.0.0.1:6432");
    }

    #[test]
    fn test_local_environment_requires_ssh() {
        let map = vars(&database_vars());

        let err = EndpointConfig::from_lookup(|k| map.get(k).cloned()).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("SSH_PRIVATE_KEY"));
    }

    #[test]
    fn test_private_key_newlines_are_expanded() {
        let mut pairs = database_vars();
        pairs.extend([
            ("SSH_PRIVATE_KEY", "-----BEGIN KEY-----\\nabc\\n-----END KEY-----"),
            ("SSH_HOST", "bastion.example.com"),
            ("SSH_PORT", "2222"),
            ("SSH_USER", "deploy"),
        ]);
        let map = vars(&pairs);

        let config = EndpointConfig::from_lookup(|k| map.get(k).cloned()).unwrap();
        assert!(config.is_tunneled());
        let ssh = config.ssh_config().unwrap();
        assert_eq!(ssh.private_key, "-----BEGIN KEY-----\nabc\n-----END KEY-----");
        assert_eq!(ssh.address(), "bastion.example.com:2222");
    }

    #[test]
    fn test_invalid_port_is_reported() {
        let mut pairs = database_vars();
        pairs.retain(|(k, _)| *k != "DB_PORT");
        pairs.extend([("ENVIRONMENT", "production"), ("DB_PORT", "five")]);
        let map = vars(&pairs);

        let err = EndpointConfig::from_lookup(|k| map.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let config = EndpointConfig::tunneled(
            SshConfig::new("bastion", "deploy", "PRIVATE-MATERIAL"),
            DatabaseConfig::new("localhost", "novakey", "novakey", "hunter2"),
        );
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("PRIVATE-MATERIAL"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_from_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "ENVIRONMENT=staging").unwrap();
        for (k, v) in database_vars() {
            writeln!(file, "{k}={v}").unwrap();
        }
        drop(file);

        let config = EndpointConfig::from_env_file(&path).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.mode, AccessMode::Direct);
        assert_eq!(config.database.display_url(), "postgresql://novakey@127.0.0.1:6432/novakey");
    }
}
