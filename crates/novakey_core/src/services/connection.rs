//! Database connection pooling with deadpool-postgres.
//!
//! Provides:
//! - Pool construction from a [`DatabaseConfig`] with optional connect-time validation
//! - Pool status reporting
//! - Single-statement JSON calls used by the RPC pipeline

use crate::error::{GatewayError, GatewayResult};
use crate::models::{DatabaseConfig, PoolSettings, PoolStatus};

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde_json::Value;
use std::time::Duration;
use tokio_postgres::types::Json;
use tokio_postgres::NoTls;

/// The process-wide pool of PostgreSQL connections.
///
/// Checkout and return of individual connections is left to deadpool.
pub struct ConnectionPool {
    /// The actual connection pool
    pool: Pool,
    /// Connection string without password, for logs
    display_url: String,
    /// When this pool was created
    created_at: DateTime<Utc>,
}

impl ConnectionPool {
    /// Build the pool described by `database`.
    ///
    /// When [`PoolSettings::validate_on_connect`] is set, one connection is
    /// opened and probed before returning.
    pub async fn connect(database: &DatabaseConfig, settings: &PoolSettings) -> GatewayResult<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&database.host);
        pg_config.port(database.port);
        pg_config.dbname(&database.name);
        pg_config.user(&database.user);
        pg_config.password(&database.password);
        pg_config.application_name(&settings.application_name);
        pg_config.connect_timeout(settings.connect_timeout);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(60));

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig { recycling_method: RecyclingMethod::Fast },
        );

        let pool = Pool::builder(manager)
            .max_size(settings.max_size)
            .wait_timeout(Some(settings.wait_timeout))
            .create_timeout(Some(settings.connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| GatewayError::pool(format!("Unable to create connection pool: {e}")))?;

        if settings.validate_on_connect {
            let client = pool.get().await.map_err(|e| {
                GatewayError::pool(format!("Failed to establish connection: {e}"))
            })?;
            client
                .execute("SELECT 1", &[])
                .await
                .map_err(|e| GatewayError::pool_with_source("Connection validation failed", e))?;
        }

        let display_url = database.display_url();
        tracing::info!(
            database = %display_url,
            max_size = settings.max_size,
            validated = settings.validate_on_connect,
            "Connection pool created"
        );

        Ok(Self { pool, display_url, created_at: Utc::now() })
    }

    /// Connection string without password.
    pub fn display_url(&self) -> &str {
        &self.display_url
    }

    /// Get when this pool was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get current pool status.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Acquire a connection from the pool.
    pub async fn get(&self) -> GatewayResult<deadpool_postgres::Client> {
        self.pool.get().await.map_err(GatewayError::from)
    }

    /// Run `statement` with one `jsonb` parameter and read the single JSON column.
    ///
    /// A SQL `NULL` result is returned as JSON `null`.
    pub async fn call_json(&self, statement: &str, payload: &Value) -> GatewayResult<Value> {
        let client = self.get().await?;
        let row = client.query_one(statement, &[&Json(payload)]).await?;
        let result: Option<Json<Value>> = row.try_get(0)?;
        Ok(result.map(|Json(value)| value).unwrap_or(Value::Null))
    }

    /// Run a parameterless `statement` and read the single JSON column.
    pub async fn query_json(&self, statement: &str) -> GatewayResult<Value> {
        let client = self.get().await?;
        let row = client.query_one(statement, &[]).await?;
        let result: Option<Json<Value>> = row.try_get(0)?;
        Ok(result.map(|Json(value)| value).unwrap_or(Value::Null))
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("database", &self.display_url)
            .field("created_at", &self.created_at)
            .field("status", &self.status())
            .finish()
    }
}
