//! Process-wide data-access state.
//!
//! [`GatewayContext`] owns the tunnel, the pool and the remote settings.
//! Each is created at most once, on first use, behind a
//! [`tokio::sync::OnceCell`]; concurrent first callers wait for the single
//! initialization and all observe the same instance. A failed initialization
//! leaves its cell empty and is returned to the caller, who decides whether
//! the process can continue.

use crate::error::GatewayResult;
use crate::models::{EndpointConfig, PoolSettings};
use crate::services::{ConnectionPool, RemoteSettings, SshTunnelService, TunnelHandle};

use std::future::Future;
use tokio::sync::OnceCell;

/// Lazily-initialized tunnel and pool for one endpoint.
pub struct GatewayContext {
    /// Endpoint this context connects to
    config: EndpointConfig,
    /// Pool tuning
    pool_settings: PoolSettings,
    /// SSH tunnel (tunneled mode only)
    tunnel: OnceCell<TunnelHandle>,
    /// Shared connection pool
    pool: OnceCell<ConnectionPool>,
    /// Settings published by `config.get()`
    remote_settings: OnceCell<RemoteSettings>,
}

impl GatewayContext {
    /// Create a context with default pool settings. Nothing connects yet.
    pub fn new(config: EndpointConfig) -> Self {
        Self::with_pool_settings(config, PoolSettings::default())
    }

    /// Create a context with custom pool settings.
    pub fn with_pool_settings(config: EndpointConfig, pool_settings: PoolSettings) -> Self {
        Self {
            config,
            pool_settings,
            tunnel: OnceCell::new(),
            pool: OnceCell::new(),
            remote_settings: OnceCell::new(),
        }
    }

    /// The endpoint configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Establish the SSH tunnel if the endpoint is tunneled.
    ///
    /// Returns `None` in direct mode.
    pub async fn ensure_tunnel(&self) -> GatewayResult<Option<&TunnelHandle>> {
        if !self.config.is_tunneled() {
            return Ok(None);
        }
        self.ensure_tunnel_with(|| SshTunnelService::establish(&self.config)).await.map(Some)
    }

    /// Establish the tunnel with a caller-supplied constructor.
    ///
    /// `establish` runs at most once per context, however many callers race.
    pub async fn ensure_tunnel_with<F, Fut>(&self, establish: F) -> GatewayResult<&TunnelHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<TunnelHandle>>,
    {
        self.tunnel.get_or_try_init(establish).await
    }

    /// Get the shared pool, creating the tunnel (if any) and pool on first use.
    ///
    /// The pool is only built after the tunnel listener is bound.
    pub async fn connect(&self) -> GatewayResult<&ConnectionPool> {
        self.pool
            .get_or_try_init(|| async {
                if let Some(tunnel) = self.ensure_tunnel().await? {
                    tracing::debug!(local = %tunnel.local_addr(), "Pool will connect through tunnel");
                }
                ConnectionPool::connect(&self.config.database, &self.pool_settings).await
            })
            .await
    }

    /// Settings published by the database, loaded once.
    pub async fn remote_settings(&self) -> GatewayResult<&RemoteSettings> {
        self.remote_settings
            .get_or_try_init(|| async {
                let pool = self.connect().await?;
                let document = pool.query_json(RemoteSettings::STATEMENT).await?;
                let settings = RemoteSettings::from_value(document)?;
                tracing::info!(keys = settings.len(), "Remote settings loaded");
                Ok(settings)
            })
            .await
    }

    /// The tunnel, if it has been established.
    pub fn tunnel(&self) -> Option<&TunnelHandle> {
        self.tunnel.get()
    }

    /// The pool, if it has been created.
    pub fn pool(&self) -> Option<&ConnectionPool> {
        self.pool.get()
    }

    /// Whether the pool has been created.
    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("mode", &self.config.mode)
            .field("database", &self.config.database.display_url())
            .field("tunnel", &self.tunnel.get())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::models::{DatabaseConfig, SshConfig};
    use crate::services::{BoxedStream, ChannelDialer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    struct RefusingDialer;

    #[async_trait]
    impl ChannelDialer for RefusingDialer {
        async fn dial(&self, _host: &str, _port: u16) -> GatewayResult<BoxedStream> {
            Err(GatewayError::ssh("no session"))
        }
    }

    fn unreachable_database() -> DatabaseConfig {
        DatabaseConfig::new("127.0.0.1", "novakey", "novakey", "secret").with_port(1)
    }

    fn lazy_pool() -> PoolSettings {
        PoolSettings::default().with_validation(false)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connect_creates_one_pool() {
        let context = Arc::new(GatewayContext::with_pool_settings(
            EndpointConfig::direct(unreachable_database()),
            lazy_pool(),
        ));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let context = Arc::clone(&context);
                tokio::spawn(async move {
                    context.connect().await.map(|pool| pool as *const ConnectionPool as usize)
                })
            })
            .collect();

        let addresses: Vec<usize> = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
        assert!(context.is_connected());
        assert!(context.tunnel().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tunnel_bootstrap_runs_once() {
        let context = Arc::new(GatewayContext::new(EndpointConfig::direct(unreachable_database())));
        let constructions = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let context = Arc::clone(&context);
                let constructions = Arc::clone(&constructions);
                tokio::spawn(async move {
                    let tunnel = context
                        .ensure_tunnel_with(|| async move {
                            constructions.fetch_add(1, Ordering::SeqCst);
                            let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
                                GatewayError::tunnel_with_source("bind failed", e)
                            })?;
                            TunnelHandle::spawn(listener, Arc::new(RefusingDialer), "127.0.0.1", 1)
                        })
                        .await
                        .unwrap();
                    tunnel.local_addr()
                })
            })
            .collect();

        let addrs: Vec<_> =
            futures_util::future::join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_bad_private_key_halts_before_pool() {
        let context = GatewayContext::with_pool_settings(
            EndpointConfig::tunneled(
                SshConfig::new("127.0.0.1", "deploy", "-----BEGIN GARBAGE-----").with_port(1),
                unreachable_database(),
            ),
            lazy_pool(),
        );

        let err = context.connect().await.unwrap_err();
        assert!(matches!(err, GatewayError::Ssh { .. }));
        assert!(err.is_fatal());
        assert!(!context.is_connected());
        assert!(context.tunnel().is_none());
    }

    #[tokio::test]
    async fn test_direct_mode_has_no_tunnel() {
        let context = GatewayContext::new(EndpointConfig::direct(unreachable_database()));
        assert!(context.ensure_tunnel().await.unwrap().is_none());
    }
}
