//! SSH tunnel to a database that is not directly routable.
//!
//! A local listener is bound on the database's nominal `host:port`. Every
//! accepted connection is forwarded through a `direct-tcpip` channel of one
//! shared SSH session to the same address as seen from the bastion. Failures
//! on a single forwarded connection are logged and dropped; they never reach
//! the accept loop or other connections.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{EndpointConfig, SshConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use russh::client;
use russh_keys::key::KeyPair;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Upper bound for SSH dial plus authentication.
pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed `accept` (EMFILE and friends).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A bidirectional byte stream to the remote database.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> TunnelStream for T {}

/// Boxed remote stream returned by a [`ChannelDialer`].
pub type BoxedStream = Box<dyn TunnelStream>;

/// Opens one remote stream per forwarded connection.
#[async_trait]
pub trait ChannelDialer: Send + Sync + 'static {
    /// Open a stream to `host:port` on the far side of the tunnel.
    async fn dial(&self, host: &str, port: u16) -> GatewayResult<BoxedStream>;
}

/// SSH client handler for russh.
struct TunnelClientHandler;

#[async_trait]
impl client::Handler for TunnelClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are not pinned; the bastion is identified by address only
        Ok(true)
    }
}

/// Dials through `direct-tcpip` channels of an authenticated SSH session.
///
/// Channel opens run concurrently on the shared session.
pub struct SshDialer {
    session: client::Handle<TunnelClientHandler>,
}

#[async_trait]
impl ChannelDialer for SshDialer {
    async fn dial(&self, host: &str, port: u16) -> GatewayResult<BoxedStream> {
        let channel = self
            .session
            .channel_open_direct_tcpip(host, port as u32, "127.0.0.1", 0)
            .await
            .map_err(|e| GatewayError::ssh(format!("Failed to open SSH channel: {e}")))?;
        Ok(Box::new(channel.into_stream()))
    }
}

/// Forwarding counters of a running tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TunnelStats {
    /// Connections accepted on the local listener
    pub accepted: u64,
    /// Connections that failed to dial or broke mid-stream
    pub failed: u64,
    /// Connections currently being forwarded
    pub active: usize,
}

/// Live forwarded connections and counters, shared with the forwarding tasks.
#[derive(Default)]
struct ConnectionRegistry {
    live: RwLock<HashMap<Uuid, SocketAddr>>,
    accepted: AtomicU64,
    failed: AtomicU64,
}

impl ConnectionRegistry {
    fn register(self: &Arc<Self>, peer: SocketAddr) -> LiveConnection {
        let id = Uuid::new_v4();
        self.live.write().insert(id, peer);
        LiveConnection { id, registry: Arc::clone(self) }
    }

    fn stats(&self) -> TunnelStats {
        TunnelStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            active: self.live.read().len(),
        }
    }
}

/// Removes its entry from the registry when the forwarding task ends.
struct LiveConnection {
    id: Uuid,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.registry.live.write().remove(&self.id);
    }
}

/// Handle to a running tunnel.
///
/// The accept loop and every forwarding task stop when the handle is
/// dropped. The process-wide handle lives in `GatewayContext` and is only
/// dropped at exit.
pub struct TunnelHandle {
    local_addr: SocketAddr,
    remote_host: String,
    remote_port: u16,
    established_at: DateTime<Utc>,
    registry: Arc<ConnectionRegistry>,
    cancel_token: CancellationToken,
}

impl TunnelHandle {
    /// Start forwarding connections accepted on `listener` to
    /// `remote_host:remote_port` via `dialer`.
    pub fn spawn(
        listener: TcpListener,
        dialer: Arc<dyn ChannelDialer>,
        remote_host: impl Into<String>,
        remote_port: u16,
    ) -> GatewayResult<Self> {
        let local_addr = listener.local_addr().map_err(|e| {
            GatewayError::tunnel_with_source("Cannot read tunnel listener address", e)
        })?;
        let remote_host = remote_host.into();
        let registry = Arc::new(ConnectionRegistry::default());
        let cancel_token = CancellationToken::new();

        tokio::spawn(run_tunnel(
            listener,
            dialer,
            remote_host.clone(),
            remote_port,
            Arc::clone(&registry),
            cancel_token.clone(),
        ));

        tracing::info!(
            local = %local_addr,
            remote = %format!("{remote_host}:{remote_port}"),
            "Tunnel listening"
        );

        Ok(Self {
            local_addr,
            remote_host,
            remote_port,
            established_at: Utc::now(),
            registry,
            cancel_token,
        })
    }

    /// Address of the local listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remote host being tunneled to.
    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    /// Remote port being tunneled to.
    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// When the listener started accepting.
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    /// Snapshot of the forwarding counters.
    pub fn stats(&self) -> TunnelStats {
        self.registry.stats()
    }

    /// Number of connections currently being forwarded.
    pub fn active_connections(&self) -> usize {
        self.registry.live.read().len()
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("local_addr", &self.local_addr)
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("stats", &self.stats())
            .finish()
    }
}

/// SSH tunnel service for establishing the database tunnel.
pub struct SshTunnelService;

impl SshTunnelService {
    /// Establish the tunnel described by a tunneled [`EndpointConfig`].
    ///
    /// Key parsing, SSH dial/authentication and the local bind are all
    /// fatal: on any of them nothing is left running.
    pub async fn establish(config: &EndpointConfig) -> GatewayResult<TunnelHandle> {
        let ssh = config.ssh_config()?;
        let database = &config.database;

        // Parse before touching the network so a bad key fails fast
        let key = Self::parse_private_key(&ssh.private_key)?;

        tracing::info!(
            bastion = %ssh.address(),
            user = %ssh.user,
            "Establishing SSH tunnel"
        );
        let session = Self::connect_ssh(ssh, key).await?;

        let bind_addr = database.address();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            GatewayError::tunnel_with_source(format!("local port listen error on {bind_addr}"), e)
        })?;

        let dialer = SshDialer { session };
        TunnelHandle::spawn(listener, Arc::new(dialer), database.host.clone(), database.port)
    }

    /// Decode unencrypted private key material.
    pub fn parse_private_key(pem: &str) -> GatewayResult<Arc<KeyPair>> {
        russh_keys::decode_secret_key(pem, None)
            .map(Arc::new)
            .map_err(|e| GatewayError::ssh(format!("parse private key: {e}")))
    }

    /// Dial and authenticate within [`SSH_CONNECT_TIMEOUT`].
    async fn connect_ssh(
        ssh: &SshConfig,
        key: Arc<KeyPair>,
    ) -> GatewayResult<client::Handle<TunnelClientHandler>> {
        let config = Arc::new(client::Config::default());

        let connect = async {
            let mut handle =
                client::connect(config, (ssh.host.as_str(), ssh.port), TunnelClientHandler)
                    .await
                    .map_err(|e| GatewayError::ssh(format!("SSH dial error: {e}")))?;

            let authenticated = handle
                .authenticate_publickey(ssh.user.clone(), key)
                .await
                .map_err(|e| GatewayError::ssh(format!("SSH key authentication failed: {e}")))?;

            if !authenticated {
                return Err(GatewayError::ssh(format!(
                    "SSH server rejected key for user {}",
                    ssh.user
                )));
            }
            Ok(handle)
        };

        let handle = tokio::time::timeout(SSH_CONNECT_TIMEOUT, connect).await.map_err(|_| {
            GatewayError::ssh(format!(
                "SSH connection to {} timed out after {}s",
                ssh.address(),
                SSH_CONNECT_TIMEOUT.as_secs()
            ))
        })??;

        tracing::info!(user = %ssh.user, bastion = %ssh.address(), "SSH authentication successful");
        Ok(handle)
    }
}

/// Accept loop; runs until the handle's token is cancelled.
async fn run_tunnel(
    listener: TcpListener,
    dialer: Arc<dyn ChannelDialer>,
    remote_host: String,
    remote_port: u16,
    registry: Arc<ConnectionRegistry>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((local_stream, peer_addr)) => {
                        registry.accepted.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(peer = %peer_addr, "New tunnel connection");

                        let dialer = Arc::clone(&dialer);
                        let remote_host = remote_host.clone();
                        let registry = Arc::clone(&registry);
                        let cancel = cancel_token.clone();

                        tokio::spawn(async move {
                            let live = registry.register(peer_addr);
                            let result = forward_connection(
                                local_stream,
                                dialer.as_ref(),
                                &remote_host,
                                remote_port,
                                cancel,
                            )
                            .await;
                            match result {
                                Ok((to_remote, to_local)) => tracing::debug!(
                                    peer = %peer_addr,
                                    to_remote,
                                    to_local,
                                    "Tunnel connection closed"
                                ),
                                Err(e) => {
                                    registry.failed.fetch_add(1, Ordering::Relaxed);
                                    tracing::warn!(peer = %peer_addr, error = %e, "Tunnel forwarding error");
                                }
                            }
                            drop(live);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept tunnel connection");
                        backoff_after_accept_error(&cancel_token).await;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                tracing::info!(remote = %format!("{remote_host}:{remote_port}"), "Tunnel stopped");
                break;
            }
        }
    }
}

async fn backoff_after_accept_error(cancel_token: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
        _ = cancel_token.cancelled() => {}
    }
}

/// Forward one local connection until either side closes.
///
/// EOF on one direction shuts down the write half of the other peer, so a
/// close on either end propagates.
async fn forward_connection(
    mut local_stream: TcpStream,
    dialer: &dyn ChannelDialer,
    remote_host: &str,
    remote_port: u16,
    cancel_token: CancellationToken,
) -> GatewayResult<(u64, u64)> {
    let mut remote_stream = dialer.dial(remote_host, remote_port).await?;

    tokio::select! {
        result = tokio::io::copy_bidirectional(&mut local_stream, &mut remote_stream) => {
            result.map_err(|e| GatewayError::tunnel_with_source("Tunnel stream broke", e))
        }
        _ = cancel_token.cancelled() => Ok((0, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseConfig;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Dials plain TCP; stands in for the SSH channel.
    struct DirectDialer;

    #[async_trait]
    impl ChannelDialer for DirectDialer {
        async fn dial(&self, host: &str, port: u16) -> GatewayResult<BoxedStream> {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| GatewayError::tunnel_with_source("dial failed", e))?;
            Ok(Box::new(stream))
        }
    }

    /// Fails exactly the `fail_on`-th dial (0-based).
    struct FlakyDialer {
        calls: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl ChannelDialer for FlakyDialer {
        async fn dial(&self, host: &str, port: u16) -> GatewayResult<BoxedStream> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
                return Err(GatewayError::ssh("remote unreachable"));
            }
            DirectDialer.dial(host, port).await
        }
    }

    async fn spawn_echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let (mut reader, mut writer) = socket.split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                });
            }
        });
        addr
    }

    async fn spawn_tunnel(dialer: Arc<dyn ChannelDialer>, target: SocketAddr) -> TunnelHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        TunnelHandle::spawn(listener, dialer, target.ip().to_string(), target.port()).unwrap()
    }

    async fn round_trip(addr: SocketAddr, payload: Vec<u8>) -> Vec<u8> {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let len = payload.len();
        let writer_task = tokio::spawn(async move {
            writer.write_all(&payload).await.unwrap();
            writer.shutdown().await.unwrap();
        });
        let mut received = vec![0u8; len];
        reader.read_exact(&mut received).await.unwrap();
        writer_task.await.unwrap();
        received
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connections_preserve_bytes() {
        let echo = spawn_echo_server().await;
        let tunnel = spawn_tunnel(Arc::new(DirectDialer), echo).await;
        let local = tunnel.local_addr();

        let tasks: Vec<_> = (0..16u8)
            .map(|n| {
                tokio::spawn(async move {
                    let payload: Vec<u8> =
                        (0..64 * 1024).map(|i| (i as u8).wrapping_mul(31).wrapping_add(n)).collect();
                    let received = round_trip(local, payload.clone()).await;
                    assert_eq!(received, payload, "connection {n} corrupted");
                })
            })
            .collect();

        for result in futures_util::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(tunnel.stats().accepted, 16);
        assert_eq!(tunnel.stats().failed, 0);
    }

    #[tokio::test]
    async fn test_failed_dial_does_not_affect_open_connection() {
        let echo = spawn_echo_server().await;
        let dialer = FlakyDialer { calls: AtomicUsize::new(0), fail_on: 1 };
        let tunnel = spawn_tunnel(Arc::new(dialer), echo).await;

        // Connection B is established first and stays open
        let mut conn_b = TcpStream::connect(tunnel.local_addr()).await.unwrap();
        conn_b.write_all(b"before").await.unwrap();
        let mut buf = [0u8; 6];
        conn_b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"before");

        // Connection A hits the failing dial and is closed by the tunnel
        let mut conn_a = TcpStream::connect(tunnel.local_addr()).await.unwrap();
        let mut sink = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(5), conn_a.read_to_end(&mut sink))
            .await
            .expect("failed connection was not closed")
            .unwrap_or(0);
        assert_eq!(n, 0);

        // B keeps working
        conn_b.write_all(b"after!").await.unwrap();
        conn_b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"after!");

        // The failure is counted after A's socket is dropped
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tunnel.stats().failed == 0 {
            assert!(tokio::time::Instant::now() < deadline, "failure never counted");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(tunnel.stats().failed, 1);
        assert_eq!(tunnel.stats().accepted, 2);
    }

    /// The first dial stalls until released; later dials connect directly.
    struct StallingDialer {
        calls: AtomicUsize,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl ChannelDialer for StallingDialer {
        async fn dial(&self, host: &str, port: u16) -> GatewayResult<BoxedStream> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.release.notified().await;
            }
            DirectDialer.dial(host, port).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stalled_dial_does_not_block_new_connections() {
        let echo = spawn_echo_server().await;
        let dialer =
            Arc::new(StallingDialer { calls: AtomicUsize::new(0), release: Default::default() });
        let tunnel = spawn_tunnel(Arc::clone(&dialer) as Arc<dyn ChannelDialer>, echo).await;

        let mut stalled = TcpStream::connect(tunnel.local_addr()).await.unwrap();
        while dialer.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // The second connection is served while the first dial is still pending
        let received = tokio::time::timeout(
            Duration::from_secs(5),
            round_trip(tunnel.local_addr(), b"independent".to_vec()),
        )
        .await
        .expect("second connection waited on the stalled dial");
        assert_eq!(received, b"independent");

        dialer.release.notify_one();
        stalled.write_all(b"late").await.unwrap();
        let mut buf = [0u8; 4];
        stalled.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backoff_waits() {
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();
        backoff_after_accept_error(&token).await;
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_accept_error_backoff_ends_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(10), backoff_after_accept_error(&token))
            .await
            .expect("backoff ignored cancellation");
    }

    #[tokio::test]
    async fn test_live_connections_are_tracked() {
        let echo = spawn_echo_server().await;
        let tunnel = spawn_tunnel(Arc::new(DirectDialer), echo).await;

        let mut conn = TcpStream::connect(tunnel.local_addr()).await.unwrap();
        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(tunnel.active_connections(), 1);

        drop(conn);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tunnel.active_connections() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "connection never released");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_malformed_key_fails_before_dialing() {
        let config = EndpointConfig::tunneled(
            // Port 1 on localhost: any dial attempt would fail differently
            SshConfig::new("127.0.0.1", "deploy", "not a private key").with_port(1),
            DatabaseConfig::new("127.0.0.1", "novakey", "novakey", "secret").with_port(0),
        );

        let err = SshTunnelService::establish(&config).await.unwrap_err();
        assert!(matches!(err, GatewayError::Ssh { .. }));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("parse private key"), "{err}");
    }
}
