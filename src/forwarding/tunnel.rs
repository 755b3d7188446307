// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Local TCP listener relayed through the SSH connection.
//!
//! ```text
//! [Client] → [Local Listener] → [direct-tcpip channel] → [Remote Host:Port]
//! ```
//!
//! Every accepted connection gets its own remote channel and a relay task
//! copying bytes in both directions. The relay ends as soon as either
//! direction ends, and then both ends are closed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{parse_remote_address, ForwardError};
use crate::ssh::ChannelOpener;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Delay before accepting again after a failed accept.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Traffic counters of a tunnel.
#[derive(Debug)]
pub struct TunnelStats {
    /// Bytes transferred from local to remote
    pub bytes_local_to_remote: AtomicU64,
    /// Bytes transferred from remote to local
    pub bytes_remote_to_local: AtomicU64,
    /// Local connections accepted
    pub connections_accepted: AtomicU64,
    /// Connections whose remote channel could not be opened, or that failed mid-copy
    pub error_count: AtomicU64,
    pub started_at: Instant,
}

impl Default for TunnelStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelStats {
    pub fn new() -> Self {
        Self {
            bytes_local_to_remote: AtomicU64::new(0),
            bytes_remote_to_local: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Get total bytes transferred in both directions
    pub fn total_bytes(&self) -> u64 {
        self.bytes_local_to_remote.load(Ordering::Relaxed)
            + self.bytes_remote_to_local.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}

struct TrackedConnection {
    peer: SocketAddr,
    task: JoinHandle<()>,
}

type ConnectionList = Arc<Mutex<Vec<TrackedConnection>>>;

fn lock(connections: &Mutex<Vec<TrackedConnection>>) -> MutexGuard<'_, Vec<TrackedConnection>> {
    connections
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A running port forward. Dropping it stops the listener and every relay.
pub struct Tunnel {
    id: Uuid,
    local_addr: SocketAddr,
    remote: String,
    closed: AtomicBool,
    cancel: CancellationToken,
    connections: ConnectionList,
    stats: Arc<TunnelStats>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .field("remote", &self.remote)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Tunnel {
    /// Listen on `local_addr` and relay every connection to `remote_addr`
    /// (`host:port`, resolved on the remote side).
    pub async fn open(
        opener: Arc<dyn ChannelOpener>,
        local_addr: &str,
        remote_addr: &str,
    ) -> Result<Self, ForwardError> {
        let (host, port) = parse_remote_address(remote_addr)?;
        let bind_error = |source| ForwardError::Bind {
            addr: local_addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(local_addr).await.map_err(bind_error)?;
        let bound = listener.local_addr().map_err(bind_error)?;

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let connections = ConnectionList::default();
        let stats = Arc::new(TunnelStats::new());

        let accept_task = tokio::spawn(accept_loop(
            listener,
            opener,
            host,
            port,
            cancel.clone(),
            Arc::clone(&connections),
            Arc::clone(&stats),
        ));

        info!("Tunnel {} listening on {} for {}", id, bound, remote_addr);
        Ok(Self {
            id,
            local_addr: bound,
            remote: remote_addr.to_string(),
            closed: AtomicBool::new(false),
            cancel,
            connections,
            stats,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The bound listener address; useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn stats(&self) -> &TunnelStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Relays that are still copying.
    pub fn active_connections(&self) -> usize {
        lock(&self.connections)
            .iter()
            .filter(|connection| !connection.task.is_finished())
            .count()
    }

    /// Stop accepting and close every tracked connection. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let accept_task = self
            .accept_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = accept_task {
            if let Err(e) = task.await {
                debug!("Tunnel accept loop ended abnormally: {}", e);
            }
        }

        let connections = std::mem::take(&mut *lock(&self.connections));
        for connection in connections {
            trace!("Closing tunneled connection from {}", connection.peer);
            let _ = connection.task.await;
        }

        info!(
            "Tunnel {} closed: {} connections, {} bytes L→R, {} bytes R→L",
            self.id,
            self.stats.connections(),
            self.stats.bytes_local_to_remote.load(Ordering::Relaxed),
            self.stats.bytes_remote_to_local.load(Ordering::Relaxed)
        );
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    opener: Arc<dyn ChannelOpener>,
    host: String,
    port: u16,
    cancel: CancellationToken,
    connections: ConnectionList,
    stats: Arc<TunnelStats>,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer)) => {
                debug!("Accepted tunnel connection from {}", peer);
                stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                let task = tokio::spawn(relay(
                    socket,
                    peer,
                    Arc::clone(&opener),
                    host.clone(),
                    port,
                    cancel.child_token(),
                    Arc::clone(&stats),
                ));
                let mut tracked = lock(&connections);
                tracked.retain(|connection| !connection.task.is_finished());
                tracked.push(TrackedConnection { peer, task });
            }
            Err(e) => {
                warn!("Failed to accept tunnel connection: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                }
            }
        }
    }
    debug!("Tunnel listener stopped");
}

async fn relay(
    local: TcpStream,
    peer: SocketAddr,
    opener: Arc<dyn ChannelOpener>,
    host: String,
    port: u16,
    cancel: CancellationToken,
    stats: Arc<TunnelStats>,
) {
    let remote = tokio::select! {
        _ = cancel.cancelled() => return,
        remote = opener.open_tunnel(&host, port) => remote,
    };
    let remote = match remote {
        Ok(remote) => remote,
        Err(e) => {
            stats.error_count.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to open channel to {}:{} for {}: {}", host, port, peer, e);
            return;
        }
    };

    let (mut local_read, mut local_write) = local.into_split();
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            trace!("Relay for {} cancelled", peer);
            Ok(())
        }
        result = pump(&mut local_read, &mut remote_write, &stats.bytes_local_to_remote) => result,
        result = pump(&mut remote_read, &mut local_write, &stats.bytes_remote_to_local) => result,
    };
    if let Err(e) = result {
        stats.error_count.fetch_add(1, Ordering::Relaxed);
        debug!("Relay for {} ended with error: {}", peer, e);
    }

    let _ = remote_write.shutdown().await;
    let _ = local_write.shutdown().await;
    debug!("Tunnel connection from {} closed", peer);
}

async fn pump<R, W>(reader: &mut R, writer: &mut W, counter: &AtomicU64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buffer[..n]).await?;
        writer.flush().await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::tokio_client::Error;
    use crate::ssh::{BoxedStream, ChannelStreams, ShellRequest};
    use async_trait::async_trait;

    /// Opens "remote" channels as plain TCP connections to `target`.
    struct DirectOpener {
        target: SocketAddr,
    }

    #[async_trait]
    impl ChannelOpener for DirectOpener {
        async fn open_shell(&self, _request: &ShellRequest) -> Result<ChannelStreams, Error> {
            Err(Error::ChannelRequestRejected("shell"))
        }

        async fn open_exec(&self, _command: &str) -> Result<ChannelStreams, Error> {
            Err(Error::ChannelRequestRejected("exec"))
        }

        async fn open_tunnel(&self, _host: &str, _port: u16) -> Result<BoxedStream, Error> {
            Ok(Box::new(TcpStream::connect(self.target).await?))
        }
    }

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut read, mut write) = socket.split();
                    let _ = tokio::io::copy(&mut read, &mut write).await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_relays_bytes_both_ways() {
        let target = echo_server().await;
        let tunnel = Tunnel::open(
            Arc::new(DirectOpener { target }),
            "127.0.0.1:0",
            "db.internal:5432",
        )
        .await
        .unwrap();

        let mut client = TcpStream::connect(tunnel.local_addr()).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"ping");

        assert_eq!(tunnel.stats().connections(), 1);
        assert_eq!(tunnel.remote(), "db.internal:5432");

        tunnel.close().await;
        assert!(tunnel.is_closed());
        assert_eq!(tunnel.stats().total_bytes(), 8);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_listener() {
        let target = echo_server().await;
        let tunnel = Tunnel::open(Arc::new(DirectOpener { target }), "127.0.0.1:0", "h:1")
            .await
            .unwrap();
        let addr = tunnel.local_addr();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"x").await.unwrap();
        let mut reply = [0u8; 1];
        client.read_exact(&mut reply).await.unwrap();

        tunnel.close().await;
        tunnel.close().await;
        assert_eq!(tunnel.active_connections(), 0);

        // The tracked connection was closed by the tunnel.
        let mut rest = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut rest))
            .await
            .unwrap();
        assert!(read.map(|n| n == 0).unwrap_or(true));

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_remote_channel_is_counted() {
        // Nothing listens on the target.
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = unused.local_addr().unwrap();
        drop(unused);

        let tunnel = Tunnel::open(Arc::new(DirectOpener { target }), "127.0.0.1:0", "h:1")
            .await
            .unwrap();
        let mut client = TcpStream::connect(tunnel.local_addr()).await.unwrap();
        let mut rest = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut rest)).await;
        assert_eq!(tunnel.stats().errors(), 1);
        tunnel.close().await;
    }

    #[tokio::test]
    async fn test_invalid_remote_address() {
        let target = echo_server().await;
        let result = Tunnel::open(Arc::new(DirectOpener { target }), "127.0.0.1:0", "nohost").await;
        assert!(matches!(result, Err(ForwardError::InvalidAddress(_))));
    }
}
