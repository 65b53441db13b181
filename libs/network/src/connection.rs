//! TCP connections driven by the reactor.
//!
//! A [`Connection`] is a cheap handle; the socket itself lives in a task on
//! the reactor. Everything the task observes is reported through the
//! [`ConnectionMonitor`] supplied when the connection was created.

use crate::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace, warn};

const READ_CHUNK: usize = 16 * 1024;

/// Callbacks for one connection. Invoked on the IO thread; implementations
/// must not block.
pub trait ConnectionMonitor: Send + Sync + 'static {
    /// Outcome of an outbound connect. Not called for attached sockets.
    fn on_connected(&self, result: Result<()>);

    /// Bytes available on the socket. Returns how many were consumed; the
    /// rest is presented again, with more appended, on the next call.
    fn on_received(&self, data: &[u8]) -> usize;

    /// Called exactly once after a connection that reached the connected
    /// state has finished.
    fn on_closed(&self, self_initiated: bool, error: Option<TransportError>);
}

/// An accepted socket not yet bound to a monitor.
///
/// Dropping it closes the socket.
#[derive(Debug)]
pub struct PendingConnection {
    pub(crate) stream: std::net::TcpStream,
    pub(crate) peer: SocketAddr,
}

impl PendingConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

struct Shared {
    outbound: mpsc::UnboundedSender<Bytes>,
    close: Notify,
    closed: AtomicBool,
    peer: SocketAddr,
}

/// Handle to a connection running on the reactor
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.shared.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    fn new(peer: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            shared: Arc::new(Shared {
                outbound: tx,
                close: Notify::new(),
                closed: AtomicBool::new(false),
                peer,
            }),
        };
        (conn, rx)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer
    }

    /// Queue bytes for writing. Sends made before an outbound connect
    /// completes are written once it does.
    pub fn send(&self, data: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::closed("send on closed connection"));
        }
        self.shared
            .outbound
            .send(data)
            .map_err(|_| TransportError::closed("connection task has finished"))
    }

    /// Flush queued sends, then shut the socket down. Idempotent.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.close.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub(crate) fn spawn_connect(
        runtime: &tokio::runtime::Handle,
        addr: SocketAddr,
        timeout: Duration,
        monitor: Arc<dyn ConnectionMonitor>,
    ) -> Self {
        let (conn, rx) = Self::new(addr);
        let shared = conn.shared.clone();
        runtime.spawn(async move {
            let connect = tokio::time::timeout(timeout, TcpStream::connect(addr));
            let stream = tokio::select! {
                _ = shared.close.notified() => {
                    monitor.on_connected(Err(TransportError::closed("closed before connect completed")));
                    return;
                }
                res = connect => match res {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        debug!(peer = %addr, error = %e, "Connect failed");
                        monitor.on_connected(Err(TransportError::connection_with_source(
                            "connect failed",
                            Some(addr),
                            e,
                        )));
                        return;
                    }
                    Err(_) => {
                        debug!(peer = %addr, timeout_ms = timeout.as_millis() as u64, "Connect timed out");
                        monitor.on_connected(Err(TransportError::timeout(
                            "TCP connect",
                            timeout.as_millis() as u64,
                        )));
                        return;
                    }
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!(peer = %addr, "Failed to set TCP_NODELAY: {}", e);
            }
            monitor.on_connected(Ok(()));
            drive(stream, rx, shared, monitor).await;
        });
        conn
    }

    pub(crate) fn spawn_attached(
        runtime: &tokio::runtime::Handle,
        pending: PendingConnection,
        monitor: Arc<dyn ConnectionMonitor>,
    ) -> Self {
        let (conn, rx) = Self::new(pending.peer);
        let shared = conn.shared.clone();
        runtime.spawn(async move {
            let stream = match TcpStream::from_std(pending.stream) {
                Ok(stream) => stream,
                Err(e) => {
                    monitor.on_closed(false, Some(TransportError::io("attach accepted socket", e)));
                    return;
                }
            };
            let _ = stream.set_nodelay(true);
            drive(stream, rx, shared, monitor).await;
        });
        conn
    }
}

async fn drive(
    stream: TcpStream,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
    monitor: Arc<dyn ConnectionMonitor>,
) {
    let peer = shared.peer;
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let (self_initiated, error) = loop {
        buf.reserve(READ_CHUNK);
        tokio::select! {
            biased;
            _ = shared.close.notified() => {
                while let Ok(data) = outbound.try_recv() {
                    if writer.write_all(&data).await.is_err() {
                        break;
                    }
                }
                let _ = writer.shutdown().await;
                break (true, None);
            }
            data = outbound.recv() => match data {
                Some(data) => {
                    if let Err(e) = writer.write_all(&data).await {
                        break (false, Some(TransportError::io("write failed", e)));
                    }
                    trace!(peer = %peer, bytes = data.len(), "Wrote to socket");
                }
                None => {
                    // Every handle dropped
                    let _ = writer.shutdown().await;
                    break (true, None);
                }
            },
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => break (false, None),
                Ok(n) => {
                    trace!(peer = %peer, bytes = n, "Read from socket");
                    let consumed = monitor.on_received(&buf).min(buf.len());
                    let _ = buf.split_to(consumed);
                }
                Err(e) => break (false, Some(TransportError::io("read failed", e))),
            },
        }
    };

    shared.closed.store(true, Ordering::Release);
    debug!(peer = %peer, self_initiated, "Connection closed");
    monitor.on_closed(self_initiated, error);
}
