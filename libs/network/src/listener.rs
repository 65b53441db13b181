//! TCP listeners driven by the reactor.

use crate::connection::PendingConnection;
use crate::{Result, TransportError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Callbacks for one listener, invoked on the IO thread.
pub trait ListenerMonitor: Send + Sync + 'static {
    fn on_accept(&self, result: Result<PendingConnection>);

    /// Called once when the listener stops accepting.
    fn on_closed(&self, error: Option<TransportError>);
}

/// Handle to a bound listener
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    close: Arc<Notify>,
    done: Receiver<()>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Already accepted sockets are unaffected.
    pub fn close(&self) {
        self.close.notify_one();
    }

    /// Block until the listener task has finished, up to `timeout`.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        // A dropped sender means the task is gone as well
        !matches!(self.done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

pub(crate) fn spawn_listener(
    runtime: &tokio::runtime::Handle,
    addr: SocketAddr,
    monitor: Arc<dyn ListenerMonitor>,
) -> Result<ListenerHandle> {
    let std_listener = std::net::TcpListener::bind(addr)
        .map_err(|e| TransportError::io(format!("bind {}", addr), e))?;
    std_listener
        .set_nonblocking(true)
        .map_err(|e| TransportError::io("set listener non-blocking", e))?;
    let local_addr = std_listener
        .local_addr()
        .map_err(|e| TransportError::io("listener local address", e))?;

    let close = Arc::new(Notify::new());
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let close_signal = close.clone();

    runtime.spawn(async move {
        let listener = match TcpListener::from_std(std_listener) {
            Ok(listener) => listener,
            Err(e) => {
                monitor.on_closed(Some(TransportError::io("register listener", e)));
                let _ = done_tx.send(());
                return;
            }
        };
        info!(address = %local_addr, "Listener accepting");

        loop {
            tokio::select! {
                biased;
                _ = close_signal.notified() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(address = %local_addr, peer = %peer, "Accepted connection");
                        let pending = stream
                            .into_std()
                            .map(|stream| PendingConnection { stream, peer })
                            .map_err(|e| TransportError::io("detach accepted socket", e));
                        monitor.on_accept(pending);
                    }
                    Err(e) => {
                        warn!(address = %local_addr, error = %e, "Accept failed");
                        monitor.on_accept(Err(TransportError::io("accept", e)));
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }

        drop(listener);
        info!(address = %local_addr, "Listener closed");
        monitor.on_closed(None);
        let _ = done_tx.send(());
    });

    Ok(ListenerHandle {
        local_addr,
        close,
        done: done_rx,
    })
}
