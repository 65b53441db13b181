//! Single-threaded reactor
//!
//! Owns a current-thread tokio runtime that is driven only by the thread
//! calling [`Reactor::run`]. Every socket and timer lives on that runtime;
//! other threads interact through a cloneable [`ReactorHandle`].
//!
//! `run` also hands control back to the caller every time a caller-managed
//! deadline elapses, which is how periodic work is interleaved with IO on
//! the same thread.

use crate::connection::{Connection, ConnectionMonitor, PendingConnection};
use crate::listener::{spawn_listener, ListenerHandle, ListenerMonitor};
use crate::{Result, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Longest the IO loop sleeps when no deadline is pending
const IDLE_WAIT: Duration = Duration::from_millis(100);

const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

pub struct Reactor {
    runtime: Runtime,
    shutdown: Arc<Notify>,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::io("build reactor runtime", e))?;
        Ok(Self {
            runtime,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            runtime: self.runtime.handle().clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Drive IO until [`ReactorHandle::shutdown`] is called.
    ///
    /// `poll_due` is called with the current time on every wake-up and
    /// returns the next instant it wants to be called at.
    pub fn run<F>(self, mut poll_due: F)
    where
        F: FnMut(Instant) -> Option<Instant>,
    {
        let shutdown = self.shutdown.clone();
        self.runtime.block_on(async move {
            loop {
                let now = Instant::now();
                let deadline = poll_due(now)
                    .map(|due| due.min(now + IDLE_WAIT))
                    .unwrap_or(now + IDLE_WAIT);
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
        });
        debug!("Reactor loop exited");
        self.runtime.shutdown_timeout(SHUTDOWN_GRACE);
    }
}

/// Cloneable access to the reactor from any thread
#[derive(Clone, Debug)]
pub struct ReactorHandle {
    runtime: tokio::runtime::Handle,
    shutdown: Arc<Notify>,
}

impl ReactorHandle {
    /// Start an outbound connection. The outcome arrives via
    /// [`ConnectionMonitor::on_connected`].
    pub fn connect(
        &self,
        addr: SocketAddr,
        timeout: Duration,
        monitor: Arc<dyn ConnectionMonitor>,
    ) -> Connection {
        Connection::spawn_connect(&self.runtime, addr, timeout, monitor)
    }

    /// Start driving an accepted socket
    pub fn attach(
        &self,
        pending: PendingConnection,
        monitor: Arc<dyn ConnectionMonitor>,
    ) -> Connection {
        Connection::spawn_attached(&self.runtime, pending, monitor)
    }

    /// Bind synchronously so address errors surface to the caller; accepting
    /// starts once the reactor runs.
    pub fn bind(
        &self,
        addr: SocketAddr,
        monitor: Arc<dyn ListenerMonitor>,
    ) -> Result<ListenerHandle> {
        spawn_listener(&self.runtime, addr, monitor)
    }

    /// One-shot timer. `f` runs on the IO thread.
    pub fn schedule<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        TimerHandle { task }
    }

    /// Make [`Reactor::run`] return
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }
}
