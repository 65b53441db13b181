//! Dispatcher
//!
//! Owns the actor registry, the worker pool and the IO thread, and
//! sequences startup and shutdown.
//!
//! # Threads
//!
//! - **Workers** (`actor-worker-N`): block on the runnable queue, drain one
//!   actor's mailbox per token and hand the token back through `end_run`.
//! - **IO** (`actor-io`): runs the reactor and fires cycle timers between
//!   wake-ups. Never executes handlers.
//!
//! # Shutdown
//!
//! Listeners close first. Actors are then destroyed in batches of equal
//! destroy priority, lowest first; each batch must report completion (or
//! time out) before the next batch receives `Destroy`. Workers stop only
//! after the last batch, and the reactor after the workers.

use crate::cell::{Actor, ActorCell};
use crate::dispatch::Handlers;
use crate::error::{DeliveryError, Result, RuntimeError};
use crate::listeners::{AcceptRouter, ListenerKind, ListenerSpec};
use crate::mailbox::Mailbox;
use crate::message::{Message, WireMessage};
use crate::proxy::ProxyService;
use crate::registry::ActorRegistry;
use crate::runtime::{RuntimeHandle, RuntimeShared, RuntimeStats};
use crate::service::Service;
use crate::timer::CycleTimers;
use bytes::Bytes;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use network::{ListenerHandle, Reactor, ReactorHandle};
use node_config::{Distribution, ProxyConfig, RuntimeConfig, ShutdownConfig};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use types::{ActorId, MessageId, SessionKey};

const DESTROY_POLL: Duration = Duration::from_millis(5);

struct Running {
    workers: Vec<JoinHandle<()>>,
    io_thread: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
    listener_handles: Vec<ListenerHandle>,
    reactor: ReactorHandle,
}

pub struct Dispatcher {
    shared: Arc<RuntimeShared>,
    pending: BTreeMap<ActorId, Arc<dyn ActorCell>>,
    remotes: BTreeMap<ActorId, SocketAddr>,
    listeners: Vec<ListenerSpec>,
    proxy_config: ProxyConfig,
    shutdown_config: ShutdownConfig,
    runnable_tx: Sender<ActorId>,
    runnable_rx: Receiver<ActorId>,
    running: Option<Running>,
}

impl Dispatcher {
    pub fn new(proxy_config: ProxyConfig, shutdown_config: ShutdownConfig) -> Self {
        let (runnable_tx, runnable_rx) = unbounded();
        Self {
            shared: Arc::new(RuntimeShared::default()),
            pending: BTreeMap::new(),
            remotes: BTreeMap::new(),
            listeners: Vec::new(),
            proxy_config,
            shutdown_config,
            runnable_tx,
            runnable_rx,
            running: None,
        }
    }

    /// Build a dispatcher with the listeners and remote actors of `config`
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RuntimeError::Config(format!("{:#}", e)))?;

        let mut dispatcher = Self::new(config.proxy.clone(), config.shutdown.clone());
        if let Some(addr) = &config.service_listen {
            dispatcher.set_service_listen_address(addr)?;
        }
        if let Some(addr) = &config.admin_listen {
            dispatcher.set_admin_listen_address(addr)?;
        }
        for listener in &config.custom_listeners {
            dispatcher.set_custom_listen_address(
                &listener.description,
                &listener.address,
                listener.handlers.clone(),
                listener.distribution,
            )?;
        }
        for remote in &config.remote_actors {
            dispatcher.register_remote_actor(remote.id, &remote.host, remote.port)?;
        }
        Ok(dispatcher)
    }

    pub fn register_actor<S: Service>(&mut self, id: ActorId, service: S) -> Result<()> {
        self.ensure_not_started()?;
        if id.is_proxy() {
            return Err(RuntimeError::ReservedId);
        }
        if self.pending.contains_key(&id) {
            return Err(RuntimeError::DuplicateActor(id));
        }
        if self.remotes.contains_key(&id) {
            return Err(RuntimeError::ConflictingRemote(id));
        }
        self.insert_actor(id, service)?;
        debug!(actor_id = %id, actor_type = std::any::type_name::<S>(), "Actor registered");
        Ok(())
    }

    /// Declare that `id` lives in the process listening at `host:port`
    pub fn register_remote_actor(&mut self, id: ActorId, host: &str, port: u16) -> Result<()> {
        self.ensure_not_started()?;
        if id.is_proxy() {
            return Err(RuntimeError::ReservedId);
        }
        if self.pending.contains_key(&id) {
            return Err(RuntimeError::ConflictingRemote(id));
        }
        if self.remotes.contains_key(&id) {
            return Err(RuntimeError::DuplicateActor(id));
        }
        let addr = resolve(&format!("{}:{}", host, port))?;
        self.remotes.insert(id, addr);
        debug!(actor_id = %id, remote = %addr, "Remote actor registered");
        Ok(())
    }

    /// Listener for peer runtimes
    pub fn set_service_listen_address(&mut self, address: &str) -> Result<()> {
        self.add_listener(ListenerKind::Service, address)
    }

    /// Listener for admin tools
    pub fn set_admin_listen_address(&mut self, address: &str) -> Result<()> {
        self.add_listener(ListenerKind::Admin, address)
    }

    /// Listener whose sockets are handed to `handlers` as `NewConnection`
    pub fn set_custom_listen_address(
        &mut self,
        description: &str,
        address: &str,
        handlers: Vec<ActorId>,
        distribution: Distribution,
    ) -> Result<()> {
        if handlers.is_empty() {
            return Err(RuntimeError::invalid_address(
                address,
                format!("custom listener '{}' has no handlers", description),
            ));
        }
        self.add_listener(
            ListenerKind::Custom {
                description: description.to_string(),
                handlers,
                distribution,
            },
            address,
        )
    }

    pub fn start(&mut self, workers: usize) -> Result<()> {
        if self.running.is_some() || self.shared.is_started() {
            return Err(RuntimeError::AlreadyRunning);
        }
        if workers == 0 {
            return Err(RuntimeError::InvalidWorkerCount(workers));
        }
        let started_at = Instant::now();

        let reactor = Reactor::new()?;
        let reactor_handle = reactor.handle();

        let outbound: Vec<SocketAddr> = self
            .remotes
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let proxy = ProxyService::new(self.proxy_config.clone(), outbound);
        self.insert_actor(ActorId::PROXY, proxy)?;

        let cells = std::mem::take(&mut self.pending);
        if !self
            .shared
            .install(ActorRegistry::from_cells(cells), reactor_handle.clone())
        {
            return Err(RuntimeError::AlreadyRunning);
        }
        self.shared.set_running(true);

        if let Err(e) = self.init_actors() {
            self.shared.set_running(false);
            return Err(e);
        }

        for spec in &self.listeners {
            if let ListenerKind::Custom { handlers, .. } = &spec.kind {
                if let Some(missing) = handlers.iter().find(|id| !self.shared.is_local(**id)) {
                    self.shared.set_running(false);
                    return Err(RuntimeError::UnknownHandler(*missing));
                }
            }
        }

        let mut timers = CycleTimers::new();
        let now = Instant::now();
        for cell in self.registry_cells() {
            if let Some(period) = cell.cycle_period() {
                debug!(actor_id = %cell.id(), period_ms = period.as_millis() as u64, "Cycle timer armed");
                timers.add(cell.id(), period, now);
            }
        }

        let cycles = timers.len();

        let listener_handles = match self.bind_listeners(&reactor_handle) {
            Ok(handles) => handles,
            Err(e) => {
                self.shared.set_running(false);
                return Err(e);
            }
        };

        let io_shared = self.shared.clone();
        let io_thread = thread::Builder::new()
            .name("actor-io".to_string())
            .spawn(move || {
                reactor.run(|now| {
                    timers.fire_due(now, |actor, msg| {
                        if let Err(e) = io_shared.push(actor, msg) {
                            debug!(actor_id = %actor, error = %e, "Cycle not delivered");
                        }
                    })
                });
            })?;

        let (stop_tx, stop_rx) = unbounded::<()>();
        let mut worker_handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let shared = self.shared.clone();
            let runnable = self.runnable_rx.clone();
            let stop = stop_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("actor-worker-{}", index))
                .spawn(move || worker_loop(shared, runnable, stop))?;
            worker_handles.push(handle);
        }

        info!(
            actors = self.shared.local_actor_ids().len(),
            remotes = self.remotes.len(),
            workers,
            cycles,
            listeners = listener_handles.len(),
            startup_ms = started_at.elapsed().as_millis() as u64,
            "Dispatcher started"
        );

        self.running = Some(Running {
            workers: worker_handles,
            io_thread: Some(io_thread),
            stop_tx: Some(stop_tx),
            listener_handles,
            reactor: reactor_handle,
        });
        Ok(())
    }

    /// Orderly shutdown; blocks until every thread has exited
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        info!("Stopping dispatcher");

        let listener_timeout = self.shutdown_config.listener_close_timeout();
        for handle in &running.listener_handles {
            handle.close();
        }
        for handle in &running.listener_handles {
            if !handle.wait_closed(listener_timeout) {
                warn!(listen_addr = %handle.local_addr(), "Listener did not close in time");
            }
        }

        self.destroy_actors();

        self.shared.set_running(false);
        drop(running.stop_tx.take());
        for worker in running.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker thread panicked");
            }
        }

        running.reactor.shutdown();
        if let Some(io_thread) = running.io_thread.take() {
            if io_thread.join().is_err() {
                error!("IO thread panicked");
            }
        }

        let stats = self.shared.stats();
        info!(
            processed = stats.messages_processed,
            dropped = stats.messages_dropped,
            panics = stats.handler_panics,
            "Dispatcher stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some() && self.shared.is_running()
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle::new(self.shared.clone())
    }

    pub fn send<M: WireMessage>(
        &self,
        source: ActorId,
        destination: ActorId,
        message_id: MessageId,
        payload: M,
    ) -> std::result::Result<(), DeliveryError> {
        self.shared.send(source, destination, 0, message_id, payload)
    }

    pub fn send_with_key<M: WireMessage>(
        &self,
        source: ActorId,
        destination: ActorId,
        session_key: SessionKey,
        message_id: MessageId,
        payload: M,
    ) -> std::result::Result<(), DeliveryError> {
        self.shared
            .send(source, destination, session_key, message_id, payload)
    }

    pub fn send_local<T: Any + Send>(
        &self,
        source: ActorId,
        destination: ActorId,
        message_id: MessageId,
        payload: T,
    ) -> std::result::Result<(), DeliveryError> {
        self.shared
            .send_local(source, destination, 0, message_id, payload)
    }

    pub fn send_wire(
        &self,
        source: ActorId,
        destination: ActorId,
        message_id: MessageId,
        payload: Bytes,
    ) -> std::result::Result<(), DeliveryError> {
        self.shared
            .send_wire(source, destination, 0, message_id, payload)
    }

    /// Bound listener addresses, in registration order. Empty before start.
    pub fn listen_addresses(&self) -> Vec<(ListenerKind, SocketAddr)> {
        self.shared.listeners().to_vec()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.shared.stats()
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.running.is_some() || self.shared.is_started() {
            return Err(RuntimeError::AlreadyRunning);
        }
        Ok(())
    }

    fn insert_actor<S: Service>(&mut self, id: ActorId, service: S) -> Result<()> {
        let mut handlers = Handlers::new();
        service.register_handlers(&mut handlers)?;
        let mailbox = Mailbox::new(id, self.runnable_tx.clone());
        let cell: Arc<dyn ActorCell> = Arc::new(Actor::new(id, service, handlers, mailbox));
        self.pending.insert(id, cell);
        Ok(())
    }

    fn add_listener(&mut self, kind: ListenerKind, address: &str) -> Result<()> {
        self.ensure_not_started()?;
        let address = resolve(address)?;
        if self.listeners.iter().any(|spec| spec.address == address && address.port() != 0) {
            return Err(RuntimeError::invalid_address(
                address.to_string(),
                "address already has a listener",
            ));
        }
        self.listeners.push(ListenerSpec { kind, address });
        Ok(())
    }

    fn registry_cells(&self) -> Vec<Arc<dyn ActorCell>> {
        self.shared
            .registry()
            .map(|registry| registry.cells().cloned().collect())
            .unwrap_or_default()
    }

    fn init_actors(&self) -> Result<()> {
        for cell in self.registry_cells() {
            if let Err(source) = cell.init(&self.shared) {
                error!(actor_id = %cell.id(), actor_type = cell.type_name(), error = %source, "Actor init failed");
                return Err(RuntimeError::InitFailed {
                    actor: cell.id(),
                    source,
                });
            }
            debug!(actor_id = %cell.id(), actor_type = cell.type_name(), "Actor initialized");
        }
        Ok(())
    }

    fn bind_listeners(&self, reactor: &ReactorHandle) -> Result<Vec<ListenerHandle>> {
        let mut handles: Vec<ListenerHandle> = Vec::with_capacity(self.listeners.len());
        let mut bound = Vec::with_capacity(self.listeners.len());
        for spec in &self.listeners {
            let router = Arc::new(AcceptRouter::new(self.shared.clone(), spec.kind.clone()));
            let handle = match reactor.bind(spec.address, router.clone()) {
                Ok(handle) => handle,
                Err(source) => {
                    for handle in &handles {
                        handle.close();
                    }
                    return Err(RuntimeError::ListenerFailed {
                        address: spec.address,
                        source,
                    });
                }
            };
            router.bound(handle.local_addr());
            info!(listener = spec.kind.label(), listen_addr = %handle.local_addr(), "Listening");
            bound.push((spec.kind.clone(), handle.local_addr()));
            handles.push(handle);
        }
        self.shared.set_listeners(bound);
        Ok(handles)
    }

    fn destroy_actors(&self) {
        let mut batches: BTreeMap<u32, Vec<Arc<dyn ActorCell>>> = BTreeMap::new();
        for cell in self.registry_cells() {
            batches.entry(cell.destroy_priority()).or_default().push(cell);
        }

        let timeout = self.shutdown_config.destroy_timeout();
        for (priority, batch) in batches {
            debug!(priority, actors = batch.len(), "Destroying batch");
            for cell in &batch {
                cell.mailbox().push(Message::Destroy);
            }

            let deadline = Instant::now() + timeout;
            loop {
                let pending: Vec<ActorId> = batch
                    .iter()
                    .filter(|cell| !cell.is_destroy_completed())
                    .map(|cell| cell.id())
                    .collect();
                if pending.is_empty() {
                    break;
                }
                if Instant::now() >= deadline {
                    warn!(
                        priority,
                        pending = ?pending,
                        timeout_ms = timeout.as_millis() as u64,
                        "Destroy timed out, continuing shutdown"
                    );
                    break;
                }
                thread::sleep(DESTROY_POLL);
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<RuntimeShared>, runnable: Receiver<ActorId>, stop: Receiver<()>) {
    let mut batch = Vec::new();
    loop {
        select! {
            recv(runnable) -> id => {
                let Ok(id) = id else { break };
                match shared.registry().and_then(|registry| registry.get(id)) {
                    Some(cell) => cell.run(&shared, &mut batch),
                    None => warn!(actor_id = %id, "Runnable token for unknown actor"),
                }
            }
            recv(stop) -> _ => break,
        }
    }
    debug!("Worker exiting");
}

fn resolve(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()
        .map_err(|e| RuntimeError::invalid_address(address, e.to_string()))?
        .next()
        .ok_or_else(|| RuntimeError::invalid_address(address, "no address resolved"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;
    impl Service for Idle {}

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ProxyConfig::default(), ShutdownConfig::default())
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        assert!(matches!(
            resolve("not an address"),
            Err(RuntimeError::InvalidAddress { .. })
        ));
        assert_eq!(resolve("127.0.0.1:9000").unwrap().port(), 9000);
    }

    #[test]
    fn test_registration_rules() {
        let mut d = dispatcher();
        assert!(matches!(
            d.register_actor(ActorId::PROXY, Idle),
            Err(RuntimeError::ReservedId)
        ));
        d.register_actor(ActorId::new(1), Idle).unwrap();
        assert!(matches!(
            d.register_actor(ActorId::new(1), Idle),
            Err(RuntimeError::DuplicateActor(_))
        ));
        assert!(matches!(
            d.register_remote_actor(ActorId::new(1), "127.0.0.1", 9000),
            Err(RuntimeError::ConflictingRemote(_))
        ));
        d.register_remote_actor(ActorId::new(2), "127.0.0.1", 9000)
            .unwrap();
        assert!(matches!(
            d.register_actor(ActorId::new(2), Idle),
            Err(RuntimeError::ConflictingRemote(_))
        ));
    }

    #[test]
    fn test_custom_listener_needs_handlers() {
        let mut d = dispatcher();
        assert!(d
            .set_custom_listen_address("web", "127.0.0.1:0", Vec::new(), Distribution::RoundRobin)
            .is_err());
        assert!(d.set_service_listen_address("127.0.0.1:notaport").is_err());
    }

    #[test]
    fn test_start_rejects_zero_workers_and_restart() {
        let mut d = dispatcher();
        assert!(matches!(d.start(0), Err(RuntimeError::InvalidWorkerCount(0))));
        d.start(1).unwrap();
        assert!(d.is_running());
        assert!(matches!(d.start(1), Err(RuntimeError::AlreadyRunning)));
        assert!(matches!(
            d.register_actor(ActorId::new(9), Idle),
            Err(RuntimeError::AlreadyRunning)
        ));
        d.stop();
        assert!(!d.is_running());
    }
}
