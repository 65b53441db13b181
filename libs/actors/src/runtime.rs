//! State shared by the dispatcher, its threads and every handler context.

use crate::error::DeliveryError;
use crate::listeners::ListenerKind;
use crate::message::{Envelope, LocalPayload, Message, OutboundPayload, WireMessage};
use crate::registry::ActorRegistry;
use bytes::Bytes;
use codec::RawPayload;
use network::ReactorHandle;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;
use types::{ActorId, MessageId, SessionKey};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub processed: AtomicU64,
    pub dropped: AtomicU64,
    pub panics: AtomicU64,
}

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub messages_processed: u64,
    /// Undeliverable, rejected by a handler table, or discarded after destroy
    pub messages_dropped: u64,
    pub handler_panics: u64,
}

#[derive(Default)]
pub(crate) struct RuntimeShared {
    registry: OnceCell<ActorRegistry>,
    reactor: OnceCell<ReactorHandle>,
    listeners: OnceCell<Vec<(ListenerKind, SocketAddr)>>,
    running: AtomicBool,
    pub counters: Counters,
}

impl RuntimeShared {
    pub(crate) fn install(&self, registry: ActorRegistry, reactor: ReactorHandle) -> bool {
        self.registry.set(registry).is_ok() && self.reactor.set(reactor).is_ok()
    }

    pub(crate) fn set_listeners(&self, bound: Vec<(ListenerKind, SocketAddr)>) {
        let _ = self.listeners.set(bound);
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.registry.get().is_some()
    }

    pub(crate) fn registry(&self) -> Option<&ActorRegistry> {
        self.registry.get()
    }

    pub(crate) fn reactor(&self) -> Option<&ReactorHandle> {
        self.reactor.get()
    }

    pub(crate) fn listeners(&self) -> &[(ListenerKind, SocketAddr)] {
        self.listeners.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn listener_kind(&self, addr: SocketAddr) -> Option<&ListenerKind> {
        self.listeners()
            .iter()
            .find(|(_, bound)| *bound == addr)
            .map(|(kind, _)| kind)
    }

    /// Locally hosted business actors; the proxy is never local in this sense
    pub(crate) fn is_local(&self, id: ActorId) -> bool {
        !id.is_proxy() && self.registry().is_some_and(|r| r.contains(id))
    }

    pub(crate) fn local_actor_ids(&self) -> Vec<ActorId> {
        self.registry()
            .map(|r| r.ids().iter().copied().filter(|id| !id.is_proxy()).collect())
            .unwrap_or_default()
    }

    /// Enqueue into a registered mailbox
    pub(crate) fn push(&self, dest: ActorId, msg: Message) -> Result<(), DeliveryError> {
        if !self.is_running() {
            return Err(DeliveryError::NotRunning);
        }
        let cell = self
            .registry()
            .and_then(|r| r.get(dest))
            .ok_or(DeliveryError::ActorNotFound(dest))?;
        cell.mailbox().push(msg);
        Ok(())
    }

    /// Local if hosted here, otherwise handed to the proxy
    pub(crate) fn send<M: WireMessage>(
        &self,
        source: ActorId,
        destination: ActorId,
        session_key: SessionKey,
        message_id: MessageId,
        payload: M,
    ) -> Result<(), DeliveryError> {
        if destination.is_proxy() {
            return Err(DeliveryError::ProxyDestination);
        }
        if self.is_local(destination) {
            let payload: LocalPayload = Box::new(payload);
            self.push(
                destination,
                Message::Local(Envelope::new(source, destination, session_key, message_id, payload)),
            )
        } else {
            let payload: OutboundPayload = Box::new(payload);
            self.forward(Envelope::new(source, destination, session_key, message_id, payload))
        }
    }

    /// In-process only; the payload need not be encodable
    pub(crate) fn send_local<T: Any + Send>(
        &self,
        source: ActorId,
        destination: ActorId,
        session_key: SessionKey,
        message_id: MessageId,
        payload: T,
    ) -> Result<(), DeliveryError> {
        if !self.is_local(destination) {
            return Err(DeliveryError::NotLocal(destination));
        }
        let payload: LocalPayload = Box::new(payload);
        self.push(
            destination,
            Message::Local(Envelope::new(source, destination, session_key, message_id, payload)),
        )
    }

    /// Already-encoded payload, delivered to the wire handler table
    pub(crate) fn send_wire(
        &self,
        source: ActorId,
        destination: ActorId,
        session_key: SessionKey,
        message_id: MessageId,
        payload: Bytes,
    ) -> Result<(), DeliveryError> {
        if destination.is_proxy() {
            return Err(DeliveryError::ProxyDestination);
        }
        if self.is_local(destination) {
            self.push(
                destination,
                Message::Wire(Envelope::new(source, destination, session_key, message_id, payload)),
            )
        } else {
            let payload: OutboundPayload = Box::new(RawPayload(payload));
            self.forward(Envelope::new(source, destination, session_key, message_id, payload))
        }
    }

    fn forward(&self, envelope: Envelope<OutboundPayload>) -> Result<(), DeliveryError> {
        trace!(
            source = %envelope.source,
            destination = %envelope.destination,
            message_id = envelope.message_id,
            "Routing through proxy"
        );
        self.push(ActorId::PROXY, Message::ToProxy(envelope))
    }

    pub(crate) fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            messages_processed: self.counters.processed.load(Ordering::Relaxed),
            messages_dropped: self.counters.dropped.load(Ordering::Relaxed),
            handler_panics: self.counters.panics.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle for sending into a running dispatcher from any thread
#[derive(Clone)]
pub struct RuntimeHandle {
    pub(crate) shared: Arc<RuntimeShared>,
}

impl RuntimeHandle {
    pub(crate) fn new(shared: Arc<RuntimeShared>) -> Self {
        Self { shared }
    }

    pub fn send<M: WireMessage>(
        &self,
        source: ActorId,
        destination: ActorId,
        message_id: MessageId,
        payload: M,
    ) -> Result<(), DeliveryError> {
        self.shared.send(source, destination, 0, message_id, payload)
    }

    pub fn send_with_key<M: WireMessage>(
        &self,
        source: ActorId,
        destination: ActorId,
        session_key: SessionKey,
        message_id: MessageId,
        payload: M,
    ) -> Result<(), DeliveryError> {
        self.shared
            .send(source, destination, session_key, message_id, payload)
    }

    pub fn send_local<T: Any + Send>(
        &self,
        source: ActorId,
        destination: ActorId,
        message_id: MessageId,
        payload: T,
    ) -> Result<(), DeliveryError> {
        self.shared
            .send_local(source, destination, 0, message_id, payload)
    }

    pub fn send_wire(
        &self,
        source: ActorId,
        destination: ActorId,
        message_id: MessageId,
        payload: Bytes,
    ) -> Result<(), DeliveryError> {
        self.shared
            .send_wire(source, destination, 0, message_id, payload)
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_local(&self, id: ActorId) -> bool {
        self.shared.is_local(id)
    }

    pub fn local_actor_ids(&self) -> Vec<ActorId> {
        self.shared.local_actor_ids()
    }

    pub fn reactor(&self) -> Option<ReactorHandle> {
        self.shared.reactor().cloned()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.shared.stats()
    }

    pub(crate) fn push(&self, dest: ActorId, msg: Message) -> Result<(), DeliveryError> {
        self.shared.push(dest, msg)
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("running", &self.shared.is_running())
            .finish()
    }
}
