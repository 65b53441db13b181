//! Execution context handed to every hook and handler.

use crate::error::DeliveryError;
use crate::listeners::ListenerKind;
use crate::message::{Message, WireMessage};
use crate::runtime::{RuntimeHandle, RuntimeShared};
use bytes::Bytes;
use network::ReactorHandle;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use types::{ActorId, MessageId, SessionKey};

/// Who is running and on whose behalf.
///
/// `last_sender` and `session_key` are only set while a `Local` or `Wire`
/// handler runs; lifecycle hooks see `None` and `0`.
pub struct Context<'a> {
    shared: &'a Arc<RuntimeShared>,
    actor_id: ActorId,
    last_sender: Option<ActorId>,
    session_key: SessionKey,
}

impl<'a> Context<'a> {
    pub(crate) fn new(shared: &'a Arc<RuntimeShared>, actor_id: ActorId) -> Self {
        Self {
            shared,
            actor_id,
            last_sender: None,
            session_key: 0,
        }
    }

    pub(crate) fn for_message(
        shared: &'a Arc<RuntimeShared>,
        actor_id: ActorId,
        sender: ActorId,
        session_key: SessionKey,
    ) -> Self {
        Self {
            shared,
            actor_id,
            last_sender: Some(sender),
            session_key,
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn last_sender(&self) -> Option<ActorId> {
        self.last_sender
    }

    pub fn session_key(&self) -> SessionKey {
        self.session_key
    }

    pub fn send<M: WireMessage>(
        &self,
        destination: ActorId,
        message_id: MessageId,
        payload: M,
    ) -> Result<(), DeliveryError> {
        self.shared
            .send(self.actor_id, destination, 0, message_id, payload)
    }

    pub fn send_with_key<M: WireMessage>(
        &self,
        destination: ActorId,
        session_key: SessionKey,
        message_id: MessageId,
        payload: M,
    ) -> Result<(), DeliveryError> {
        self.shared
            .send(self.actor_id, destination, session_key, message_id, payload)
    }

    pub fn send_local<T: Any + Send>(
        &self,
        destination: ActorId,
        message_id: MessageId,
        payload: T,
    ) -> Result<(), DeliveryError> {
        self.shared
            .send_local(self.actor_id, destination, 0, message_id, payload)
    }

    pub fn send_wire(
        &self,
        destination: ActorId,
        message_id: MessageId,
        payload: Bytes,
    ) -> Result<(), DeliveryError> {
        self.shared
            .send_wire(self.actor_id, destination, 0, message_id, payload)
    }

    /// Answer the sender of the message being handled, keeping its session key
    pub fn reply<M: WireMessage>(&self, message_id: MessageId, payload: M) -> Result<(), DeliveryError> {
        let destination = self.last_sender.ok_or(DeliveryError::NoSender)?;
        self.shared
            .send(self.actor_id, destination, self.session_key, message_id, payload)
    }

    pub fn is_local(&self, id: ActorId) -> bool {
        self.shared.is_local(id)
    }

    pub fn local_actor_ids(&self) -> Vec<ActorId> {
        self.shared.local_actor_ids()
    }

    pub fn reactor(&self) -> Option<&ReactorHandle> {
        self.shared.reactor()
    }

    /// What kind of listener is bound at `listen_addr`
    pub fn listener_kind(&self, listen_addr: SocketAddr) -> Option<&ListenerKind> {
        self.shared.listener_kind(listen_addr)
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle::new(self.shared.clone())
    }

    pub(crate) fn deliver(&self, destination: ActorId, msg: Message) -> Result<(), DeliveryError> {
        self.shared.push(destination, msg)
    }
}
