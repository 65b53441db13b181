//! Messages delivered through actor mailboxes.

use bytes::Bytes;
use codec::{Decode, Encode};
use network::PendingConnection;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use types::{ActorId, MessageId, SessionKey};

/// In-process payload, never serialized
pub type LocalPayload = Box<dyn Any + Send>;

/// Payload that will be encoded when it leaves the process
pub type OutboundPayload = Box<dyn Encode + Send>;

/// A typed payload that can travel either in-process or over a session
pub trait WireMessage: Encode + Decode + Any + Send {}

impl<T: Encode + Decode + Any + Send> WireMessage for T {}

/// Routing metadata plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<P> {
    pub source: ActorId,
    pub destination: ActorId,
    pub session_key: SessionKey,
    pub message_id: MessageId,
    pub payload: P,
}

impl<P> Envelope<P> {
    pub fn new(
        source: ActorId,
        destination: ActorId,
        session_key: SessionKey,
        message_id: MessageId,
        payload: P,
    ) -> Self {
        Self {
            source,
            destination,
            session_key,
            message_id,
            payload,
        }
    }
}

/// Periodic tick for one actor.
///
/// Holds the actor's cycle lock; the lock is released when the token is
/// dropped, whether the tick ran, was discarded or its handler panicked.
#[derive(Debug)]
pub struct CycleToken {
    actor: ActorId,
    period: Duration,
    lock: Arc<AtomicBool>,
}

impl CycleToken {
    pub(crate) fn new(actor: ActorId, period: Duration, lock: Arc<AtomicBool>) -> Self {
        Self {
            actor,
            period,
            lock,
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for CycleToken {
    fn drop(&mut self) {
        self.lock.store(false, Ordering::Release);
    }
}

pub enum Message {
    Cycle(CycleToken),
    Destroy,
    NewConnection {
        listen_addr: SocketAddr,
        connection: PendingConnection,
    },
    Local(Envelope<LocalPayload>),
    Wire(Envelope<Bytes>),
    ToProxy(Envelope<OutboundPayload>),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Cycle(_) => "cycle",
            Message::Destroy => "destroy",
            Message::NewConnection { .. } => "new_connection",
            Message::Local(_) => "local",
            Message::Wire(_) => "wire",
            Message::ToProxy(_) => "to_proxy",
        }
    }

    /// Variants still delivered after the actor is destroyed
    pub fn survives_destroy(&self) -> bool {
        matches!(self, Message::Local(_) | Message::Wire(_))
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Local(env) => Some(env.message_id),
            Message::Wire(env) => Some(env.message_id),
            Message::ToProxy(env) => Some(env.message_id),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Cycle(token) => f.debug_tuple("Cycle").field(&token.actor).finish(),
            Message::Destroy => f.write_str("Destroy"),
            Message::NewConnection { listen_addr, connection } => f
                .debug_struct("NewConnection")
                .field("listen_addr", listen_addr)
                .field("peer", &connection.peer_addr())
                .finish(),
            Message::Local(env) => f
                .debug_struct("Local")
                .field("source", &env.source)
                .field("destination", &env.destination)
                .field("message_id", &env.message_id)
                .finish(),
            Message::Wire(env) => f
                .debug_struct("Wire")
                .field("source", &env.source)
                .field("destination", &env.destination)
                .field("message_id", &env.message_id)
                .field("len", &env.payload.len())
                .finish(),
            Message::ToProxy(env) => f
                .debug_struct("ToProxy")
                .field("source", &env.source)
                .field("destination", &env.destination)
                .field("message_id", &env.message_id)
                .finish(),
        }
    }
}
