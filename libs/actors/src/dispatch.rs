//! Dispatch tables
//!
//! Each actor owns two tables keyed by [`MessageId`]: one for in-process
//! payloads (`Local`) and one for encoded payloads (`Wire`). A handler is
//! either bound to the actor itself or resolved per message through a
//! lookup on the message's session key.
//!
//! ```rust,ignore
//! fn connection(gw: &mut Gateway, key: SessionKey) -> Option<&mut Client> {
//!     gw.clients.get_mut(&key)
//! }
//!
//! handlers
//!     .on_message(LOGIN, |gw: &mut Gateway, ctx: &mut Context<'_>, req: Login| gw.login(ctx, req))?
//!     .on_wire_keyed(CHAT, connection, |client: &mut Client, _ctx: &mut Context<'_>, text: String| {
//!         client.push(text)
//!     })?;
//! ```

use crate::context::Context;
use crate::error::{DeliveryError, RuntimeError};
use crate::message::{LocalPayload, WireMessage};
use bytes::Bytes;
use codec::{from_bytes, Decode};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use types::{MessageId, SessionKey};

/// One registered handler for payloads of type `P`
pub trait Handler<S, P>: Send + Sync {
    fn handle(&self, service: &mut S, ctx: &mut Context<'_>, payload: P) -> Result<(), DeliveryError>;
}

/// Resolves the sub-object a keyed message is addressed to
pub type KeyLookup<S, T> = fn(&mut S, SessionKey) -> Option<&mut T>;

pub struct DispatchTable<S, P> {
    handlers: HashMap<MessageId, Box<dyn Handler<S, P>>>,
}

impl<S, P> Default for DispatchTable<S, P> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S, P> DispatchTable<S, P> {
    pub fn register(
        &mut self,
        message_id: MessageId,
        handler: Box<dyn Handler<S, P>>,
    ) -> Result<(), RuntimeError> {
        if self.handlers.contains_key(&message_id) {
            return Err(RuntimeError::DuplicateHandler(message_id));
        }
        self.handlers.insert(message_id, handler);
        Ok(())
    }

    pub fn contains(&self, message_id: MessageId) -> bool {
        self.handlers.contains_key(&message_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn dispatch(
        &self,
        message_id: MessageId,
        service: &mut S,
        ctx: &mut Context<'_>,
        payload: P,
    ) -> Result<(), DeliveryError> {
        let handler = self
            .handlers
            .get(&message_id)
            .ok_or(DeliveryError::NoHandler { message_id })?;
        handler.handle(service, ctx, payload)
    }
}

fn downcast<M: Any>(payload: LocalPayload) -> Result<M, DeliveryError> {
    payload
        .downcast::<M>()
        .map(|boxed| *boxed)
        .map_err(|_| DeliveryError::PayloadType {
            expected: type_name::<M>(),
        })
}

/// Handler invoked on the actor itself
struct Bound<M, F> {
    f: Arc<F>,
    _payload: PhantomData<fn() -> M>,
}

impl<M, F> Bound<M, F> {
    fn new(f: Arc<F>) -> Self {
        Self {
            f,
            _payload: PhantomData,
        }
    }
}

impl<S, M, F> Handler<S, LocalPayload> for Bound<M, F>
where
    M: Any + Send,
    F: Fn(&mut S, &mut Context<'_>, M) + Send + Sync,
{
    fn handle(&self, service: &mut S, ctx: &mut Context<'_>, payload: LocalPayload) -> Result<(), DeliveryError> {
        let msg = downcast::<M>(payload)?;
        (*self.f)(service, ctx, msg);
        Ok(())
    }
}

impl<S, M, F> Handler<S, Bytes> for Bound<M, F>
where
    M: Decode,
    F: Fn(&mut S, &mut Context<'_>, M) + Send + Sync,
{
    fn handle(&self, service: &mut S, ctx: &mut Context<'_>, payload: Bytes) -> Result<(), DeliveryError> {
        let msg = from_bytes::<M>(&payload)?;
        (*self.f)(service, ctx, msg);
        Ok(())
    }
}

/// Handler invoked on the object the session key resolves to
struct Keyed<S, T, M, F> {
    lookup: KeyLookup<S, T>,
    f: Arc<F>,
    _payload: PhantomData<fn() -> M>,
}

impl<S, T, M, F> Keyed<S, T, M, F> {
    fn new(lookup: KeyLookup<S, T>, f: Arc<F>) -> Self {
        Self {
            lookup,
            f,
            _payload: PhantomData,
        }
    }

    fn target<'s>(&self, service: &'s mut S, key: SessionKey) -> Result<&'s mut T, DeliveryError> {
        (self.lookup)(service, key).ok_or(DeliveryError::KeyNotFound { key })
    }
}

impl<S, T, M, F> Handler<S, LocalPayload> for Keyed<S, T, M, F>
where
    M: Any + Send,
    F: Fn(&mut T, &mut Context<'_>, M) + Send + Sync,
{
    fn handle(&self, service: &mut S, ctx: &mut Context<'_>, payload: LocalPayload) -> Result<(), DeliveryError> {
        let msg = downcast::<M>(payload)?;
        let target = self.target(service, ctx.session_key())?;
        (*self.f)(target, ctx, msg);
        Ok(())
    }
}

impl<S, T, M, F> Handler<S, Bytes> for Keyed<S, T, M, F>
where
    M: Decode,
    F: Fn(&mut T, &mut Context<'_>, M) + Send + Sync,
{
    fn handle(&self, service: &mut S, ctx: &mut Context<'_>, payload: Bytes) -> Result<(), DeliveryError> {
        let msg = from_bytes::<M>(&payload)?;
        let target = self.target(service, ctx.session_key())?;
        (*self.f)(target, ctx, msg);
        Ok(())
    }
}

/// Registration facade over an actor's two tables
pub struct Handlers<S> {
    pub(crate) local: DispatchTable<S, LocalPayload>,
    pub(crate) wire: DispatchTable<S, Bytes>,
}

impl<S> Default for Handlers<S> {
    fn default() -> Self {
        Self {
            local: DispatchTable::default(),
            wire: DispatchTable::default(),
        }
    }
}

impl<S: 'static> Handlers<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-process payloads of type `M`
    pub fn on_local<M, F>(&mut self, message_id: MessageId, f: F) -> Result<&mut Self, RuntimeError>
    where
        M: Any + Send,
        F: Fn(&mut S, &mut Context<'_>, M) + Send + Sync + 'static,
    {
        self.local
            .register(message_id, Box::new(Bound::<M, F>::new(Arc::new(f))))?;
        Ok(self)
    }

    /// Encoded payloads, decoded as `M` before the call
    pub fn on_wire<M, F>(&mut self, message_id: MessageId, f: F) -> Result<&mut Self, RuntimeError>
    where
        M: Decode + 'static,
        F: Fn(&mut S, &mut Context<'_>, M) + Send + Sync + 'static,
    {
        self.wire
            .register(message_id, Box::new(Bound::<M, F>::new(Arc::new(f))))?;
        Ok(self)
    }

    /// One closure for both tables, so the sender need not know where the
    /// actor lives
    pub fn on_message<M, F>(&mut self, message_id: MessageId, f: F) -> Result<&mut Self, RuntimeError>
    where
        M: WireMessage,
        F: Fn(&mut S, &mut Context<'_>, M) + Send + Sync + 'static,
    {
        self.ensure_free(message_id)?;
        let f = Arc::new(f);
        self.local
            .register(message_id, Box::new(Bound::<M, F>::new(f.clone())))?;
        self.wire
            .register(message_id, Box::new(Bound::<M, F>::new(f)))?;
        Ok(self)
    }

    pub fn on_local_keyed<T, M, F>(
        &mut self,
        message_id: MessageId,
        lookup: KeyLookup<S, T>,
        f: F,
    ) -> Result<&mut Self, RuntimeError>
    where
        T: 'static,
        M: Any + Send,
        F: Fn(&mut T, &mut Context<'_>, M) + Send + Sync + 'static,
    {
        self.local.register(
            message_id,
            Box::new(Keyed::<S, T, M, F>::new(lookup, Arc::new(f))),
        )?;
        Ok(self)
    }

    pub fn on_wire_keyed<T, M, F>(
        &mut self,
        message_id: MessageId,
        lookup: KeyLookup<S, T>,
        f: F,
    ) -> Result<&mut Self, RuntimeError>
    where
        T: 'static,
        M: Decode + 'static,
        F: Fn(&mut T, &mut Context<'_>, M) + Send + Sync + 'static,
    {
        self.wire.register(
            message_id,
            Box::new(Keyed::<S, T, M, F>::new(lookup, Arc::new(f))),
        )?;
        Ok(self)
    }

    fn ensure_free(&self, message_id: MessageId) -> Result<(), RuntimeError> {
        if self.local.contains(message_id) || self.wire.contains(message_id) {
            return Err(RuntimeError::DuplicateHandler(message_id));
        }
        Ok(())
    }
}
