//! Type-erased actor: a service, its mailbox and its dispatch tables.

use crate::context::Context;
use crate::dispatch::Handlers;
use crate::error::DeliveryError;
use crate::mailbox::Mailbox;
use crate::message::Message;
use crate::runtime::RuntimeShared;
use crate::service::Service;
use parking_lot::Mutex;
use std::any::type_name;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};
use types::ActorId;

pub(crate) trait ActorCell: Send + Sync {
    fn id(&self) -> ActorId;
    fn mailbox(&self) -> &Mailbox;
    fn type_name(&self) -> &'static str;
    fn init(&self, shared: &Arc<RuntimeShared>) -> anyhow::Result<()>;
    fn cycle_period(&self) -> Option<Duration>;
    fn destroy_priority(&self) -> u32;
    /// Destroy delivered and the service reports done. Never blocks.
    fn is_destroy_completed(&self) -> bool;
    /// Drain and process one batch; called by the worker holding the token
    fn run(&self, shared: &Arc<RuntimeShared>, batch: &mut Vec<Message>);
}

struct ActorState<S> {
    service: S,
    destroyed: bool,
}

pub(crate) struct Actor<S: Service> {
    id: ActorId,
    mailbox: Mailbox,
    /// Read once at registration so shutdown never waits on a busy actor
    cycle_period: Option<Duration>,
    destroy_priority: u32,
    state: Mutex<ActorState<S>>,
    handlers: Handlers<S>,
}

impl<S: Service> Actor<S> {
    pub(crate) fn new(id: ActorId, service: S, handlers: Handlers<S>, mailbox: Mailbox) -> Self {
        let cycle_period = service.cycle_period().filter(|period| !period.is_zero());
        let destroy_priority = service.destroy_priority();
        Self {
            id,
            mailbox,
            cycle_period,
            destroy_priority,
            state: Mutex::new(ActorState {
                service,
                destroyed: false,
            }),
            handlers,
        }
    }

    fn process(&self, state: &mut ActorState<S>, shared: &Arc<RuntimeShared>, msg: Message) {
        if state.destroyed && !msg.survives_destroy() {
            debug!(actor_id = %self.id, kind = msg.kind(), "Dropping message for destroyed actor");
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let kind = msg.kind();
        let message_id = msg.message_id();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch(state, shared, msg)));
        match outcome {
            Ok(Ok(())) => {
                shared.counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                warn!(
                    actor_id = %self.id,
                    kind,
                    message_id = ?message_id,
                    error = %e,
                    "Message dropped"
                );
                shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    actor_id = %self.id,
                    kind,
                    message_id = ?message_id,
                    reason = %reason,
                    "Handler panicked"
                );
                shared.counters.panics.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn dispatch(
        &self,
        state: &mut ActorState<S>,
        shared: &Arc<RuntimeShared>,
        msg: Message,
    ) -> Result<(), DeliveryError> {
        match msg {
            Message::Cycle(token) => {
                let mut ctx = Context::new(shared, self.id);
                state.service.on_cycle(&mut ctx);
                drop(token);
                Ok(())
            }
            Message::Destroy => {
                debug!(actor_id = %self.id, "Destroying actor");
                let mut ctx = Context::new(shared, self.id);
                state.service.on_destroy(&mut ctx);
                state.destroyed = true;
                Ok(())
            }
            Message::NewConnection {
                listen_addr,
                connection,
            } => {
                let mut ctx = Context::new(shared, self.id);
                state
                    .service
                    .on_new_connection(&mut ctx, listen_addr, connection);
                Ok(())
            }
            Message::Local(env) => {
                trace!(actor_id = %self.id, source = %env.source, message_id = env.message_id, "Local message");
                let mut ctx = Context::for_message(shared, self.id, env.source, env.session_key);
                self.handlers
                    .local
                    .dispatch(env.message_id, &mut state.service, &mut ctx, env.payload)
            }
            Message::Wire(env) => {
                trace!(actor_id = %self.id, source = %env.source, message_id = env.message_id, "Wire message");
                let mut ctx = Context::for_message(shared, self.id, env.source, env.session_key);
                self.handlers
                    .wire
                    .dispatch(env.message_id, &mut state.service, &mut ctx, env.payload)
            }
            Message::ToProxy(env) => {
                let mut ctx = Context::for_message(shared, self.id, env.source, env.session_key);
                state.service.on_forward(&mut ctx, env)
            }
        }
    }
}

impl<S: Service> ActorCell for Actor<S> {
    fn id(&self) -> ActorId {
        self.id
    }

    fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    fn type_name(&self) -> &'static str {
        type_name::<S>()
    }

    fn init(&self, shared: &Arc<RuntimeShared>) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let mut ctx = Context::new(shared, self.id);
        state.service.init(&mut ctx)
    }

    fn cycle_period(&self) -> Option<Duration> {
        self.cycle_period
    }

    fn destroy_priority(&self) -> u32 {
        self.destroy_priority
    }

    fn is_destroy_completed(&self) -> bool {
        self.state
            .try_lock()
            .is_some_and(|state| state.destroyed && state.service.is_destroy_completed())
    }

    fn run(&self, shared: &Arc<RuntimeShared>, batch: &mut Vec<Message>) {
        if self.mailbox.pop_all(batch) {
            let mut state = self.state.lock();
            for msg in batch.drain(..) {
                self.process(&mut state, shared, msg);
            }
        }
        self.mailbox.end_run(batch);
    }
}
