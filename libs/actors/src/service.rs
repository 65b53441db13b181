//! The trait every actor implements.

use crate::context::Context;
use crate::dispatch::Handlers;
use crate::error::{DeliveryError, RuntimeError};
use crate::message::{Envelope, OutboundPayload};
use network::PendingConnection;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

/// An independently scheduled unit of state and behaviour.
///
/// All hooks run on a worker thread inside the actor's single-flight turn,
/// so `&mut self` is never shared.
pub trait Service: Send + Sized + 'static {
    /// Called once at registration
    fn register_handlers(&self, handlers: &mut Handlers<Self>) -> Result<(), RuntimeError> {
        let _ = handlers;
        Ok(())
    }

    /// Called during `Dispatcher::start`, in ascending id order. An error
    /// aborts the start.
    fn init(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Tick period, read once at registration; `None` or zero disables ticks
    fn cycle_period(&self) -> Option<Duration> {
        None
    }

    fn on_cycle(&mut self, ctx: &mut Context<'_>) {
        let _ = ctx;
    }

    fn on_destroy(&mut self, ctx: &mut Context<'_>) {
        let _ = ctx;
    }

    /// Polled during shutdown after `on_destroy` has run
    fn is_destroy_completed(&self) -> bool {
        true
    }

    /// Lower priorities are destroyed first. Read once at registration.
    fn destroy_priority(&self) -> u32 {
        0
    }

    /// A socket accepted on a custom listener that chose this actor
    fn on_new_connection(
        &mut self,
        ctx: &mut Context<'_>,
        listen_addr: SocketAddr,
        connection: PendingConnection,
    ) {
        warn!(
            actor_id = %ctx.actor_id(),
            listen_addr = %listen_addr,
            peer = %connection.peer_addr(),
            "Actor does not accept connections, closing"
        );
    }

    /// A message for a remote actor. Only the proxy overrides this.
    fn on_forward(
        &mut self,
        ctx: &mut Context<'_>,
        envelope: Envelope<OutboundPayload>,
    ) -> Result<(), DeliveryError> {
        let _ = (ctx, envelope);
        Err(DeliveryError::Unroutable { kind: "to_proxy" })
    }
}
