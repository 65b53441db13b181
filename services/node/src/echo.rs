//! Demo actor: answers every text message with the same text.

use actors::{Context, Handlers, RuntimeError, Service};
use std::time::Duration;
use tracing::{debug, info};
use types::MessageId;

pub const ECHO: MessageId = 1;

const REPORT_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
pub struct EchoService {
    echoed: u64,
}

impl EchoService {
    fn on_echo(&mut self, ctx: &mut Context<'_>, text: String) {
        debug!(actor_id = %ctx.actor_id(), sender = ?ctx.last_sender(), len = text.len(), "Echo");
        self.echoed += 1;
        if let Err(e) = ctx.reply(ECHO, text) {
            debug!(actor_id = %ctx.actor_id(), error = %e, "Echo reply not sent");
        }
    }
}

impl Service for EchoService {
    fn register_handlers(&self, handlers: &mut Handlers<Self>) -> Result<(), RuntimeError> {
        handlers.on_message(ECHO, Self::on_echo)?;
        Ok(())
    }

    fn cycle_period(&self) -> Option<Duration> {
        Some(REPORT_PERIOD)
    }

    fn on_cycle(&mut self, ctx: &mut Context<'_>) {
        info!(actor_id = %ctx.actor_id(), echoed = self.echoed, "Echo actor alive");
    }
}
