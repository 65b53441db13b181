//! # Skein Actor Runtime
//!
//! ## Purpose
//!
//! Process-local actors scheduled on a fixed worker pool, with a built-in
//! proxy actor that carries messages to actors hosted by peer processes.
//! A sender never needs to know where its destination lives.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐        ┌───────────────────────────┐
//! │         Dispatcher           │        │       Proxy (id 0)        │
//! │                              │        │                           │
//! │  send(dest) ──local?──► Mailbox ──►   │  route table + cache      │
//! │      │                       │  ToProxy│  peer sessions ──► TCP   │
//! │      └──remote──────────────────────► │  handshake / heartbeat    │
//! │                              │        └───────────────────────────┘
//! │  workers: runnable queue     │
//! │  io thread: reactor + cycles │
//! └──────────────────────────────┘
//! ```
//!
//! - **Mailbox**: single-flight. At most one worker runs an actor at a time
//!   and messages are handled in arrival order.
//! - **Dispatch tables**: handlers keyed by message id, for in-process
//!   payloads and for encoded payloads from peers.
//! - **Proxy**: authenticates peers with a shared-secret handshake, binds
//!   the actor ids each peer carries, and buffers frames for ids with no
//!   running session.
//!
//! ## Example
//!
//! ```rust,no_run
//! use actors::{Context, Dispatcher, Handlers, RuntimeError, Service};
//! use node_config::{ProxyConfig, ShutdownConfig};
//! use types::ActorId;
//!
//! const PING: u16 = 1;
//!
//! struct Echo;
//!
//! impl Service for Echo {
//!     fn register_handlers(&self, handlers: &mut Handlers<Self>) -> Result<(), RuntimeError> {
//!         handlers.on_message(PING, |_: &mut Echo, ctx: &mut Context<'_>, text: String| {
//!             let _ = ctx.reply(PING, text);
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! let mut dispatcher = Dispatcher::new(ProxyConfig::default(), ShutdownConfig::default());
//! dispatcher.register_actor(ActorId::new(1), Echo)?;
//! dispatcher.start(4)?;
//! dispatcher.send(ActorId::new(2), ActorId::new(1), PING, "hello".to_string()).ok();
//! dispatcher.stop();
//! # Ok::<(), RuntimeError>(())
//! ```

mod cell;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod listeners;
pub mod mailbox;
pub mod message;
mod proxy;
mod registry;
mod runtime;
pub mod service;
pub mod system;
mod timer;

pub use context::Context;
pub use dispatch::{DispatchTable, Handler, Handlers, KeyLookup};
pub use error::{DeliveryError, Result, RuntimeError};
pub use listeners::ListenerKind;
pub use mailbox::{Mailbox, MailboxState};
pub use message::{CycleToken, Envelope, LocalPayload, Message, OutboundPayload, WireMessage};
pub use registry::FAST_SLOTS;
pub use runtime::{RuntimeHandle, RuntimeStats};
pub use service::Service;
pub use system::Dispatcher;

pub use node_config::Distribution;
