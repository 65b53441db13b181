//! # Skein Network Transport
//!
//! ## Purpose
//!
//! The asynchronous TCP collaborator the actor runtime is built on: one
//! reactor thread, connections and listeners reporting through callback
//! monitors, and one-shot timers.
//!
//! ## Integration Points
//!
//! - **Reactor**: run by the dispatcher's IO thread, which also fires
//!   periodic actor ticks between IO wake-ups
//! - **Monitors**: implemented by the proxy actor; they only enqueue
//!   messages, so no session state is touched on the IO thread
//! - **Framing**: left to the caller, `on_received` reports how many bytes
//!   it consumed
//!
//! ## Architecture Role
//!
//! ```text
//! libs/actors (dispatcher, proxy) → [network] → tokio TCP
//!            ↑                          ↓
//!   ConnectionMonitor / ListenerMonitor callbacks
//! ```

pub mod connection;
pub mod error;
pub mod listener;
pub mod reactor;

pub use connection::{Connection, ConnectionMonitor, PendingConnection};
pub use error::{Result, TransportError};
pub use listener::{ListenerHandle, ListenerMonitor};
pub use reactor::{Reactor, ReactorHandle, TimerHandle};
