//! # Shared Runtime Identifiers
//!
//! Plain data types shared by every crate of the runtime:
//!
//! - [`ActorId`]: process-wide actor identity. Id `0` is reserved for the
//!   proxy actor that bridges messages to peer processes.
//! - [`SessionId`]: slot index of a peer session inside the proxy pool.
//! - [`MessageId`] / [`SessionKey`]: per-message dispatch metadata.
//!
//! This crate deliberately carries no behaviour beyond formatting and
//! conversions so that the codec, transport and runtime crates can all
//! depend on it without cycles.

pub mod ids;
pub mod time;

pub use ids::{ActorId, MessageId, SessionId, SessionKey};
pub use time::unix_timestamp_secs;
