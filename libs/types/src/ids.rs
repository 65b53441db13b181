//! Actor, session and message identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Small integer selecting a handler inside an actor's dispatch table
pub type MessageId = u16;

/// Opaque key routed alongside a message, used to pick a sub-object of the
/// receiving actor (for example one accepted connection among many)
pub type SessionKey = u64;

/// Unique actor identifier
///
/// Ids are positive integers; [`ActorId::PROXY`] (`0`) is owned by the
/// runtime and never handed to a business actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(u32);

impl ActorId {
    /// The reserved id of the proxy actor
    pub const PROXY: ActorId = ActorId(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_proxy(self) -> bool {
        self.0 == 0
    }

    /// Index into dense lookup tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

impl From<u32> for ActorId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<ActorId> for u32 {
    fn from(id: ActorId) -> Self {
        id.0
    }
}

/// Slot of a peer session in the proxy's bounded session pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Session key of proxy-internal events. Offset by one so that key 0,
    /// which wire messages carry, never names a session.
    pub const fn as_key(self) -> SessionKey {
        self.0 as SessionKey + 1
    }

    pub fn from_key(key: SessionKey) -> Option<Self> {
        let slot = key.checked_sub(1)?;
        u32::try_from(slot).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}
