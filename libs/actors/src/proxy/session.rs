//! Peer sessions and the bounded pool that owns them.

use network::{Connection, TimerHandle};
use std::net::SocketAddr;
use std::time::Instant;
use types::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// We dial `addr` and redial after failures
    Outbound { addr: SocketAddr },
    /// Accepted from a listener; discarded on failure
    Inbound { peer: SocketAddr, admin: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    WaitConnect,
    Connecting,
    /// Outbound, handshake sent, waiting for the ack
    Authenticating,
    /// Inbound, waiting for the peer's handshake
    AwaitingPeerAuth,
    Running,
}

impl SessionState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SessionState::WaitConnect => "wait_connect",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::AwaitingPeerAuth => "awaiting_peer_auth",
            SessionState::Running => "running",
        }
    }

    /// States with a live socket that can go quiet
    pub(crate) fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::Authenticating | SessionState::AwaitingPeerAuth | SessionState::Running
        )
    }
}

pub(crate) struct PeerSession {
    pub direction: Direction,
    pub state: SessionState,
    pub connection: Option<Connection>,
    /// Bumped on every new socket; events carrying an older value are stale
    pub generation: u64,
    pub last_heard: Instant,
    pub reconnect_timer: Option<TimerHandle>,
}

impl PeerSession {
    pub(crate) fn outbound(addr: SocketAddr) -> Self {
        Self {
            direction: Direction::Outbound { addr },
            state: SessionState::WaitConnect,
            connection: None,
            generation: 0,
            last_heard: Instant::now(),
            reconnect_timer: None,
        }
    }

    pub(crate) fn inbound(peer: SocketAddr, admin: bool) -> Self {
        Self {
            direction: Direction::Inbound { peer, admin },
            state: SessionState::AwaitingPeerAuth,
            connection: None,
            generation: 0,
            last_heard: Instant::now(),
            reconnect_timer: None,
        }
    }

    pub(crate) fn is_outbound(&self) -> bool {
        matches!(self.direction, Direction::Outbound { .. })
    }

    pub(crate) fn is_admin(&self) -> bool {
        matches!(self.direction, Direction::Inbound { admin: true, .. })
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        match self.direction {
            Direction::Outbound { addr } => addr,
            Direction::Inbound { peer, .. } => peer,
        }
    }

    /// Close the socket and cancel any pending redial
    pub(crate) fn shutdown(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
        }
        if let Some(connection) = &self.connection {
            connection.close();
        }
    }
}

/// Fixed number of slots; freed ids are reused lowest first
pub(crate) struct SessionPool {
    slots: Vec<Option<PeerSession>>,
    free: Vec<SessionId>,
}

impl SessionPool {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let free = (0..capacity as u32).rev().map(SessionId::new).collect();
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free,
        }
    }

    /// `None` when every slot is taken
    pub(crate) fn insert(&mut self, session: PeerSession) -> Option<SessionId> {
        let id = self.free.pop()?;
        self.slots[id.index()] = Some(session);
        Some(id)
    }

    pub(crate) fn get_mut(&mut self, id: SessionId) -> Option<&mut PeerSession> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, id: SessionId) -> Option<PeerSession> {
        let session = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id);
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        Some(session)
    }

    pub(crate) fn ids(&self) -> Vec<SessionId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| SessionId::new(index as u32))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
