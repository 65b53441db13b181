//! Connection callbacks turned into proxy mailbox messages.
//!
//! Monitors run on the IO thread and never touch session state. Each
//! callback becomes a `Local` message to the proxy whose session key is the
//! session slot, tagged with the connection generation so that events from
//! a superseded socket can be told apart.

use crate::message::{Envelope, LocalPayload, Message};
use crate::runtime::RuntimeHandle;
use codec::{split_frames, Frame};
use network::{ConnectionMonitor, TransportError};
use tracing::trace;
use types::{ActorId, MessageId, SessionId};

pub(crate) const EVT_CONNECTED: MessageId = 0xFF01;
pub(crate) const EVT_FRAMES: MessageId = 0xFF02;
pub(crate) const EVT_CLOSED: MessageId = 0xFF03;
pub(crate) const EVT_RECONNECT: MessageId = 0xFF04;

/// What the proxy keeps of a transport error once it leaves the IO thread
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub category: &'static str,
    pub retryable: bool,
    pub message: String,
}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Self {
        Self {
            category: error.category(),
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Connected {
    pub generation: u64,
    pub error: Option<Failure>,
}

#[derive(Debug)]
pub(crate) struct Frames {
    pub generation: u64,
    pub frames: Vec<Frame>,
}

#[derive(Debug)]
pub(crate) struct Closed {
    pub generation: u64,
    pub self_initiated: bool,
    pub error: Option<Failure>,
}

#[derive(Debug)]
pub(crate) struct ReconnectDue {
    pub generation: u64,
}

/// Enqueue an event for the proxy on behalf of `session`
pub(crate) fn notify<T: Send + 'static>(
    handle: &RuntimeHandle,
    session: SessionId,
    message_id: MessageId,
    event: T,
) {
    let payload: LocalPayload = Box::new(event);
    let envelope = Envelope::new(
        ActorId::PROXY,
        ActorId::PROXY,
        session.as_key(),
        message_id,
        payload,
    );
    if let Err(e) = handle.push(ActorId::PROXY, Message::Local(envelope)) {
        trace!(session = %session, message_id, error = %e, "Session event dropped");
    }
}

pub(crate) struct SessionMonitor {
    handle: RuntimeHandle,
    session: SessionId,
    generation: u64,
}

impl SessionMonitor {
    pub(crate) fn new(handle: RuntimeHandle, session: SessionId, generation: u64) -> Self {
        Self {
            handle,
            session,
            generation,
        }
    }
}

impl ConnectionMonitor for SessionMonitor {
    fn on_connected(&self, result: network::Result<()>) {
        let event = Connected {
            generation: self.generation,
            error: result.err().map(Failure::from),
        };
        notify(&self.handle, self.session, EVT_CONNECTED, event);
    }

    fn on_received(&self, data: &[u8]) -> usize {
        let (frames, consumed) = split_frames(data);
        if !frames.is_empty() {
            let event = Frames {
                generation: self.generation,
                frames,
            };
            notify(&self.handle, self.session, EVT_FRAMES, event);
        }
        consumed
    }

    fn on_closed(&self, self_initiated: bool, error: Option<TransportError>) {
        let event = Closed {
            generation: self.generation,
            self_initiated,
            error: error.map(Failure::from),
        };
        notify(&self.handle, self.session, EVT_CLOSED, event);
    }
}
