//! Proxy Actor
//!
//! The built-in actor at id 0. It owns every peer session, the table of
//! which session carries which remote actor, and the per-id cache of frames
//! for remote actors that no session carries yet.
//!
//! ## Session lifecycle
//!
//! ```text
//! outbound: WaitConnect → Connecting → Authenticating → Running
//!               ↑_____________|_______________|____________|   (failure, after reconnect interval)
//! inbound:  AwaitingPeerAuth → Running                         (failure: session discarded)
//! ```
//!
//! Socket callbacks arrive as messages on the proxy's own mailbox (see
//! [`events`]), so session state only changes inside the proxy's turn.

mod events;
mod routes;
mod session;

use crate::context::Context;
use crate::dispatch::Handlers;
use crate::error::{DeliveryError, RuntimeError};
use crate::listeners::ListenerKind;
use crate::message::{Envelope, Message, OutboundPayload};
use crate::service::Service;
use bytes::Bytes;
use codec::{
    encode_frame, from_bytes, heartbeat_frame, to_bytes, CodecResult, Encode, Frame, Handshake,
    HandshakeAck, ProxyEnvelope,
};
use events::{
    notify, Closed, Connected, Frames, ReconnectDue, SessionMonitor, EVT_CLOSED, EVT_CONNECTED,
    EVT_FRAMES, EVT_RECONNECT,
};
use network::PendingConnection;
use node_config::ProxyConfig;
use routes::RouteTable;
use session::{PeerSession, SessionPool, SessionState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use types::{unix_timestamp_secs, ActorId, SessionId};

pub(crate) struct ProxyService {
    config: ProxyConfig,
    outbound: Vec<SocketAddr>,
    local_ids: Vec<ActorId>,
    sessions: SessionPool,
    routes: RouteTable,
    next_generation: u64,
    shutting_down: bool,
}

fn frame_of<T: Encode>(value: &T) -> CodecResult<Bytes> {
    encode_frame(&to_bytes(value)?)
}

impl ProxyService {
    pub(crate) fn new(config: ProxyConfig, outbound: Vec<SocketAddr>) -> Self {
        let sessions = SessionPool::with_capacity(config.max_sessions);
        let routes = RouteTable::new(config.pending_limit, config.pending_total_limit);
        Self {
            config,
            outbound,
            local_ids: Vec::new(),
            sessions,
            routes,
            next_generation: 0,
            shutting_down: false,
        }
    }

    fn session_of(ctx: &Context<'_>) -> Option<SessionId> {
        SessionId::from_key(ctx.session_key())
    }

    /// The session an event is about, if the event is not stale
    fn current(&mut self, sid: SessionId, generation: u64) -> Option<&mut PeerSession> {
        let session = self.sessions.get_mut(sid)?;
        if session.generation != generation {
            trace!(session = %sid, generation, current = session.generation, "Stale session event");
            return None;
        }
        Some(session)
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn connect(&mut self, ctx: &Context<'_>, sid: SessionId) {
        let Some(reactor) = ctx.reactor().cloned() else {
            return;
        };
        let generation = self.bump_generation();
        let timeout = self.config.connect_timeout();
        let Some(session) = self.sessions.get_mut(sid) else {
            return;
        };
        let addr = session.peer_addr();
        session.state = SessionState::Connecting;
        session.generation = generation;
        session.reconnect_timer = None;
        let monitor = Arc::new(SessionMonitor::new(ctx.handle(), sid, generation));
        session.connection = Some(reactor.connect(addr, timeout, monitor));
        debug!(session = %sid, peer = %addr, generation, "Connecting");
    }

    fn schedule_reconnect(&mut self, ctx: &Context<'_>, sid: SessionId) {
        let interval = self.config.reconnect_interval();
        let handle = ctx.handle();
        let Some(reactor) = ctx.reactor() else {
            return;
        };
        let Some(session) = self.sessions.get_mut(sid) else {
            return;
        };
        session.state = SessionState::WaitConnect;
        session.connection = None;
        let generation = session.generation;
        session.reconnect_timer = Some(reactor.schedule(interval, move || {
            notify(&handle, sid, EVT_RECONNECT, ReconnectDue { generation });
        }));
        info!(
            session = %sid,
            peer = %session.peer_addr(),
            retry_ms = interval.as_millis() as u64,
            "Reconnect scheduled"
        );
    }

    /// Close a session's socket; the Closed event finishes the job
    fn close_session(&mut self, sid: SessionId) {
        if let Some(connection) = self.sessions.get_mut(sid).and_then(|s| s.connection.as_ref()) {
            connection.close();
        }
    }

    /// Remove a session for good, closing whatever is still open
    fn discard_session(&mut self, sid: SessionId) {
        self.routes.unbind_session(sid);
        if let Some(mut session) = self.sessions.remove(sid) {
            session.shutdown();
            debug!(session = %sid, peer = %session.peer_addr(), "Session discarded");
        }
    }

    fn send_on(&mut self, sid: SessionId, frame: Bytes) -> bool {
        match self.sessions.get_mut(sid).and_then(|s| s.connection.as_ref()) {
            Some(connection) => connection.send(frame).is_ok(),
            None => false,
        }
    }

    /// Bind the ids a freshly authenticated peer carries and flush what was
    /// waiting for them
    fn start_session(&mut self, sid: SessionId, remote_ids: &[ActorId]) {
        let flush = self.routes.bind(sid, remote_ids);
        let mut flushed = 0usize;
        let mut requeued = 0usize;
        for (id, mut queue) in flush {
            while let Some(frame) = queue.pop_front() {
                if !self.send_on(sid, frame.clone()) {
                    queue.push_front(frame);
                    break;
                }
                flushed += 1;
            }
            if queue.is_empty() {
                trace!(session = %sid, actor_id = %id, "Pending frames flushed");
            } else {
                requeued += queue.len();
                self.routes.requeue(id, queue);
            }
        }
        if requeued > 0 {
            warn!(session = %sid, requeued, "Session closed while flushing, frames cached again");
        }
        info!(
            session = %sid,
            remote_actors = ?remote_ids,
            flushed,
            "Session running"
        );
    }

    fn on_connected(&mut self, ctx: &mut Context<'_>, event: Connected) {
        let Some(sid) = Self::session_of(ctx) else {
            return;
        };
        let shutting_down = self.shutting_down;
        let Some(session) = self.current(sid, event.generation) else {
            return;
        };
        if session.state != SessionState::Connecting {
            return;
        }
        let peer = session.peer_addr();

        if let Some(error) = event.error {
            if shutting_down || !error.retryable {
                debug!(
                    session = %sid,
                    peer = %peer,
                    category = error.category,
                    error = %error.message,
                    "Connect abandoned"
                );
                self.discard_session(sid);
            } else {
                warn!(
                    session = %sid,
                    peer = %peer,
                    category = error.category,
                    error = %error.message,
                    "Connect failed"
                );
                self.schedule_reconnect(ctx, sid);
            }
            return;
        }

        session.state = SessionState::Authenticating;
        session.last_heard = Instant::now();
        let handshake = Handshake::signed(
            self.local_ids.clone(),
            unix_timestamp_secs(),
            &self.config.secret,
        );
        match frame_of(&handshake) {
            Ok(frame) => {
                debug!(session = %sid, peer = %peer, "Connected, sending handshake");
                self.send_on(sid, frame);
            }
            Err(e) => {
                error!(session = %sid, error = %e, "Cannot encode handshake");
                self.close_session(sid);
            }
        }
    }

    fn on_reconnect_due(&mut self, ctx: &mut Context<'_>, event: ReconnectDue) {
        let Some(sid) = Self::session_of(ctx) else {
            return;
        };
        if self.shutting_down {
            return;
        }
        match self.current(sid, event.generation) {
            Some(session) if session.state == SessionState::WaitConnect => {}
            _ => return,
        }
        self.connect(ctx, sid);
    }

    fn on_frames(&mut self, ctx: &mut Context<'_>, event: Frames) {
        let Some(sid) = Self::session_of(ctx) else {
            return;
        };
        let Some(session) = self.current(sid, event.generation) else {
            return;
        };
        session.last_heard = Instant::now();

        for frame in event.frames {
            let body = match frame {
                Frame::Heartbeat => continue,
                Frame::Body(body) => body,
            };
            if !self.handle_body(ctx, sid, body) {
                break;
            }
        }
    }

    /// One frame body; false once the session should read no further
    fn handle_body(&mut self, ctx: &mut Context<'_>, sid: SessionId, body: Bytes) -> bool {
        let Some(session) = self.sessions.get_mut(sid) else {
            return false;
        };
        let state = session.state;
        match state {
            SessionState::Authenticating => self.handle_ack(sid, &body),
            SessionState::AwaitingPeerAuth => self.handle_handshake(sid, &body),
            SessionState::Running => {
                self.route_inbound(ctx, sid, &body);
                true
            }
            SessionState::WaitConnect | SessionState::Connecting => false,
        }
    }

    fn handle_ack(&mut self, sid: SessionId, body: &[u8]) -> bool {
        let ack = match from_bytes::<HandshakeAck>(body) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(session = %sid, error = %e, "Malformed handshake ack, closing");
                self.close_session(sid);
                return false;
            }
        };
        if !ack.success {
            error!(session = %sid, "Handshake rejected by peer, session removed");
            self.discard_session(sid);
            return false;
        }
        if let Some(session) = self.sessions.get_mut(sid) {
            session.state = SessionState::Running;
        }
        self.start_session(sid, &ack.actor_ids);
        true
    }

    fn handle_handshake(&mut self, sid: SessionId, body: &[u8]) -> bool {
        let handshake = match from_bytes::<Handshake>(body) {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!(session = %sid, error = %e, "Malformed handshake, closing");
                self.close_session(sid);
                return false;
            }
        };
        if !handshake.verify(&self.config.secret) {
            warn!(
                session = %sid,
                remote_actors = ?handshake.actor_ids,
                "Handshake signature mismatch, rejecting"
            );
            if let Ok(frame) = frame_of(&HandshakeAck::rejected()) {
                self.send_on(sid, frame);
            }
            self.close_session(sid);
            return false;
        }

        let ack = HandshakeAck::accepted(self.local_ids.clone());
        match frame_of(&ack) {
            Ok(frame) => {
                self.send_on(sid, frame);
            }
            Err(e) => {
                error!(session = %sid, error = %e, "Cannot encode handshake ack");
                self.close_session(sid);
                return false;
            }
        }

        let admin = match self.sessions.get_mut(sid) {
            Some(session) => {
                session.state = SessionState::Running;
                session.is_admin()
            }
            None => return false,
        };
        if admin {
            info!(session = %sid, "Admin session running");
        } else {
            self.start_session(sid, &handshake.actor_ids);
        }
        true
    }

    fn route_inbound(&mut self, ctx: &mut Context<'_>, sid: SessionId, body: &[u8]) {
        let envelope = match ProxyEnvelope::from_body(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(session = %sid, error = %e, "Malformed routing frame dropped");
                return;
            }
        };
        if !ctx.is_local(envelope.destination) {
            warn!(
                session = %sid,
                source = %envelope.source,
                destination = %envelope.destination,
                "Inbound message for an actor not hosted here, dropped"
            );
            return;
        }
        let destination = envelope.destination;
        let message = Message::Wire(Envelope::new(
            envelope.source,
            destination,
            0,
            envelope.message_id,
            envelope.payload,
        ));
        if let Err(e) = ctx.deliver(destination, message) {
            warn!(session = %sid, destination = %destination, error = %e, "Inbound delivery failed");
        }
    }

    fn on_closed(&mut self, ctx: &mut Context<'_>, event: Closed) {
        let Some(sid) = Self::session_of(ctx) else {
            return;
        };
        let shutting_down = self.shutting_down;
        let Some(session) = self.current(sid, event.generation) else {
            return;
        };
        let outbound = session.is_outbound();
        let peer = session.peer_addr();
        let state = session.state;
        let freed = self.routes.unbind_session(sid);

        match &event.error {
            Some(error) => warn!(
                session = %sid,
                peer = %peer,
                state = state.as_str(),
                category = error.category,
                error = %error.message,
                unbound = freed.len(),
                "Session closed with error"
            ),
            None => info!(
                session = %sid,
                peer = %peer,
                state = state.as_str(),
                self_initiated = event.self_initiated,
                unbound = freed.len(),
                "Session closed"
            ),
        }

        if outbound && !shutting_down {
            self.schedule_reconnect(ctx, sid);
        } else {
            self.discard_session(sid);
        }
    }
}

impl Service for ProxyService {
    fn register_handlers(&self, handlers: &mut Handlers<Self>) -> Result<(), RuntimeError> {
        handlers
            .on_local(EVT_CONNECTED, Self::on_connected)?
            .on_local(EVT_FRAMES, Self::on_frames)?
            .on_local(EVT_CLOSED, Self::on_closed)?
            .on_local(EVT_RECONNECT, Self::on_reconnect_due)?;
        Ok(())
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.local_ids = ctx.local_actor_ids();
        anyhow::ensure!(
            self.outbound.len() <= self.config.max_sessions,
            "{} remote addresses exceed max_sessions {}",
            self.outbound.len(),
            self.config.max_sessions
        );
        if !self.outbound.is_empty() && self.config.secret.is_empty() {
            warn!("Connecting to peers with an empty shared secret");
        }

        for addr in self.outbound.clone() {
            if let Some(sid) = self.sessions.insert(PeerSession::outbound(addr)) {
                self.connect(ctx, sid);
            }
        }
        debug!(
            local_actors = self.local_ids.len(),
            outbound = self.outbound.len(),
            "Proxy initialized"
        );
        Ok(())
    }

    fn cycle_period(&self) -> Option<Duration> {
        self.config
            .open_heartbeat
            .then(|| self.config.heartbeat_interval())
    }

    fn on_cycle(&mut self, _ctx: &mut Context<'_>) {
        let now = Instant::now();
        let timeout = self.config.heartbeat_timeout();
        for sid in self.sessions.ids() {
            let Some(session) = self.sessions.get_mut(sid) else {
                continue;
            };
            if !session.state.is_connected() {
                continue;
            }
            let Some(connection) = session.connection.as_ref() else {
                continue;
            };
            let idle = now.saturating_duration_since(session.last_heard);
            if idle > timeout {
                warn!(
                    session = %sid,
                    peer = %session.peer_addr(),
                    idle_ms = idle.as_millis() as u64,
                    "Heartbeat timeout, closing session"
                );
                connection.close();
            } else if session.state == SessionState::Running {
                let _ = connection.send(heartbeat_frame());
            }
        }
    }

    fn on_destroy(&mut self, _ctx: &mut Context<'_>) {
        self.shutting_down = true;
        for sid in self.sessions.ids() {
            let Some(session) = self.sessions.get_mut(sid) else {
                continue;
            };
            if session.connection.is_some() && session.state != SessionState::WaitConnect {
                session.shutdown();
            } else {
                self.discard_session(sid);
            }
        }
        info!(open = self.sessions.len(), "Proxy closing sessions");
    }

    fn is_destroy_completed(&self) -> bool {
        self.shutting_down && self.sessions.is_empty()
    }

    fn destroy_priority(&self) -> u32 {
        u32::MAX
    }

    fn on_new_connection(
        &mut self,
        ctx: &mut Context<'_>,
        listen_addr: SocketAddr,
        connection: PendingConnection,
    ) {
        let peer = connection.peer_addr();
        if self.shutting_down {
            debug!(peer = %peer, "Refusing connection during shutdown");
            return;
        }
        let admin = matches!(ctx.listener_kind(listen_addr), Some(ListenerKind::Admin));
        let Some(reactor) = ctx.reactor().cloned() else {
            return;
        };
        let Some(sid) = self.sessions.insert(PeerSession::inbound(peer, admin)) else {
            warn!(
                peer = %peer,
                max_sessions = self.config.max_sessions,
                "Session pool exhausted, closing connection"
            );
            return;
        };

        let generation = self.bump_generation();
        let monitor = Arc::new(SessionMonitor::new(ctx.handle(), sid, generation));
        let attached = reactor.attach(connection, monitor);
        if let Some(session) = self.sessions.get_mut(sid) {
            session.generation = generation;
            session.last_heard = Instant::now();
            session.connection = Some(attached);
        }
        debug!(session = %sid, peer = %peer, admin, "Inbound session awaiting handshake");
    }

    fn on_forward(
        &mut self,
        _ctx: &mut Context<'_>,
        envelope: Envelope<OutboundPayload>,
    ) -> Result<(), DeliveryError> {
        let destination = envelope.destination;
        let body = to_bytes(&*envelope.payload)?;
        let frame = ProxyEnvelope::new(envelope.source, destination, envelope.message_id, body)
            .to_frame()?;

        if let Some(sid) = self.routes.resolve(destination) {
            if self.send_on(sid, frame.clone()) {
                trace!(session = %sid, destination = %destination, "Forwarded to peer");
                return Ok(());
            }
        }

        if !self.routes.cache(destination, frame) {
            return Err(DeliveryError::CacheFull(destination));
        }
        debug!(
            destination = %destination,
            pending = self.routes.pending_len(destination),
            "No running session for remote actor, cached"
        );
        Ok(())
    }
}
