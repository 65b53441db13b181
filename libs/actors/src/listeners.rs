//! Listener kinds and routing of accepted sockets to actors.

use crate::message::Message;
use crate::runtime::RuntimeShared;
use network::{ListenerMonitor, PendingConnection, TransportError};
use node_config::Distribution;
use once_cell::sync::OnceCell;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::ActorId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerKind {
    /// Peer runtimes; accepted sockets go to the proxy
    Service,
    /// Admin tools; authenticated like peers but never host actors
    Admin,
    /// Application sockets handed to one of `handlers`
    Custom {
        description: String,
        handlers: Vec<ActorId>,
        distribution: Distribution,
    },
}

impl ListenerKind {
    pub fn label(&self) -> &str {
        match self {
            ListenerKind::Service => "service",
            ListenerKind::Admin => "admin",
            ListenerKind::Custom { description, .. } => description,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ListenerSpec {
    pub kind: ListenerKind,
    pub address: SocketAddr,
}

/// Pick the handler for a new connection
pub(crate) fn choose_handler(
    handlers: &[ActorId],
    distribution: Distribution,
    peer: SocketAddr,
    counter: &AtomicUsize,
) -> Option<ActorId> {
    if handlers.is_empty() {
        return None;
    }
    let index = match distribution {
        Distribution::RoundRobin => counter.fetch_add(1, Ordering::Relaxed) % handlers.len(),
        Distribution::Random => rand::thread_rng().gen_range(0..handlers.len()),
        Distribution::SourceHash => {
            let mut hasher = DefaultHasher::new();
            peer.ip().hash(&mut hasher);
            (hasher.finish() % handlers.len() as u64) as usize
        }
    };
    Some(handlers[index])
}

pub(crate) struct AcceptRouter {
    shared: Arc<RuntimeShared>,
    kind: ListenerKind,
    listen_addr: OnceCell<SocketAddr>,
    next: AtomicUsize,
}

impl AcceptRouter {
    pub(crate) fn new(shared: Arc<RuntimeShared>, kind: ListenerKind) -> Self {
        Self {
            shared,
            kind,
            listen_addr: OnceCell::new(),
            next: AtomicUsize::new(0),
        }
    }

    /// Record the bound address; set before the reactor accepts anything
    pub(crate) fn bound(&self, addr: SocketAddr) {
        let _ = self.listen_addr.set(addr);
    }

    fn target(&self, peer: SocketAddr) -> Option<ActorId> {
        match &self.kind {
            ListenerKind::Service | ListenerKind::Admin => Some(ActorId::PROXY),
            ListenerKind::Custom {
                handlers,
                distribution,
                ..
            } => choose_handler(handlers, *distribution, peer, &self.next),
        }
    }
}

impl ListenerMonitor for AcceptRouter {
    fn on_accept(&self, result: network::Result<PendingConnection>) {
        let connection = match result {
            Ok(connection) => connection,
            Err(e) => {
                warn!(listener = self.kind.label(), error = %e, "Accept error");
                return;
            }
        };
        let Some(&listen_addr) = self.listen_addr.get() else {
            return;
        };
        let peer = connection.peer_addr();
        let Some(target) = self.target(peer) else {
            warn!(listener = self.kind.label(), peer = %peer, "No handler for connection");
            return;
        };

        debug!(listener = self.kind.label(), peer = %peer, actor_id = %target, "Routing new connection");
        if let Err(e) = self.shared.push(
            target,
            Message::NewConnection {
                listen_addr,
                connection,
            },
        ) {
            warn!(listener = self.kind.label(), peer = %peer, error = %e, "Dropping accepted connection");
        }
    }

    fn on_closed(&self, error: Option<TransportError>) {
        match error {
            Some(e) => warn!(listener = self.kind.label(), error = %e, "Listener closed with error"),
            None => info!(listener = self.kind.label(), "Listener stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<ActorId> {
        vec![ActorId::new(5), ActorId::new(6), ActorId::new(7)]
    }

    #[test]
    fn test_round_robin_cycles() {
        let counter = AtomicUsize::new(0);
        let peer: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let picked: Vec<_> = (0..4)
            .filter_map(|_| choose_handler(&ids(), Distribution::RoundRobin, peer, &counter))
            .collect();
        assert_eq!(
            picked,
            vec![ActorId::new(5), ActorId::new(6), ActorId::new(7), ActorId::new(5)]
        );
    }

    #[test]
    fn test_source_hash_ignores_port() {
        let counter = AtomicUsize::new(0);
        let a: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let b: SocketAddr = "10.0.0.9:5123".parse().unwrap();
        assert_eq!(
            choose_handler(&ids(), Distribution::SourceHash, a, &counter),
            choose_handler(&ids(), Distribution::SourceHash, b, &counter)
        );
    }

    #[test]
    fn test_random_stays_in_range() {
        let counter = AtomicUsize::new(0);
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        for _ in 0..50 {
            let id = choose_handler(&ids(), Distribution::Random, peer, &counter).unwrap();
            assert!(ids().contains(&id));
        }
        assert_eq!(choose_handler(&[], Distribution::Random, peer, &counter), None);
    }
}
