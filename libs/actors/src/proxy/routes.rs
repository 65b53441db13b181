//! Remote routing table: which session carries each remote actor, and the
//! frames waiting for ids no session carries yet.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tracing::warn;
use types::{ActorId, SessionId};

pub(crate) struct RouteTable {
    bindings: HashMap<ActorId, SessionId>,
    pending: HashMap<ActorId, VecDeque<Bytes>>,
    limit: usize,
    total: usize,
    total_limit: usize,
}

/// Frames released by a bind, in the order they were cached
pub(crate) type Flush = Vec<(ActorId, VecDeque<Bytes>)>;

impl RouteTable {
    pub(crate) fn new(limit: usize, total_limit: usize) -> Self {
        Self {
            bindings: HashMap::new(),
            pending: HashMap::new(),
            limit,
            total: 0,
            total_limit,
        }
    }

    pub(crate) fn resolve(&self, id: ActorId) -> Option<SessionId> {
        self.bindings.get(&id).copied()
    }

    /// Queue a framed message for `id`. False if its queue, or the cache as
    /// a whole, is full.
    pub(crate) fn cache(&mut self, id: ActorId, frame: Bytes) -> bool {
        if self.total >= self.total_limit || self.pending_len(id) >= self.limit {
            return false;
        }
        self.pending.entry(id).or_default().push_back(frame);
        self.total += 1;
        true
    }

    /// Put frames a flush could not send back at the front of `id`'s queue,
    /// ahead of anything cached since. Limits are not applied: these frames
    /// were already admitted once.
    pub(crate) fn requeue(&mut self, id: ActorId, frames: VecDeque<Bytes>) {
        if frames.is_empty() {
            return;
        }
        self.total += frames.len();
        let queue = self.pending.entry(id).or_default();
        let newer = std::mem::replace(queue, frames);
        queue.extend(newer);
    }

    /// Route `ids` through `session` and hand back their cached frames.
    ///
    /// An id already carried by another session keeps its binding.
    pub(crate) fn bind(&mut self, session: SessionId, ids: &[ActorId]) -> Flush {
        let mut flush = Vec::new();
        for &id in ids {
            match self.bindings.get(&id) {
                Some(&owner) if owner != session => {
                    warn!(
                        actor_id = %id,
                        session = %session,
                        owner = %owner,
                        "Remote actor already bound to another session, ignoring"
                    );
                    continue;
                }
                Some(_) => continue,
                None => {}
            }
            self.bindings.insert(id, session);
            if let Some(queue) = self.pending.remove(&id) {
                self.total -= queue.len();
                if !queue.is_empty() {
                    flush.push((id, queue));
                }
            }
        }
        flush
    }

    /// Drop every binding that points at `session`; returns the freed ids
    pub(crate) fn unbind_session(&mut self, session: SessionId) -> Vec<ActorId> {
        let mut freed: Vec<ActorId> = self
            .bindings
            .iter()
            .filter(|(_, owner)| **owner == session)
            .map(|(id, _)| *id)
            .collect();
        for id in &freed {
            self.bindings.remove(id);
        }
        freed.sort_unstable();
        freed
    }

    pub(crate) fn pending_len(&self, id: ActorId) -> usize {
        self.pending.get(&id).map_or(0, VecDeque::len)
    }

    pub(crate) fn pending_total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: ActorId = ActorId::new(20);

    #[test]
    fn test_bind_flushes_in_order_once() {
        let mut routes = RouteTable::new(8, 64);
        for body in [&b"m1"[..], b"m2", b"m3"] {
            assert!(routes.cache(R, Bytes::copy_from_slice(body)));
        }
        assert_eq!(routes.resolve(R), None);

        let flush = routes.bind(SessionId::new(1), &[R]);
        assert_eq!(flush.len(), 1);
        let (id, queue) = &flush[0];
        assert_eq!(*id, R);
        assert_eq!(
            queue.iter().cloned().collect::<Vec<_>>(),
            vec![
                Bytes::from_static(b"m1"),
                Bytes::from_static(b"m2"),
                Bytes::from_static(b"m3")
            ]
        );
        assert_eq!(routes.pending_len(R), 0);
        assert!(routes.bind(SessionId::new(1), &[R]).is_empty());
        assert_eq!(routes.resolve(R), Some(SessionId::new(1)));
    }

    #[test]
    fn test_first_writer_wins() {
        let mut routes = RouteTable::new(8, 64);
        routes.bind(SessionId::new(1), &[R]);
        routes.bind(SessionId::new(2), &[R, ActorId::new(21)]);
        assert_eq!(routes.resolve(R), Some(SessionId::new(1)));
        assert_eq!(routes.resolve(ActorId::new(21)), Some(SessionId::new(2)));

        assert_eq!(routes.unbind_session(SessionId::new(1)), vec![R]);
        assert_eq!(routes.resolve(R), None);
        routes.bind(SessionId::new(2), &[R]);
        assert_eq!(routes.resolve(R), Some(SessionId::new(2)));
    }

    #[test]
    fn test_cache_limit() {
        let mut routes = RouteTable::new(2, 64);
        assert!(routes.cache(R, Bytes::from_static(b"a")));
        assert!(routes.cache(R, Bytes::from_static(b"b")));
        assert!(!routes.cache(R, Bytes::from_static(b"c")));
        assert_eq!(routes.pending_len(R), 2);
    }

    #[test]
    fn test_total_limit_spans_ids() {
        let mut routes = RouteTable::new(2, 3);
        assert!(routes.cache(R, Bytes::from_static(b"a")));
        assert!(routes.cache(R, Bytes::from_static(b"b")));
        assert!(routes.cache(ActorId::new(21), Bytes::from_static(b"c")));
        assert!(!routes.cache(ActorId::new(22), Bytes::from_static(b"d")));
        assert_eq!(routes.pending_len(ActorId::new(22)), 0);

        routes.bind(SessionId::new(1), &[R]);
        assert_eq!(routes.pending_total(), 1);
        assert!(routes.cache(ActorId::new(22), Bytes::from_static(b"d")));
    }

    #[test]
    fn test_requeue_goes_ahead_of_newer_frames() {
        let mut routes = RouteTable::new(8, 64);
        routes.cache(R, Bytes::from_static(b"m3"));
        let unsent: VecDeque<Bytes> =
            [Bytes::from_static(b"m1"), Bytes::from_static(b"m2")].into_iter().collect();
        routes.requeue(R, unsent);
        assert_eq!(routes.pending_total(), 3);

        let flush = routes.bind(SessionId::new(2), &[R]);
        assert_eq!(
            flush[0].1.iter().cloned().collect::<Vec<_>>(),
            vec![
                Bytes::from_static(b"m1"),
                Bytes::from_static(b"m2"),
                Bytes::from_static(b"m3")
            ]
        );
    }
}
