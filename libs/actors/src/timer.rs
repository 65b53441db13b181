//! Periodic Cycle delivery, driven from the IO thread.
//!
//! Each entry owns a lock that travels inside the Cycle message it produces.
//! While that message is queued or running the lock is held, and elapsed
//! periods are skipped rather than stacked.

use crate::message::{CycleToken, Message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;
use types::ActorId;

struct CycleEntry {
    actor: ActorId,
    period: Duration,
    next_due: Instant,
    lock: Arc<AtomicBool>,
}

#[derive(Default)]
pub(crate) struct CycleTimers {
    entries: Vec<CycleEntry>,
}

impl CycleTimers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, actor: ActorId, period: Duration, now: Instant) {
        self.entries.push(CycleEntry {
            actor,
            period,
            next_due: now + period,
            lock: Arc::new(AtomicBool::new(false)),
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Deliver a Cycle for every elapsed entry whose lock is free, then
    /// return the earliest next due time.
    pub(crate) fn fire_due<F>(&mut self, now: Instant, mut deliver: F) -> Option<Instant>
    where
        F: FnMut(ActorId, Message),
    {
        for entry in &mut self.entries {
            if entry.next_due > now {
                continue;
            }
            if entry
                .lock
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let token = CycleToken::new(entry.actor, entry.period, entry.lock.clone());
                deliver(entry.actor, Message::Cycle(token));
            } else {
                trace!(actor_id = %entry.actor, "Previous cycle still in flight, skipping");
            }
            entry.next_due = now + entry.period;
        }

        self.entries.iter().map(|entry| entry.next_due).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_blocks_second_delivery() {
        let mut timers = CycleTimers::new();
        let start = Instant::now();
        let period = Duration::from_millis(10);
        timers.add(ActorId::new(1), period, start);

        let mut delivered = Vec::new();
        let next = timers.fire_due(start, |id, msg| delivered.push((id, msg)));
        assert!(delivered.is_empty());
        assert_eq!(next, Some(start + period));

        let t1 = start + period;
        timers.fire_due(t1, |id, msg| delivered.push((id, msg)));
        assert_eq!(delivered.len(), 1);

        // Token still alive: the next period is skipped
        let t2 = t1 + period;
        timers.fire_due(t2, |id, msg| delivered.push((id, msg)));
        assert_eq!(delivered.len(), 1);

        delivered.clear();
        let t3 = t2 + period;
        timers.fire_due(t3, |id, msg| delivered.push((id, msg)));
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, ActorId::new(1));
    }

    #[test]
    fn test_next_due_is_earliest() {
        let mut timers = CycleTimers::new();
        let now = Instant::now();
        timers.add(ActorId::new(1), Duration::from_millis(50), now);
        timers.add(ActorId::new(2), Duration::from_millis(20), now);
        assert_eq!(timers.len(), 2);
        assert_eq!(
            timers.fire_due(now, |_, _| {}),
            Some(now + Duration::from_millis(20))
        );
    }
}
