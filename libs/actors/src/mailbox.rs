//! Per-actor mailbox with single-flight scheduling.
//!
//! Producers append to the incoming buffer. The first push into an idle
//! mailbox hands the actor id to the runnable queue exactly once; the worker
//! that receives the id swaps buffers, runs the batch without holding the
//! lock, and either reschedules or returns the mailbox to idle.

use crate::message::Message;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::mem;
use tracing::trace;
use types::ActorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxState {
    Idle,
    /// Id is sitting in the runnable queue
    WaitingToRun,
    /// A worker is draining a batch
    Running,
}

struct Queue {
    incoming: Vec<Message>,
    state: MailboxState,
}

pub struct Mailbox {
    id: ActorId,
    queue: Mutex<Queue>,
    runnable: Sender<ActorId>,
}

impl Mailbox {
    pub fn new(id: ActorId, runnable: Sender<ActorId>) -> Self {
        Self {
            id,
            queue: Mutex::new(Queue {
                incoming: Vec::new(),
                state: MailboxState::Idle,
            }),
            runnable,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn push(&self, msg: Message) {
        let schedule = {
            let mut queue = self.queue.lock();
            queue.incoming.push(msg);
            if queue.state == MailboxState::Idle {
                queue.state = MailboxState::WaitingToRun;
                true
            } else {
                false
            }
        };
        if schedule {
            self.schedule();
        }
    }

    /// Swap the incoming buffer into `drained` and mark the mailbox running.
    ///
    /// `drained` must be empty. Returns false if there was nothing queued,
    /// which only happens for a stray runnable token.
    pub fn pop_all(&self, drained: &mut Vec<Message>) -> bool {
        debug_assert!(drained.is_empty());
        let mut queue = self.queue.lock();
        mem::swap(&mut queue.incoming, drained);
        queue.state = MailboxState::Running;
        !drained.is_empty()
    }

    /// Finish a batch; reschedule if messages arrived meanwhile.
    pub fn end_run(&self, drained: &mut Vec<Message>) {
        drained.clear();
        let schedule = {
            let mut queue = self.queue.lock();
            if queue.incoming.is_empty() {
                queue.state = MailboxState::Idle;
                false
            } else {
                queue.state = MailboxState::WaitingToRun;
                true
            }
        };
        if schedule {
            self.schedule();
        }
    }

    pub fn state(&self) -> MailboxState {
        self.queue.lock().state
    }

    pub fn len(&self) -> usize {
        self.queue.lock().incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn schedule(&self) {
        trace!(actor_id = %self.id, "Actor runnable");
        // Disconnected only after the dispatcher is gone
        let _ = self.runnable.send(self.id);
    }
}
