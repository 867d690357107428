use super::NotificationEvent;
use crate::query::QueryKey;
use std::{
    collections::VecDeque,
    fmt,
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueId(u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SequencerState {
    #[default]
    Idle,
    Displaying {
        queue: QueueId,
        index: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequencerTransition {
    Started { queue: QueueId },
    Advanced { queue: QueueId, index: usize },
    Completed { queue: QueueId, consumed: Vec<QueryKey> },
}

#[derive(Debug)]
struct NotificationQueue {
    id: QueueId,
    events: Vec<NotificationEvent>,
    consumed: Vec<QueryKey>,
}

#[derive(Debug)]
struct ActiveQueue {
    queue: NotificationQueue,
    index: usize,
    deadline: Instant,
}

/// Plays queues of notification events one at a time.
///
/// A queue enqueued while another is displaying waits in a FIFO backlog.
/// Each deadline is computed from the previous deadline, so late ticks do not
/// stretch playback. An event whose whole window passed before it became
/// active starts at the tick that activates it instead, so every event is
/// shown at least once.
#[derive(Debug, Default)]
pub struct NotificationSequencer {
    active: Option<ActiveQueue>,
    backlog: VecDeque<NotificationQueue>,
    next_id: u64,
}

impl NotificationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` for an empty event list; nothing is queued then.
    pub fn enqueue(
        &mut self,
        events: Vec<NotificationEvent>,
        consumed: Vec<QueryKey>,
        now: Instant,
    ) -> Option<QueueId> {
        if events.is_empty() {
            return None;
        }
        let id = QueueId(self.next_id);
        self.next_id += 1;
        let queue = NotificationQueue {
            id,
            events,
            consumed,
        };
        if self.active.is_some() {
            debug!(queue = %id, backlog = self.backlog.len() + 1, "queueing notifications behind active queue");
            self.backlog.push_back(queue);
        } else {
            self.activate(queue, now);
        }
        Some(id)
    }

    fn activate(&mut self, queue: NotificationQueue, started_at: Instant) {
        let Some(first) = queue.events.first() else {
            return;
        };
        let deadline = started_at + first.duration;
        self.active = Some(ActiveQueue {
            queue,
            index: 0,
            deadline,
        });
    }

    pub fn advance(&mut self, now: Instant) -> Vec<SequencerTransition> {
        let mut transitions = Vec::new();
        loop {
            let Some(active) = self.active.as_mut() else {
                break;
            };
            if now < active.deadline {
                break;
            }
            let expired_at = active.deadline;
            let next_index = active.index + 1;
            if let Some(duration) = active.queue.events.get(next_index).map(|event| event.duration)
            {
                active.index = next_index;
                active.deadline = chain_deadline(expired_at, now, duration);
                transitions.push(SequencerTransition::Advanced {
                    queue: active.queue.id,
                    index: next_index,
                });
                continue;
            }

            if let Some(finished) = self.active.take() {
                transitions.push(SequencerTransition::Completed {
                    queue: finished.queue.id,
                    consumed: finished.queue.consumed,
                });
            }
            if let Some(next) = self.backlog.pop_front() {
                let queue = next.id;
                let first = next.events.first().map_or(Duration::ZERO, |event| event.duration);
                let started_at = if expired_at + first <= now {
                    debug!(%queue, "starting late notification queue from now");
                    now
                } else {
                    expired_at
                };
                self.activate(next, started_at);
                transitions.push(SequencerTransition::Started { queue });
            }
        }
        transitions
    }

    pub fn state(&self) -> SequencerState {
        match &self.active {
            Some(active) => SequencerState::Displaying {
                queue: active.queue.id,
                index: active.index,
            },
            None => SequencerState::Idle,
        }
    }

    pub fn active(&self) -> Option<&NotificationEvent> {
        self.active
            .as_ref()
            .and_then(|active| active.queue.events.get(active.index))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|active| active.deadline)
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }
}

fn chain_deadline(expired_at: Instant, now: Instant, duration: Duration) -> Instant {
    let chained = expired_at + duration;
    if chained <= now { now + duration } else { chained }
}
