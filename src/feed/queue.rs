//! Bounded FIFO of pending change events.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::infra::lock;
use crate::invalidation::ChangeEvent;

const OWNER: &str = "feed::queue";
const METRIC_QUEUE_LEN: &str = "layout_flush_change_queue_len";
const METRIC_DROPPED: &str = "layout_flush_change_dropped_total";

/// Change event as held by the queue.
#[derive(Debug, Clone)]
pub struct QueuedChange {
    /// Unique identifier, used to correlate log lines.
    pub id: Uuid,
    /// Monotonic arrival sequence within this process.
    pub seq: u64,
    pub event: ChangeEvent,
    pub received_at: OffsetDateTime,
}

impl QueuedChange {
    /// Time spent in the queue as of `now`.
    pub fn waited(&self, now: OffsetDateTime) -> time::Duration {
        now - self.received_at
    }
}

pub struct ChangeQueue {
    queue: Mutex<VecDeque<QueuedChange>>,
    capacity: usize,
    seq: AtomicU64,
}

impl ChangeQueue {
    /// Create a queue holding at most `capacity` events; zero is clamped to one.
    pub fn new_with_limit(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
        }
    }

    /// Enqueue `event`. Returns false when the queue is full and the event was
    /// dropped.
    pub fn push(&self, event: ChangeEvent) -> bool {
        let mut queue = lock::lock(&self.queue, OWNER, "push");
        if queue.len() >= self.capacity {
            warn!(
                path = %event.path,
                kind = %event.kind,
                capacity = self.capacity,
                "Change queue full; dropping event"
            );
            counter!(METRIC_DROPPED).increment(1);
            return false;
        }

        let queued = QueuedChange {
            id: Uuid::new_v4(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            event,
            received_at: OffsetDateTime::now_utc(),
        };
        debug!(
            change_id = %queued.id,
            change_seq = queued.seq,
            path = %queued.event.path,
            kind = %queued.event.kind,
            "Change event enqueued"
        );
        queue.push_back(queued);
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        true
    }

    /// Remove up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<QueuedChange> {
        let mut queue = lock::lock(&self.queue, OWNER, "drain");
        let count = limit.min(queue.len());
        let drained: Vec<_> = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        lock::lock(&self.queue, OWNER, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
