//! In-process change feed.
//!
//! A small pub/sub facility standing in for the repository's observation
//! service: producers publish change events, subscribers register a filter and
//! a listener, and [`ChangeFeed::deliver`] hands each subscriber the matching
//! part of the next batch.

mod queue;
mod subscription;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::invalidation::ChangeEvent;

pub use queue::{ChangeQueue, QueuedChange};
pub use subscription::{ChangeListener, SubscriptionFilter, SubscriptionId};

struct Subscriber {
    filter: SubscriptionFilter,
    listener: Arc<dyn ChangeListener>,
}

pub struct ChangeFeed {
    queue: ChangeQueue,
    subscribers: DashMap<SubscriptionId, Subscriber>,
    next_id: AtomicU64,
}

impl ChangeFeed {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: ChangeQueue::new_with_limit(queue_capacity),
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` for events accepted by `filter`.
    pub fn subscribe(
        &self,
        filter: SubscriptionFilter,
        listener: Arc<dyn ChangeListener>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(subscription = %id, root = filter.root(), "Subscriber registered");
        self.subscribers.insert(id, Subscriber { filter, listener });
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Queue one event. Returns false if the queue was full.
    pub fn publish(&self, event: ChangeEvent) -> bool {
        self.queue.push(event)
    }

    /// Queue several events, returning how many were accepted.
    pub fn publish_batch(&self, events: impl IntoIterator<Item = ChangeEvent>) -> usize {
        events
            .into_iter()
            .map(|event| self.publish(event))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Deliver up to `limit` queued events to subscribers.
    ///
    /// Each subscriber receives one batch containing the events its filter
    /// accepts, in arrival order; subscribers with nothing to receive are not
    /// called. Returns the number of events taken off the queue.
    pub async fn deliver(&self, limit: usize) -> usize {
        let drained = self.queue.drain(limit);
        if drained.is_empty() {
            return 0;
        }

        let batch_id = Uuid::new_v4();
        let mut targets: Vec<(SubscriptionId, SubscriptionFilter, Arc<dyn ChangeListener>)> = self
            .subscribers
            .iter()
            .map(|entry| {
                (
                    *entry.key(),
                    entry.filter.clone(),
                    Arc::clone(&entry.listener),
                )
            })
            .collect();
        targets.sort_by_key(|(id, _, _)| *id);

        info!(
            batch_id = %batch_id,
            events = drained.len(),
            first_seq = drained.first().map(|q| q.seq),
            oldest_wait_ms = drained
                .first()
                .map(|q| q.waited(OffsetDateTime::now_utc()).whole_milliseconds() as i64),
            subscribers = targets.len(),
            "Delivering change batch"
        );

        for (id, filter, listener) in targets {
            let batch: Vec<ChangeEvent> = drained
                .iter()
                .filter(|queued| filter.accepts(&queued.event))
                .map(|queued| queued.event.clone())
                .collect();
            if batch.is_empty() {
                continue;
            }
            debug!(batch_id = %batch_id, subscription = %id, events = batch.len(), "Notifying subscriber");
            listener.on_change(batch).await;
        }

        drained.len()
    }

    /// Deliver until the queue is empty, `limit` events per batch.
    pub async fn flush(&self, limit: usize) -> usize {
        let mut total = 0;
        loop {
            let delivered = self.deliver(limit.max(1)).await;
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when the next `publish` would drop its event.
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.queue.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
