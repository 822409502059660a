use std::{
    collections::VecDeque,
    time::Duration,
};
use tokio::time::Instant;


struct Queued<I> {
    item: I,
    enqueued_at: Instant,
}

/// An item taken off the queue together with how long it waited.
pub struct Dequeued<I> {
    pub item: I,
    pub waited: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub len: usize,
    pub max_size: usize,
    pub total_queued: u64,
    pub total_dequeued: u64,
    pub total_processed: u64,
    pub avg_wait: Duration,
    pub max_wait: Duration,
}

/// Bounded FIFO of work that could not be bound to a signer on arrival.
///
/// The queue never holds more than `max_size` items; an item that does not
/// fit is handed back to the caller instead of being dropped. Wait times are
/// sampled when an item leaves the queue.
pub struct AdmissionQueue<I> {
    items: VecDeque<Queued<I>>,
    max_size: usize,
    total_queued: u64,
    total_dequeued: u64,
    total_processed: u64,
    wait_total: Duration,
    max_wait: Duration,
}

impl<I> AdmissionQueue<I> {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            total_queued: 0,
            total_dequeued: 0,
            total_processed: 0,
            wait_total: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// Appends `item`, returning its 1-based position, or gives it back if
    /// the queue is at capacity.
    pub fn enqueue(&mut self, item: I) -> Result<usize, I> {
        if self.items.len() >= self.max_size {
            return Err(item);
        }
        self.items.push_back(Queued {
            item,
            enqueued_at: Instant::now(),
        });
        self.total_queued += 1;
        Ok(self.items.len())
    }

    pub fn dequeue(&mut self) -> Option<Dequeued<I>> {
        let Queued { item, enqueued_at } = self.items.pop_front()?;
        let waited = enqueued_at.elapsed();
        self.total_dequeued += 1;
        self.wait_total += waited;
        self.max_wait = self.max_wait.max(waited);
        Some(Dequeued { item, waited })
    }

    /// Pops the oldest item only if `bind` yields something to pair it with,
    /// so an item never leaves the queue without a destination.
    pub fn dequeue_with<S>(
        &mut self,
        bind: impl FnOnce() -> Option<S>,
    ) -> Option<(S, Dequeued<I>)> {
        if self.items.is_empty() {
            return None;
        }
        let target = bind()?;
        let dequeued = self.dequeue()?;
        Some((target, dequeued))
    }

    /// Removes everything without counting it as dequeued.
    pub fn take_all(&mut self) -> Vec<I> {
        self.items.drain(..).map(|queued| queued.item).collect()
    }

    /// Counts one work item that reached completion, queued or not.
    pub fn record_processed(&mut self) {
        self.total_processed += 1;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    /// Cumulative mean of all sampled wait times.
    pub fn avg_wait(&self) -> Duration {
        if self.total_dequeued == 0 {
            return Duration::ZERO;
        }
        let nanos = self.wait_total.as_nanos() / u128::from(self.total_dequeued);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            len: self.items.len(),
            max_size: self.max_size,
            total_queued: self.total_queued,
            total_dequeued: self.total_dequeued,
            total_processed: self.total_processed,
            avg_wait: self.avg_wait(),
            max_wait: self.max_wait,
        }
    }
}
