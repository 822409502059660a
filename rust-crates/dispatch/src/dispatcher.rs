use crate::{
    DispatchConfig,
    DispatchError,
    Error,
    Result,
    job::{
        Ticket,
        WorkId,
        WorkItem,
    },
    pool::{
        Outcome,
        SignerHandle,
        SignerPool,
    },
    queue::AdmissionQueue,
    stats::{
        DetailedStats,
        QueueStats,
        StatsAggregator,
    },
};
use std::{
    future::Future,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
        atomic::{
            AtomicBool,
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::Notify,
    task::AbortHandle,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};


struct DispatchInner<C> {
    pool: SignerPool<C>,
    queue: Mutex<AdmissionQueue<WorkItem<C>>>,
    runtime: Handle,
    wake: Arc<Notify>,
    draining: AtomicBool,
    closed: AtomicBool,
    next_id: AtomicU64,
    drain_task: Mutex<Option<AbortHandle>>,
}

impl<C> DispatchInner<C> {
    fn lock_queue(&self) -> MutexGuard<'_, AdmissionQueue<WorkItem<C>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The one place where work items and signers meet.
///
/// Work is bound to a free signer on arrival when possible, otherwise parked
/// in the admission queue. A background loop drains the queue whenever a
/// signer frees up or an item is enqueued, with a periodic tick as a safety
/// net. Completion order across signers is not guaranteed; dispatch order of
/// queued items is FIFO.
pub struct Dispatcher<C> {
    inner: Arc<DispatchInner<C>>,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> Dispatcher<C> {
    /// Starts the drain loop on the current Tokio runtime.
    pub fn start(pool: SignerPool<C>, config: &DispatchConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let wake = Arc::new(Notify::new());
        let inner = Arc::new(DispatchInner {
            pool,
            queue: Mutex::new(AdmissionQueue::new(config.max_queue_size)),
            runtime: runtime.clone(),
            wake: wake.clone(),
            draining: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            drain_task: Mutex::new(None),
        });
        let task = runtime.spawn(drain_loop(
            Arc::downgrade(&inner),
            wake,
            config.drain_interval(),
        ));
        *inner
            .drain_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task.abort_handle());
        tracing::info!(
            "dispatcher started: {} signers, queue capacity {}, drain interval {:?}",
            inner.pool.len(),
            config.max_queue_size,
            config.drain_interval()
        );
        Ok(Self { inner })
    }

    /// Submits one state-changing operation. `work` runs at most once, with
    /// whichever signer it ends up bound to.
    ///
    /// Admission is decided before this returns: the work is either already
    /// running, queued, or the ticket is already resolved with
    /// [`DispatchError::CapacityExceeded`].
    pub fn submit<T, F, Fut>(&self, work: F) -> Ticket<T>
    where
        F: FnOnce(SignerHandle<C>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let id = WorkId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (item, ticket) = WorkItem::new(id, work);

        if self.inner.closed.load(Ordering::Acquire) {
            item.reject(DispatchError::ShutDown);
            return ticket;
        }

        if let Some(signer) = self.inner.pool.acquire() {
            tracing::info!("request {id} bound to {} immediately", signer.name());
            bind(&self.inner, signer, item);
            return ticket;
        }

        let mut queue = self.inner.lock_queue();
        // `shutdown` flips `closed` under this lock
        if self.inner.closed.load(Ordering::Acquire) {
            drop(queue);
            item.reject(DispatchError::ShutDown);
            return ticket;
        }
        let max_queue_size = queue.max_size();
        match queue.enqueue(item) {
            Ok(position) => {
                drop(queue);
                tracing::info!("all signers busy; request {id} queued at position {position}");
                self.inner.wake.notify_one();
            }
            Err(item) => {
                drop(queue);
                tracing::warn!(
                    "admission queue full ({max_queue_size}); rejecting request {id}"
                );
                item.reject(DispatchError::CapacityExceeded { max_queue_size });
            }
        }
        ticket
    }

    /// Rejects every queued request with [`DispatchError::AdminCleared`] and
    /// returns how many there were. In-flight work is unaffected.
    pub fn clear_queue(&self) -> usize {
        let cleared = self.inner.lock_queue().take_all();
        let count = cleared.len();
        for item in cleared {
            item.reject(DispatchError::AdminCleared);
        }
        tracing::warn!("queue cleared by administrator; rejected {count} requests");
        count
    }

    /// Stops the drain loop and rejects queued requests with
    /// [`DispatchError::ShutDown`]. In-flight work runs to completion; later
    /// submissions are rejected.
    pub fn shutdown(&self) -> usize {
        let pending = {
            let mut queue = self.inner.lock_queue();
            self.inner.closed.store(true, Ordering::Release);
            queue.take_all()
        };
        if let Some(task) = self
            .inner
            .drain_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        let count = pending.len();
        for item in pending {
            item.reject(DispatchError::ShutDown);
        }
        tracing::info!("dispatcher shut down; rejected {count} queued requests");
        count
    }
}

impl<C> Dispatcher<C> {
    pub fn pool(&self) -> &SignerPool<C> {
        &self.inner.pool
    }

    pub fn primary_signer(&self) -> SignerHandle<C> {
        self.inner.pool.primary()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock_queue().len()
    }

    pub fn queue_stats(&self) -> QueueStats {
        let snapshot = self.inner.lock_queue().snapshot();
        StatsAggregator::queue(&snapshot, self.inner.draining.load(Ordering::Acquire))
    }

    pub fn detailed_stats(&self) -> DetailedStats {
        StatsAggregator::detailed(&self.inner.pool, self.queue_stats())
    }

    pub fn log_stats(&self) {
        let stats = self.detailed_stats();
        tracing::info!(
            "signers: {}/{} available, {} busy, {} quarantined, success rate {:.2}%",
            stats.available_signers,
            stats.total_signers,
            stats.busy_signers,
            stats.quarantined_signers,
            stats.success_rate_pct
        );
        let queue = &stats.queue;
        if queue.size > 0 || queue.total_queued > 0 {
            tracing::info!(
                "queue: {} waiting, {} processed, {} queued in total, avg wait {}ms, max wait {}ms",
                queue.size,
                queue.total_processed,
                queue.total_queued,
                queue.avg_wait_ms,
                queue.max_wait_ms
            );
        }
    }
}

fn bind<C: Send + Sync + 'static>(
    inner: &Arc<DispatchInner<C>>,
    signer: SignerHandle<C>,
    item: WorkItem<C>,
) {
    let task_inner = inner.clone();
    let WorkItem { id, job } = item;
    inner.runtime.spawn(async move {
        let inner = task_inner;
        let signer_id = signer.id();
        let name = signer.name().to_owned();
        let started = Instant::now();
        let settlement = job.run(signer).await;
        let elapsed = started.elapsed();
        match settlement.outcome {
            Outcome::Success => {
                tracing::info!("request {id} succeeded via {name} in {elapsed:?}")
            }
            Outcome::Failure => {
                tracing::error!("request {id} failed via {name} after {elapsed:?}")
            }
        }
        inner.pool.release(signer_id, settlement.outcome);
        inner.lock_queue().record_processed();
        inner.wake.notify_one();
        settlement.deliver();
    });
}

/// Binds queued items to free signers until one of the two runs out. A pass
/// already in progress makes this a no-op.
fn drain<C: Send + Sync + 'static>(inner: &Arc<DispatchInner<C>>) -> usize {
    if inner
        .draining
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return 0;
    }
    let mut dispatched = 0;
    loop {
        let next = inner
            .lock_queue()
            .dequeue_with(|| inner.pool.acquire());
        let Some((signer, dequeued)) = next else {
            break;
        };
        tracing::info!(
            "request {} dispatched from queue to {} after waiting {:?}",
            dequeued.item.id,
            signer.name(),
            dequeued.waited
        );
        bind(inner, signer, dequeued.item);
        dispatched += 1;
    }
    inner.draining.store(false, Ordering::Release);
    dispatched
}

async fn drain_loop<C: Send + Sync + 'static>(
    dispatcher: Weak<DispatchInner<C>>,
    wake: Arc<Notify>,
    period: Duration,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }
        let Some(inner) = dispatcher.upgrade() else {
            break;
        };
        if inner.closed.load(Ordering::Acquire) {
            break;
        }
        drain(&inner);
    }
    tracing::debug!("drain loop stopped");
}
