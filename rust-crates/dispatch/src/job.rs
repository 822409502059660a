use crate::{
    DispatchError,
    pool::{
        Outcome,
        SignerHandle,
    },
};
use anyhow::anyhow;
use futures::{
    FutureExt,
    future::BoxFuture,
};
use std::{
    fmt,
    future::Future,
    marker::PhantomData,
    panic::AssertUnwindSafe,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};
use tokio::sync::oneshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(pub(crate) u64);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// Result of running a job: the outcome for the pool, plus the deferred
/// delivery of the value to the caller. Delivery is split off so the signer
/// can be released before the caller observes the result.
pub(crate) struct Settlement {
    pub(crate) outcome: Outcome,
    deliver: Box<dyn FnOnce() + Send>,
}

impl Settlement {
    pub(crate) fn deliver(self) {
        (self.deliver)()
    }
}

pub(crate) trait Job<C>: Send {
    fn run(self: Box<Self>, signer: SignerHandle<C>) -> BoxFuture<'static, Settlement>;

    fn reject(self: Box<Self>, error: DispatchError);
}

struct TypedJob<F, Fut, T> {
    work: F,
    reply: oneshot::Sender<Result<T, DispatchError>>,
    _future: PhantomData<fn() -> Fut>,
}

impl<C, F, Fut, T> Job<C> for TypedJob<F, Fut, T>
where
    C: Send + Sync + 'static,
    F: FnOnce(SignerHandle<C>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>, signer: SignerHandle<C>) -> BoxFuture<'static, Settlement> {
        let TypedJob { work, reply, .. } = *self;
        async move {
            let result = AssertUnwindSafe(async move { work(signer).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(anyhow!("signer operation panicked")));
            let outcome = if result.is_ok() {
                Outcome::Success
            } else {
                Outcome::Failure
            };
            let deliver = move || {
                let _ = reply.send(result.map_err(DispatchError::SignerOperationFailed));
            };
            Settlement {
                outcome,
                deliver: Box::new(deliver),
            }
        }
        .boxed()
    }

    fn reject(self: Box<Self>, error: DispatchError) {
        let _ = self.reply.send(Err(error));
    }
}

/// One request to mutate state through some signer, waiting in the queue or
/// bound to a signer.
pub(crate) struct WorkItem<C> {
    pub(crate) id: WorkId,
    pub(crate) job: Box<dyn Job<C>>,
}

impl<C: Send + Sync + 'static> WorkItem<C> {
    pub(crate) fn new<F, Fut, T>(id: WorkId, work: F) -> (Self, Ticket<T>)
    where
        F: FnOnce(SignerHandle<C>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let job = TypedJob {
            work,
            reply,
            _future: PhantomData,
        };
        let item = Self {
            id,
            job: Box::new(job),
        };
        let ticket = Ticket {
            id,
            reply: receiver,
        };
        (item, ticket)
    }

    pub(crate) fn reject(self, error: DispatchError) {
        self.job.reject(error)
    }
}

/// Caller-side handle for a submitted request. Resolves with the work's own
/// value or error, or with an admission/administrative rejection.
#[must_use = "a ticket does nothing unless awaited"]
pub struct Ticket<T> {
    id: WorkId,
    reply: oneshot::Receiver<Result<T, DispatchError>>,
}

impl<T> Ticket<T> {
    pub fn id(&self) -> WorkId {
        self.id
    }
}

impl<T> Future for Ticket<T> {
    type Output = Result<T, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.reply)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::Interrupted)))
    }
}
