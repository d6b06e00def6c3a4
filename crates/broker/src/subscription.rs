// crates/broker/src/subscription.rs
//! Handles returned by `JobResultBroker::subscribe`.

use tokio::sync::oneshot;

use crate::broker::JobResultBroker;
use crate::types::{JobId, JobResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubscriberId(pub(crate) u64);

/// Result of a subscribe call.
pub enum Subscription {
    /// The job had already finished; the callback has run.
    Immediate(JobResult),
    /// The callback is stored until publish, cancellation, or displacement.
    Deferred(SubscriptionGuard),
}

/// Keeps a deferred subscriber registered. Dropping it unsubscribes.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard {
    broker: JobResultBroker,
    job_id: JobId,
    id: SubscriberId,
    armed: bool,
}

impl SubscriptionGuard {
    pub(crate) fn new(broker: JobResultBroker, job_id: JobId, id: SubscriberId) -> Self {
        Self {
            broker,
            job_id,
            id,
            armed: true,
        }
    }

    /// Unsubscribe now. Returns `true` if the callback was still registered,
    /// `false` if it already fired or was displaced.
    pub fn cancel(mut self) -> bool {
        self.armed = false;
        self.broker.unsubscribe(&self.job_id, self.id)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.broker.unsubscribe(&self.job_id, self.id);
        }
    }
}

/// Receiving end of [`JobResultBroker::subscribe_channel`].
#[must_use = "dropping the waiter unsubscribes immediately"]
pub struct ResultWaiter {
    rx: oneshot::Receiver<JobResult>,
    guard: Option<SubscriptionGuard>,
    immediate: bool,
}

impl ResultWaiter {
    pub(crate) fn new(rx: oneshot::Receiver<JobResult>, subscription: Subscription) -> Self {
        match subscription {
            Subscription::Immediate(_) => Self {
                rx,
                guard: None,
                immediate: true,
            },
            Subscription::Deferred(guard) => Self {
                rx,
                guard: Some(guard),
                immediate: false,
            },
        }
    }

    /// Whether the result was already available when subscribing.
    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    /// Wait for the terminal result.
    ///
    /// Resolves to `None` if the subscription was displaced by a newer
    /// subscriber for the same job.
    pub async fn wait(self) -> Option<JobResult> {
        let ResultWaiter { rx, guard, .. } = self;
        let result = rx.await.ok();
        drop(guard);
        result
    }
}
