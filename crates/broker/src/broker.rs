// crates/broker/src/broker.rs
//! In-memory rendezvous between out-of-band job completion and in-process waiters.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::subscription::{ResultWaiter, SubscriberId, Subscription, SubscriptionGuard};
use crate::types::{JobId, JobOutcome, JobResult, PublishOutcome};

/// One-shot callback fired with the terminal result of a job.
pub type Callback = Box<dyn FnOnce(JobResult) + Send + 'static>;

struct Entry {
    result: JobResult,
    /// Creation order, used by registration discovery.
    seq: u64,
    /// Last transition (creation or terminal publish), used by `sweep`.
    updated_at: Instant,
    /// Set once a submission has taken this id as its own.
    claimed: bool,
}

struct Subscriber {
    id: SubscriberId,
    callback: Callback,
}

#[derive(Default)]
struct BrokerState {
    results: HashMap<JobId, Entry>,
    subscribers: HashMap<JobId, Subscriber>,
    next_seq: u64,
    next_subscriber: u64,
}

impl BrokerState {
    fn insert_entry(&mut self, job_id: JobId, result: JobResult) {
        self.next_seq += 1;
        let entry = Entry {
            result,
            seq: self.next_seq,
            updated_at: Instant::now(),
            claimed: false,
        };
        self.results.insert(job_id, entry);
    }
}

/// Job result broker.
///
/// Holds the results table and the subscribers table behind a single mutex so
/// that the check-and-register in [`subscribe`](Self::subscribe) and the
/// store-and-take in [`publish`](Self::publish) can never interleave. Callbacks
/// always run after the lock is released.
///
/// Cloning is cheap and every clone shares the same tables.
#[derive(Clone, Default)]
pub struct JobResultBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl JobResultBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // Callbacks never run under this lock, so poisoning can only come from a
        // panic inside the broker itself; the maps are still structurally sound.
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("job broker mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Create a pending placeholder for `job_id`.
    ///
    /// Returns `true` if a new entry was created. An existing entry, terminal or
    /// not, is left untouched.
    pub fn register(&self, job_id: impl Into<JobId>) -> bool {
        let job_id = job_id.into();
        if job_id.is_empty() {
            tracing::warn!("ignoring registration with empty job id");
            return false;
        }

        let mut state = self.lock();
        if state.results.contains_key(&job_id) {
            tracing::debug!(job_id = %job_id, "job already registered, skipping");
            return false;
        }
        state.insert_entry(job_id.clone(), JobResult::pending());
        drop(state);

        tracing::info!(job_id = %job_id, "registered pending job");
        true
    }

    /// Store a terminal outcome and fire the live subscriber, if any.
    ///
    /// The first terminal write wins: publishing to a job that already finished
    /// returns [`PublishOutcome::Duplicate`] and changes nothing. Publishing to
    /// an unknown job creates the entry.
    pub fn publish(&self, job_id: impl Into<JobId>, outcome: JobOutcome) -> PublishOutcome {
        let job_id = job_id.into();
        let result = JobResult::from(outcome);

        let subscriber = {
            let mut state = self.lock();
            match state.results.get_mut(&job_id) {
                Some(entry) if entry.result.is_terminal() => {
                    tracing::warn!(
                        job_id = %job_id,
                        stored = ?entry.result.status,
                        incoming = ?result.status,
                        "duplicate terminal publish ignored"
                    );
                    return PublishOutcome::Duplicate;
                }
                Some(entry) => {
                    entry.result = result.clone();
                    entry.updated_at = Instant::now();
                }
                None => {
                    tracing::debug!(job_id = %job_id, "publish for unregistered job");
                    state.insert_entry(job_id.clone(), result.clone());
                }
            }
            state.subscribers.remove(&job_id)
        };

        tracing::info!(job_id = %job_id, status = ?result.status, "job finished");

        let notified = match subscriber {
            Some(subscriber) => {
                deliver(&job_id, subscriber.callback, result);
                true
            }
            None => {
                tracing::debug!(job_id = %job_id, "no subscriber, result kept for polling");
                false
            }
        };
        PublishOutcome::Stored { notified }
    }

    /// Current result for `job_id`, or `None` if nothing was registered or published.
    pub fn get(&self, job_id: &str) -> Option<JobResult> {
        self.lock()
            .results
            .get(job_id)
            .map(|entry| entry.result.clone())
    }

    /// Wait for the terminal result of `job_id` through `callback`.
    ///
    /// If the job already finished the callback runs before this returns and
    /// [`Subscription::Immediate`] is returned. Otherwise the callback is stored
    /// and the returned guard keeps it registered until it fires, the guard is
    /// dropped, or a newer subscriber for the same job displaces it. A displaced
    /// callback is dropped without being called.
    pub fn subscribe<F>(&self, job_id: impl Into<JobId>, callback: F) -> Subscription
    where
        F: FnOnce(JobResult) + Send + 'static,
    {
        let job_id = job_id.into();

        let mut state = self.lock();
        let finished = state
            .results
            .get(&job_id)
            .filter(|entry| entry.result.is_terminal())
            .map(|entry| entry.result.clone());

        if let Some(result) = finished {
            drop(state);
            tracing::debug!(job_id = %job_id, "subscriber arrived after publish");
            deliver(&job_id, Box::new(callback), result.clone());
            return Subscription::Immediate(result);
        }

        state.next_subscriber += 1;
        let id = SubscriberId(state.next_subscriber);
        let displaced = state.subscribers.insert(
            job_id.clone(),
            Subscriber {
                id,
                callback: Box::new(callback),
            },
        );
        drop(state);

        if displaced.is_some() {
            tracing::warn!(job_id = %job_id, "replacing existing subscriber");
        }
        drop(displaced);

        Subscription::Deferred(SubscriptionGuard::new(self.clone(), job_id, id))
    }

    /// Channel flavour of [`subscribe`](Self::subscribe).
    pub fn subscribe_channel(&self, job_id: impl Into<JobId>) -> ResultWaiter {
        let (tx, rx) = oneshot::channel();
        let subscription = self.subscribe(job_id, move |result| {
            // The waiter may already be gone (client disconnected); that's fine.
            let _ = tx.send(result);
        });
        ResultWaiter::new(rx, subscription)
    }

    /// Remove the subscriber for `job_id` if it is still the one identified by `id`.
    pub(crate) fn unsubscribe(&self, job_id: &JobId, id: SubscriberId) -> bool {
        let removed = {
            let mut state = self.lock();
            match state.subscribers.get(job_id) {
                Some(current) if current.id == id => state.subscribers.remove(job_id),
                _ => None,
            }
        };
        match removed {
            Some(_) => {
                tracing::debug!(job_id = %job_id, "subscriber cancelled");
                true
            }
            None => false,
        }
    }

    /// All known job ids, in creation order.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.registered_since(0)
    }

    /// Sequence number of the most recently created entry.
    pub fn watermark(&self) -> u64 {
        self.lock().next_seq
    }

    /// Job ids whose entries were created after `watermark`, oldest first.
    pub fn registered_since(&self, watermark: u64) -> Vec<JobId> {
        let state = self.lock();
        let mut ids: Vec<(u64, JobId)> = state
            .results
            .iter()
            .filter(|(_, entry)| entry.seq > watermark)
            .map(|(id, entry)| (entry.seq, id.clone()))
            .collect();
        drop(state);
        ids.sort_unstable_by_key(|(seq, _)| *seq);
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Mark `job_id` as taken by a submission.
    ///
    /// Returns `false` if the job is unknown or was already claimed.
    pub fn claim(&self, job_id: &str) -> bool {
        match self.lock().results.get_mut(job_id) {
            Some(entry) if !entry.claimed => {
                entry.claimed = true;
                true
            }
            _ => false,
        }
    }

    /// Claim the oldest unclaimed job created after `watermark`, skipping ids
    /// for which `skip` returns `true`.
    ///
    /// `skip` runs under the broker lock and must not call back into the broker.
    pub fn claim_first_since<F>(&self, watermark: u64, skip: F) -> Option<JobId>
    where
        F: Fn(&JobId) -> bool,
    {
        let mut state = self.lock();
        let (job_id, entry) = state
            .results
            .iter_mut()
            .filter(|(id, entry)| entry.seq > watermark && !entry.claimed && !skip(*id))
            .min_by_key(|(_, entry)| entry.seq)?;
        entry.claimed = true;
        Some(job_id.clone())
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().results.contains_key(job_id)
    }

    pub fn has_subscriber(&self, job_id: &str) -> bool {
        self.lock().subscribers.contains_key(job_id)
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose last transition is at least `older_than` ago.
    ///
    /// Jobs with a live subscriber are kept. Returns how many entries were removed.
    pub fn sweep(&self, older_than: Duration) -> usize {
        let mut state = self.lock();
        let BrokerState {
            results,
            subscribers,
            ..
        } = &mut *state;
        let before = results.len();
        results.retain(|id, entry| {
            subscribers.contains_key(id) || entry.updated_at.elapsed() < older_than
        });
        let removed = before - results.len();
        drop(state);

        if removed > 0 {
            tracing::info!(removed, "swept expired job results");
        }
        removed
    }
}

fn deliver(job_id: &JobId, callback: Callback, result: JobResult) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || callback(result))) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(job_id = %job_id, panic = %message, "subscriber callback panicked");
    }
}
