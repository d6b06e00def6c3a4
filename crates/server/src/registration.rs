//! Discovery of the job id the automation engine registers after a submission.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use vidgen_broker::{JobId, JobResultBroker};

use crate::config::Settings;

/// Correlation ids of submissions still waiting for their registration.
///
/// The watermark fallback never hands out one of these, so a submission can't
/// take a job id that another submission sent to the engine.
#[derive(Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<JobId>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<JobId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `correlation_id` until the returned guard is dropped.
    pub fn track(&self, correlation_id: JobId) -> InFlightGuard {
        self.lock().insert(correlation_id.clone());
        InFlightGuard {
            in_flight: self.clone(),
            correlation_id,
        }
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.lock().contains(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[must_use = "dropping the guard stops tracking the submission"]
pub struct InFlightGuard {
    in_flight: InFlight,
    correlation_id: JobId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.correlation_id);
    }
}

/// Polling schedule for [`wait_for_registration`].
#[derive(Debug, Clone, Copy)]
pub struct RegistrationTiming {
    pub poll: Duration,
    /// How long only the correlation id is accepted before ids minted by the
    /// engine are considered. At or above `deadline` the fallback is off.
    pub fallback_after: Duration,
    pub deadline: Duration,
}

impl From<&Settings> for RegistrationTiming {
    fn from(settings: &Settings) -> Self {
        Self {
            poll: settings.registration_poll,
            fallback_after: settings.registration_fallback_after,
            deadline: settings.registration_timeout,
        }
    }
}

/// Poll `broker` until a registration for this submission shows up or the
/// deadline passes. Whatever id is returned has been claimed in the broker.
///
/// The correlation id we sent to the engine wins if it was registered. Once
/// `fallback_after` has passed, engines that mint their own id are matched by
/// the oldest unclaimed entry created after `watermark` that is not the
/// correlation id of another submission in `in_flight`.
pub async fn wait_for_registration(
    broker: &JobResultBroker,
    in_flight: &InFlight,
    correlation_id: &JobId,
    watermark: u64,
    timing: RegistrationTiming,
) -> Option<JobId> {
    let started = Instant::now();
    let mut ticker = interval(timing.poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let discover = async {
        loop {
            ticker.tick().await;
            if broker.contains(correlation_id.as_str()) {
                broker.claim(correlation_id.as_str());
                return correlation_id.clone();
            }
            if started.elapsed() < timing.fallback_after {
                continue;
            }
            if let Some(minted) =
                broker.claim_first_since(watermark, |id| in_flight.contains(id))
            {
                tracing::debug!(
                    job_id = %minted,
                    correlation_id = %correlation_id,
                    "engine registered its own job id"
                );
                return minted;
            }
        }
    };

    timeout(timing.deadline, discover).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(fallback_after: Duration, deadline: Duration) -> RegistrationTiming {
        RegistrationTiming {
            poll: Duration::from_millis(10),
            fallback_after,
            deadline,
        }
    }

    fn eager(deadline: Duration) -> RegistrationTiming {
        timing(Duration::ZERO, deadline)
    }

    #[tokio::test]
    async fn test_correlation_id_found_and_claimed() {
        let broker = JobResultBroker::new();
        let in_flight = InFlight::new();
        let correlation = JobId::from("corr-1");
        let _guard = in_flight.track(correlation.clone());
        let watermark = broker.watermark();

        let registrar = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            registrar.register("corr-1");
        });

        let found = wait_for_registration(
            &broker,
            &in_flight,
            &correlation,
            watermark,
            eager(Duration::from_secs(2)),
        )
        .await;
        assert_eq!(found, Some(correlation));
        assert!(!broker.claim("corr-1"));
    }

    #[tokio::test]
    async fn test_engine_minted_id_found_after_watermark() {
        let broker = JobResultBroker::new();
        broker.register("before-submission");
        let in_flight = InFlight::new();
        let watermark = broker.watermark();
        let correlation = JobId::from("corr-2");

        let registrar = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            registrar.register("engine-42");
        });

        let found = wait_for_registration(
            &broker,
            &in_flight,
            &correlation,
            watermark,
            eager(Duration::from_secs(2)),
        )
        .await;
        assert_eq!(found, Some(JobId::from("engine-42")));
    }

    #[tokio::test]
    async fn test_correlation_preferred_over_other_new_ids() {
        let broker = JobResultBroker::new();
        let in_flight = InFlight::new();
        let watermark = broker.watermark();
        broker.register("someone-else");
        broker.register("corr-3");

        let found = wait_for_registration(
            &broker,
            &in_flight,
            &JobId::from("corr-3"),
            watermark,
            eager(Duration::from_secs(1)),
        )
        .await;
        assert_eq!(found, Some(JobId::from("corr-3")));
        assert!(broker.claim("someone-else"));
    }

    #[tokio::test]
    async fn test_other_submissions_correlation_ids_are_never_taken() {
        let broker = JobResultBroker::new();
        let in_flight = InFlight::new();
        let mine = JobId::from("corr-mine");
        let theirs = JobId::from("corr-theirs");
        let _mine = in_flight.track(mine.clone());
        let _theirs = in_flight.track(theirs.clone());
        let watermark = broker.watermark();

        broker.register(theirs.clone());
        let registrar = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            registrar.register("corr-mine");
        });

        let found = wait_for_registration(
            &broker,
            &in_flight,
            &mine,
            watermark,
            eager(Duration::from_secs(2)),
        )
        .await;
        assert_eq!(found, Some(mine));
        assert!(broker.claim(theirs.as_str()));
    }

    #[tokio::test]
    async fn test_claimed_ids_are_not_handed_out_twice() {
        let broker = JobResultBroker::new();
        let in_flight = InFlight::new();
        let watermark = broker.watermark();
        broker.register("finished-submission");
        assert!(broker.claim("finished-submission"));

        let found = wait_for_registration(
            &broker,
            &in_flight,
            &JobId::from("corr-5"),
            watermark,
            eager(Duration::from_millis(80)),
        )
        .await;
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_fallback_waits_for_its_grace_period() {
        let broker = JobResultBroker::new();
        let in_flight = InFlight::new();
        let watermark = broker.watermark();
        broker.register("stray");

        // The fallback would pick "stray", but it is disabled for the whole wait.
        let found = wait_for_registration(
            &broker,
            &in_flight,
            &JobId::from("corr-6"),
            watermark,
            timing(Duration::from_secs(5), Duration::from_millis(80)),
        )
        .await;
        assert_eq!(found, None);
        assert!(broker.claim("stray"));
    }

    #[tokio::test]
    async fn test_times_out_when_nothing_registers() {
        let broker = JobResultBroker::new();
        broker.register("old");
        let watermark = broker.watermark();

        let found = wait_for_registration(
            &broker,
            &InFlight::new(),
            &JobId::from("corr-4"),
            watermark,
            eager(Duration::from_millis(80)),
        )
        .await;
        assert_eq!(found, None);
    }

    #[test]
    fn test_guard_stops_tracking_on_drop() {
        let in_flight = InFlight::new();
        let guard = in_flight.track(JobId::from("c"));
        assert!(in_flight.contains(&JobId::from("c")));
        drop(guard);
        assert!(in_flight.is_empty());
    }
}
