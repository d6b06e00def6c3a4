//! Periodic eviction of old job results.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vidgen_broker::JobResultBroker;

use crate::metrics::record_jobs_tracked;

/// Every `every`, drop results whose last update is at least `ttl` old.
pub fn spawn_result_sweeper(
    broker: JobResultBroker,
    ttl: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tracing::info!(
        ttl_secs = ttl.as_secs(),
        interval_secs = every.as_secs(),
        "result sweeper started"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; nothing can be expired yet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            broker.sweep(ttl);
            record_jobs_tracked(broker.len());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidgen_broker::JobOutcome;

    #[tokio::test]
    async fn test_sweeper_evicts_expired_results() {
        let broker = JobResultBroker::new();
        broker.register("old");
        broker.publish("old", JobOutcome::done("https://x/old.mp4"));

        let handle = spawn_result_sweeper(
            broker.clone(),
            Duration::from_millis(20),
            Duration::from_millis(30),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!broker.contains("old"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_keeps_subscribed_jobs() {
        let broker = JobResultBroker::new();
        broker.register("watched");
        let waiter = broker.subscribe_channel("watched");

        let handle = spawn_result_sweeper(
            broker.clone(),
            Duration::from_millis(10),
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(broker.contains("watched"));
        handle.abort();
        drop(waiter);
    }
}
