// crates/broker/src/lib.rs
//! In-process job completion broker.
//!
//! Provides:
//! - `JobResultBroker` - results table plus at most one live subscriber per job
//! - `JobResult` / `JobOutcome` - stored state and terminal outcomes
//! - `Subscription` / `ResultWaiter` - deferred delivery handles that
//!   unsubscribe on drop

pub mod broker;
pub mod subscription;
pub mod types;

pub use broker::{Callback, JobResultBroker};
pub use subscription::{ResultWaiter, Subscription, SubscriptionGuard};
pub use types::{JobId, JobOutcome, JobResult, JobStatus, PublishOutcome};
