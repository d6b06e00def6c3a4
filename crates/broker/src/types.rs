// crates/broker/src/types.rs
//! Result model shared by the broker and its HTTP adapters.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one generation request, minted by the automation engine
/// (or echoed back from a correlation id we handed it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a job. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

/// Stored state of a job, serialized verbatim to polling and streaming clients.
///
/// `video_url` and `video_name` only ever appear on `Done`; `error` only on
/// `Error`. A `Done` result without a URL is legal (the engine reported success
/// but produced nothing usable) and is passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            video_url: None,
            video_name: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A terminal outcome handed to [`JobResultBroker::publish`](crate::JobResultBroker::publish).
///
/// There is no pending variant, so a publish can never move a job backwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done {
        video_url: Option<String>,
        video_name: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl JobOutcome {
    pub fn done(video_url: impl Into<String>) -> Self {
        JobOutcome::Done {
            video_url: Some(video_url.into()),
            video_name: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        JobOutcome::Failed {
            error: error.into(),
        }
    }
}

impl From<JobOutcome> for JobResult {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Done {
                video_url,
                video_name,
            } => JobResult {
                status: JobStatus::Done,
                video_url,
                video_name,
                error: None,
            },
            JobOutcome::Failed { error } => JobResult {
                status: JobStatus::Error,
                video_url: None,
                video_name: None,
                error: Some(error),
            },
        }
    }
}

/// What `publish` did with a terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The result is now stored; `notified` is true if a live subscriber fired.
    Stored { notified: bool },
    /// The job already had a terminal result; the new one was discarded.
    Duplicate,
}
