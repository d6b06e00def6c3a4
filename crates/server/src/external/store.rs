//! Document-store collaborators: generated-video records and user credit accounts.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vidgen_broker::{JobId, JobStatus};

/// Credits granted to an account that has never been charged.
pub const INITIAL_CREDITS: u32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read accounts file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed accounts file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A finished generation persisted for the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedVideo {
    pub job_id: JobId,
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_name: Option<String>,
    pub prompt: String,
    pub duration: f64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// A user's credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_credits")]
    pub credits: u32,
    /// Unlimited accounts are never charged.
    #[serde(default)]
    pub unlimited: bool,
}

fn default_credits() -> u32 {
    INITIAL_CREDITS
}

impl Account {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            credits: INITIAL_CREDITS,
            unlimited: false,
        }
    }
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Persist a record and return its document id.
    async fn save_generated_video(&self, video: GeneratedVideo) -> Result<String, StoreError>;

    /// All records, newest first.
    async fn list_generated_videos(&self) -> Result<Vec<GeneratedVideo>, StoreError>;
}

#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn account(&self, user_id: &str) -> Result<Option<Account>, StoreError>;

    /// Take one credit. Returns `false` if the balance was already zero.
    async fn decrement_credit(&self, user_id: &str) -> Result<bool, StoreError>;
}
