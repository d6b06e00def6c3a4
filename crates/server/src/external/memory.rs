//! In-memory collaborators used by the binary when no remote store is wired in,
//! and by tests.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{Account, CreditStore, GeneratedVideo, StoreError, VideoStore};

#[derive(Default)]
pub struct MemoryVideoStore {
    videos: RwLock<Vec<(String, GeneratedVideo)>>,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.videos.read().await.len()
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn save_generated_video(&self, video: GeneratedVideo) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.videos.write().await.push((id.clone(), video));
        Ok(id)
    }

    async fn list_generated_videos(&self) -> Result<Vec<GeneratedVideo>, StoreError> {
        let mut videos: Vec<GeneratedVideo> = self
            .videos
            .read()
            .await
            .iter()
            .map(|(_, v)| v.clone())
            .collect();
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(videos)
    }
}

#[derive(Default)]
pub struct MemoryCreditStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|a| (a.user_id.clone(), a))
            .collect();
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    /// Load accounts from a JSON array of `{userId, email?, credits?, unlimited?}`.
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let accounts: Vec<Account> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), count = accounts.len(), "loaded credit accounts");
        Ok(Self::with_accounts(accounts))
    }
}

#[async_trait]
impl CreditStore for MemoryCreditStore {
    async fn account(&self, user_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(user_id).cloned())
    }

    async fn decrement_credit(&self, user_id: &str) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(user_id) {
            Some(account) if account.credits > 0 => {
                account.credits -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
