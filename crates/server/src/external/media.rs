//! Media CDN collaborator used for optional re-compression of finished videos.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media upload failed: {0}")]
    Upload(String),
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Re-upload the video at `source_url` and return the URL of the stored copy.
    async fn recompress(&self, source_url: &str) -> Result<String, MediaError>;
}

/// Returns every URL unchanged. Used when no CDN is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughMedia;

#[async_trait]
impl MediaStore for PassthroughMedia {
    async fn recompress(&self, source_url: &str) -> Result<String, MediaError> {
        Ok(source_url.to_string())
    }
}

/// Whether `url` already points at the media host, in which case uploading it
/// again would be a no-op.
pub fn is_hosted_on(url: &str, media_host: &str) -> bool {
    !media_host.is_empty() && url.contains(media_host)
}
