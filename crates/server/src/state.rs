// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use vidgen_broker::JobResultBroker;

use crate::config::Settings;
use crate::external::{
    AutomationEngine, CreditStore, MediaStore, MemoryCreditStore, MemoryVideoStore,
    PassthroughMedia, VideoStore,
};
use crate::registration::InFlight;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub settings: Settings,
    /// The single in-process job broker. Every adapter goes through this instance.
    pub broker: JobResultBroker,
    /// Submissions waiting for their registration callback.
    pub submissions: InFlight,
    pub videos: Arc<dyn VideoStore>,
    pub credits: Arc<dyn CreditStore>,
    pub media: Arc<dyn MediaStore>,
    /// `None` when no start webhook is configured; submissions then fail with 500.
    pub engine: Option<Arc<dyn AutomationEngine>>,
}

impl AppState {
    /// State backed by in-memory stores, with no automation engine.
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            start_time: Instant::now(),
            settings,
            broker: JobResultBroker::new(),
            submissions: InFlight::new(),
            videos: Arc::new(MemoryVideoStore::new()),
            credits: Arc::new(MemoryCreditStore::new()),
            media: Arc::new(PassthroughMedia),
            engine: None,
        }
    }

    pub fn with_videos(mut self, videos: Arc<dyn VideoStore>) -> Self {
        self.videos = videos;
        self
    }

    pub fn with_credits(mut self, credits: Arc<dyn CreditStore>) -> Self {
        self.credits = credits;
        self
    }

    pub fn with_media(mut self, media: Arc<dyn MediaStore>) -> Self {
        self.media = media;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn AutomationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Get server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
