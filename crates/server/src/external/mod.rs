//! Collaborators outside the broker: document store, credit accounts, media CDN
//! and the automation engine.

pub mod engine;
pub mod media;
pub mod memory;
pub mod store;

pub use engine::{AutomationEngine, EngineError, GenerationRequest, WebhookEngine};
pub use media::{MediaError, MediaStore, PassthroughMedia};
pub use memory::{MemoryCreditStore, MemoryVideoStore};
pub use store::{Account, CreditStore, GeneratedVideo, StoreError, VideoStore, INITIAL_CREDITS};
