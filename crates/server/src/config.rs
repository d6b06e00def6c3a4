// crates/server/src/config.rs
//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vidgen_observability::{LogConfig, LogFormat};

pub const DEFAULT_SITE: &str = "softtechniques";
pub const DEFAULT_MEDIA_HOST: &str = "cloudinary.com";

#[derive(Debug, Clone, Parser)]
#[command(name = "vidgen", version, about = "Video generation job broker")]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "VIDGEN_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Shared secret the automation engine sends in `x-n8n-secret`.
    /// Without it every callback is rejected.
    #[arg(long, env = "N8N_CALLBACK_SECRET", hide_env_values = true)]
    pub callback_secret: Option<String>,

    /// Webhook that starts a generation on the automation engine.
    #[arg(long, env = "N8N_START_WEBHOOK_URL")]
    pub start_webhook_url: Option<String>,

    #[arg(long, env = "VIDGEN_SITE", default_value = DEFAULT_SITE)]
    pub site: String,

    #[arg(long, env = "VIDGEN_ENGINE_TIMEOUT_SECS", default_value_t = 25)]
    pub engine_timeout_secs: u64,

    /// How long a submission waits for the engine's registration callback.
    #[arg(long, env = "VIDGEN_REGISTRATION_TIMEOUT_MS", default_value_t = 3000)]
    pub registration_timeout_ms: u64,

    #[arg(long, env = "VIDGEN_REGISTRATION_POLL_MS", default_value_t = 100)]
    pub registration_poll_ms: u64,

    /// After this long a submission also accepts a job id the engine minted
    /// itself. At or above the registration timeout only the id we sent counts.
    #[arg(long, env = "VIDGEN_REGISTRATION_FALLBACK_MS", default_value_t = 1500)]
    pub registration_fallback_ms: u64,

    /// Interval between SSE keepalive comments.
    #[arg(long, env = "VIDGEN_KEEPALIVE_SECS", default_value_t = 30)]
    pub keepalive_secs: u64,

    #[arg(long, env = "ENABLE_VIDEO_COMPRESSION", default_value_t = false)]
    pub enable_video_compression: bool,

    /// Videos already served from this host are never re-uploaded.
    #[arg(long, env = "VIDGEN_MEDIA_HOST", default_value = DEFAULT_MEDIA_HOST)]
    pub media_host: String,

    /// Accounts with these emails are never charged.
    #[arg(long, env = "ADMIN_EMAILS", value_delimiter = ',')]
    pub admin_emails: Vec<String>,

    /// JSON file of credit accounts loaded at startup.
    #[arg(long, env = "VIDGEN_ACCOUNTS_FILE")]
    pub accounts_file: Option<PathBuf>,

    /// Drop job results this many seconds after their last update.
    /// Results are kept for the life of the process when unset.
    #[arg(long, env = "VIDGEN_RESULT_TTL_SECS")]
    pub result_ttl_secs: Option<u64>,

    #[arg(long, env = "VIDGEN_SWEEP_INTERVAL_SECS", default_value_t = 300)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "VIDGEN_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[arg(long, env = "RUST_LOG")]
    pub log_filter: Option<String>,
}

impl Config {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.log_format,
            filter: self.log_filter.clone(),
        }
    }

    pub fn settings(&self) -> Settings {
        let admin_emails = self
            .admin_emails
            .iter()
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Settings {
            callback_secret: self
                .callback_secret
                .clone()
                .filter(|s| !s.is_empty()),
            site: self.site.clone(),
            engine_timeout: Duration::from_secs(self.engine_timeout_secs),
            registration_timeout: Duration::from_millis(self.registration_timeout_ms),
            registration_poll: Duration::from_millis(self.registration_poll_ms.max(1)),
            registration_fallback_after: Duration::from_millis(self.registration_fallback_ms),
            keepalive: Duration::from_secs(self.keepalive_secs.max(1)),
            compress_videos: self.enable_video_compression,
            media_host: self.media_host.clone(),
            admin_emails,
            result_ttl: self.result_ttl_secs.map(Duration::from_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        }
    }
}

/// Runtime knobs read by the request handlers.
#[derive(Debug, Clone)]
pub struct Settings {
    pub callback_secret: Option<String>,
    pub site: String,
    pub engine_timeout: Duration,
    pub registration_timeout: Duration,
    pub registration_poll: Duration,
    pub registration_fallback_after: Duration,
    pub keepalive: Duration,
    pub compress_videos: bool,
    pub media_host: String,
    /// Lower-cased.
    pub admin_emails: Vec<String>,
    pub result_ttl: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            callback_secret: None,
            site: DEFAULT_SITE.to_string(),
            engine_timeout: Duration::from_secs(25),
            registration_timeout: Duration::from_millis(3000),
            registration_poll: Duration::from_millis(100),
            registration_fallback_after: Duration::from_millis(1500),
            keepalive: Duration::from_secs(30),
            compress_videos: false,
            media_host: DEFAULT_MEDIA_HOST.to_string(),
            admin_emails: Vec::new(),
            result_ttl: None,
            sweep_interval: Duration::from_secs(300),
        }
    }
}
