//! Remote service clients and their shared error taxonomy
//!
//! Each service wraps one upstream API behind a plain async call:
//! prompt in, text or artifact path out. Failures never cross the
//! service boundary as panics or raw errors — every public entry point
//! catches, logs with enough context to diagnose (operation, status,
//! truncated body), and returns a safe fallback value.

pub mod chat;
pub mod image;
pub mod search;
pub mod tts;
pub mod video;

pub use chat::{ChatMode, ChatService};
pub use image::ImageService;
pub use search::{SearchQuery, SearchService};
pub use tts::{TtsService, VoicePreset};
pub use video::{VideoRequest, VideoService};

use crate::config::Settings;
use crate::http::create_http_client;
use thiserror::Error;

/// Failure classes shared by all remote services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection or transport failure other than a timeout
    #[error("network error: {0}")]
    Network(String),
    /// Transport timeout on a single request, distinct from polling
    /// exhaustion ([`ServiceError::Timeout`])
    #[error("request timed out: {0}")]
    RequestTimeout(String),
    /// Non-success HTTP status with a (truncated) body
    #[error("remote API error {status}: {body}")]
    Remote { status: u16, body: String },
    /// Response missing expected fields, e.g. no job id or no artifact
    /// reference on success
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Polling budget exhausted without a terminal status
    #[error("job polling timed out after {attempts} attempts")]
    Timeout { attempts: u32 },
    /// Remote job reached its failed state; detail is remote-supplied
    #[error("remote job failed: {0}")]
    JobFailed(String),
    /// Artifact exceeds the delivery size ceiling
    #[error("artifact size {size} bytes exceeds limit {limit}")]
    SizeLimit { size: u64, limit: u64 },
    /// Feature disabled because its credentials are missing
    #[error("{0} is not configured")]
    Unavailable(&'static str),
    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ServiceError {
    /// Classifies transport errors at the source so callers match on the
    /// variant instead of inspecting error strings.
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::RequestTimeout(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// All service clients, composed from [`Settings`].
///
/// Caches are constructed here and owned by the individual services —
/// explicit injection instead of process-wide singletons.
pub struct Services {
    pub chat: ChatService,
    pub image: ImageService,
    pub video: VideoService,
    pub tts: TtsService,
    pub search: SearchService,
}

impl Services {
    /// Builds every service from the settings. Services whose API key is
    /// missing stay constructed but disabled (they log a warning once and
    /// answer with "absent" results).
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let client = create_http_client(settings.http_timeout_secs);

        Self {
            chat: ChatService::new(settings, client.clone()),
            image: ImageService::new(settings, client.clone()),
            video: VideoService::new(settings, client.clone()),
            tts: TtsService::new(settings, client.clone()),
            search: SearchService::new(settings, client),
        }
    }
}
