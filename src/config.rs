//! Configuration and settings management
//!
//! Loads settings from environment variables and defines service constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible chat completions API
    #[serde(default = "default_ai_api_base_url")]
    pub ai_api_base_url: String,
    /// Model identifier sent to the chat completions API
    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    /// Stability AI API key (image generation disabled when unset)
    pub stability_api_key: Option<String>,
    /// Pollo.ai API key (video generation disabled when unset)
    pub pollo_api_key: Option<String>,
    /// TTS API key (speech synthesis disabled when unset)
    pub tts_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible TTS API
    #[serde(default = "default_tts_api_base_url")]
    pub tts_api_base_url: String,
    /// TTS model identifier
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Primary SearXNG instance URL
    #[serde(default = "default_searxng_url")]
    pub searxng_url: String,

    /// Directory for generated images
    #[serde(default = "default_images_dir")]
    pub generated_images_dir: String,
    /// Directory for generated videos
    #[serde(default = "default_videos_dir")]
    pub generated_videos_dir: String,
    /// Directory for synthesized speech files
    #[serde(default = "default_tts_dir")]
    pub tts_cache_dir: String,

    /// Seconds between video task status polls
    #[serde(default = "default_poll_interval_secs")]
    pub video_poll_interval_secs: u64,
    /// Maximum number of status polls before a task times out
    #[serde(default = "default_max_poll_attempts")]
    pub video_max_poll_attempts: u32,
    /// Consecutive status-check failures tolerated before aborting a task
    #[serde(default = "default_max_transient_poll_errors")]
    pub max_transient_poll_errors: u32,
    /// Size ceiling for downloaded artifacts, in bytes
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
    /// HTTP timeout for remote generation calls, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_ai_api_base_url() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_ai_model() -> String {
    "mistralai/Mistral-7B-Instruct-v0.3".to_string()
}

fn default_tts_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_searxng_url() -> String {
    "https://searx.be".to_string()
}

fn default_images_dir() -> String {
    "generated_images".to_string()
}

fn default_videos_dir() -> String {
    "generated_videos".to_string()
}

fn default_tts_dir() -> String {
    "tts_cache".to_string()
}

const fn default_poll_interval_secs() -> u64 {
    10
}

const fn default_max_poll_attempts() -> u32 {
    30
}

const fn default_max_transient_poll_errors() -> u32 {
    10
}

const fn default_max_artifact_bytes() -> u64 {
    50 * 1024 * 1024
}

const fn default_http_timeout_secs() -> u64 {
    120
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oxide_media_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to
            // snake_case; ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check API key env vars directly if config didn't pick
        // them up (automatic mapping behavior differs between sources)
        if settings.stability_api_key.is_none() {
            settings.stability_api_key = non_empty_env("STABILITY_API_KEY");
        }
        if settings.pollo_api_key.is_none() {
            settings.pollo_api_key = non_empty_env("POLLO_API_KEY");
        }
        if settings.tts_api_key.is_none() {
            settings.tts_api_key = non_empty_env("TTS_API_KEY");
        }

        Ok(settings)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Stability AI SDXL text-to-image endpoint
pub const STABILITY_API_URL: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image";

/// Pollo.ai Sora 2 task creation endpoint
pub const POLLO_CREATE_URL: &str = "https://pollo.ai/api/platform/generation/sora/sora-2";

/// Pollo.ai task status endpoint prefix; the task id is appended
pub const POLLO_TASKS_URL: &str = "https://pollo.ai/api/platform/tasks/";

/// Video lengths accepted by the upstream model, in seconds.
/// Out-of-range requests are snapped to the nearest value.
pub const ALLOWED_VIDEO_LENGTHS: [u32; 3] = [4, 8, 12];

/// Public SearXNG instances tried in order when the primary refuses
/// the connection
pub const SEARCH_FALLBACK_INSTANCES: &[&str] = &[
    "https://searx.be",
    "https://search.ononoki.org",
    "https://searx.tuxcloud.net",
    "https://search.us.projectsegfau.lt",
];

/// Maximum number of search results returned per query
pub const SEARCH_MAX_RESULTS: usize = 8;

/// Ceiling on the formatted search output, in characters
pub const SEARCH_OUTPUT_MAX_CHARS: usize = 3500;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Tests touch process-global env vars, so each uses distinct names
    #[test]
    fn test_defaults_applied() -> Result<(), Box<dyn std::error::Error>> {
        let settings = Settings::new()?;
        assert_eq!(settings.video_poll_interval_secs, 10);
        assert_eq!(settings.video_max_poll_attempts, 30);
        assert_eq!(settings.max_artifact_bytes, 50 * 1024 * 1024);
        assert_eq!(settings.generated_videos_dir, "generated_videos");
        Ok(())
    }

    #[test]
    fn test_api_key_env_fallback() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("POLLO_API_KEY", "pk-test");
        let settings = Settings::new()?;
        assert_eq!(settings.pollo_api_key.as_deref(), Some("pk-test"));
        env::remove_var("POLLO_API_KEY");

        // Empty value is treated as unset
        env::set_var("STABILITY_API_KEY", "");
        let settings = Settings::new()?;
        assert_eq!(settings.stability_api_key, None);
        env::remove_var("STABILITY_API_KEY");
        Ok(())
    }
}
