//! Speech synthesis
//!
//! Single request/response against an OpenAI-compatible `/audio/speech`
//! endpoint returning the audio bytes directly. Presets select voice and
//! speaking speed; identical requests per actor come from the cache.

use crate::cache::DEFAULT_CAPACITY;
use crate::config::Settings;
use crate::dedupe::RequestDeduper;
use crate::http::error_from_response;
use crate::services::ServiceError;
use reqwest::Client as HttpClient;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Voice/speed preset selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePreset {
    Normal,
    Fast,
    Calm,
}

impl VoicePreset {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Fast => "fast",
            Self::Calm => "calm",
        }
    }

    const fn voice(self) -> &'static str {
        match self {
            Self::Normal | Self::Calm => "nova",
            Self::Fast => "onyx",
        }
    }

    const fn speed(self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Fast => 1.25,
            Self::Calm => 0.85,
        }
    }
}

/// Client for the speech synthesis API.
pub struct TtsService {
    client: HttpClient,
    api_key: Option<String>,
    url: String,
    model: String,
    out_dir: PathBuf,
    deduper: RequestDeduper,
}

impl TtsService {
    #[must_use]
    pub fn new(settings: &Settings, client: HttpClient) -> Self {
        if settings.tts_api_key.is_none() {
            warn!("TTS API key not set, speech synthesis disabled");
        }
        Self {
            client,
            api_key: settings.tts_api_key.clone(),
            url: format!(
                "{}/audio/speech",
                settings.tts_api_base_url.trim_end_matches('/')
            ),
            model: settings.tts_model.clone(),
            out_dir: PathBuf::from(&settings.tts_cache_dir),
            deduper: RequestDeduper::new("tts", DEFAULT_CAPACITY),
        }
    }

    /// Synthesizes `text` and returns the local audio path, or `None`
    /// when the service is disabled or the upstream call failed.
    pub async fn synthesize(
        &self,
        text: &str,
        actor_id: i64,
        preset: VoicePreset,
    ) -> Option<PathBuf> {
        match self.synthesize_inner(text, actor_id, preset).await {
            Ok(path) => Some(PathBuf::from(path)),
            Err(ServiceError::Unavailable(feature)) => {
                warn!(actor_id, feature, "TTS request on disabled service");
                None
            }
            Err(e) => {
                error!(actor_id, error = %e, "speech synthesis failed");
                None
            }
        }
    }

    async fn synthesize_inner(
        &self,
        text: &str,
        actor_id: i64,
        preset: VoicePreset,
    ) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ServiceError::Unavailable("speech synthesis"))?;

        let params = [("text", text), ("preset", preset.as_str())];

        self.deduper
            .execute_if(
                "tts",
                actor_id,
                &params,
                |path| Path::new(path).exists(),
                || self.request_speech(text, actor_id, preset, api_key),
            )
            .await
    }

    async fn request_speech(
        &self,
        text: &str,
        actor_id: i64,
        preset: VoicePreset,
        api_key: &str,
    ) -> Result<String, ServiceError> {
        info!(actor_id, preset = preset.as_str(), "requesting speech synthesis");

        let payload = json!({
            "model": self.model,
            "input": text,
            "voice": preset.voice(),
            "speed": preset.speed(),
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ServiceError::MalformedResponse(
                "empty audio payload".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.out_dir).await?;
        let token = Uuid::new_v4().simple().to_string();
        let path = self
            .out_dir
            .join(format!("tts_{actor_id}_{}.mp3", &token[..8]));
        tokio::fs::write(&path, &audio).await?;

        info!(path = %path.display(), voice = preset.voice(), "speech saved");
        Ok(path.to_string_lossy().into_owned())
    }
}
