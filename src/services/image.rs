//! Image generation via Stability AI
//!
//! Single synchronous request/response against the SDXL text-to-image
//! endpoint; the artifact comes back base64-encoded inside the JSON body
//! and is persisted under the images directory. Repeated prompts per
//! actor are served from the image cache.

use crate::cache::DEFAULT_CAPACITY;
use crate::config::{Settings, STABILITY_API_URL};
use crate::dedupe::RequestDeduper;
use crate::http::post_json;
use crate::services::ServiceError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

const NEGATIVE_PROMPT: &str = "blurry, bad anatomy, extra limbs, low quality, artifact";

/// Client for the Stability AI text-to-image API.
pub struct ImageService {
    client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    out_dir: PathBuf,
    deduper: RequestDeduper,
}

impl ImageService {
    #[must_use]
    pub fn new(settings: &Settings, client: HttpClient) -> Self {
        if settings.stability_api_key.is_none() {
            warn!("Stability AI API key not set, image generation disabled");
        }
        Self {
            client,
            api_key: settings.stability_api_key.clone(),
            api_url: STABILITY_API_URL.to_string(),
            out_dir: PathBuf::from(&settings.generated_images_dir),
            deduper: RequestDeduper::new("images", DEFAULT_CAPACITY),
        }
    }

    /// Overrides the endpoint, for tests against a mock server.
    #[must_use]
    pub fn with_endpoint(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }

    /// Generates an image for `prompt` and returns the local path, or
    /// `None` when the service is disabled or the upstream call failed.
    pub async fn generate(&self, prompt: &str, actor_id: i64, seed: Option<u64>) -> Option<PathBuf> {
        match self.generate_inner(prompt, actor_id, seed).await {
            Ok(path) => Some(PathBuf::from(path)),
            Err(ServiceError::Unavailable(feature)) => {
                warn!(actor_id, feature, "image request on disabled service");
                None
            }
            Err(e) => {
                error!(actor_id, error = %e, "image generation failed");
                None
            }
        }
    }

    async fn generate_inner(
        &self,
        prompt: &str,
        actor_id: i64,
        seed: Option<u64>,
    ) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ServiceError::Unavailable("image generation"))?;

        // Same prompt in different casing should hit the same entry
        let normalized = prompt.to_lowercase();
        let seed_str = seed.map(|s| s.to_string()).unwrap_or_default();
        let params = [("prompt", normalized.as_str()), ("seed", seed_str.as_str())];

        self.deduper
            .execute_if(
                "image",
                actor_id,
                &params,
                |path| Path::new(path).exists(),
                || self.request_image(prompt, actor_id, seed, api_key),
            )
            .await
    }

    async fn request_image(
        &self,
        prompt: &str,
        actor_id: i64,
        seed: Option<u64>,
        api_key: &str,
    ) -> Result<String, ServiceError> {
        info!(actor_id, "requesting image generation");

        let mut payload = json!({
            "text_prompts": [
                {"text": prompt, "weight": 1.0},
                {"text": NEGATIVE_PROMPT, "weight": -1.0}
            ],
            "cfg_scale": 7,
            "height": 1024,
            "width": 1024,
            "samples": 1,
            "steps": 30,
            "style_preset": "digital-art"
        });
        if let Some(seed) = seed {
            payload["seed"] = json!(seed);
        }

        let auth = format!("Bearer {api_key}");
        let headers = [("Accept", "application/json"), ("Authorization", auth.as_str())];
        let response = post_json(&self.client, &self.api_url, &payload, &headers).await?;

        let image_b64 = response["artifacts"][0]["base64"]
            .as_str()
            .ok_or_else(|| {
                ServiceError::MalformedResponse("no base64 artifact in response".to_string())
            })?;
        let image_bytes = BASE64
            .decode(image_b64)
            .map_err(|e| ServiceError::MalformedResponse(format!("invalid base64: {e}")))?;

        tokio::fs::create_dir_all(&self.out_dir).await?;
        // Timestamp alone collides when one actor generates twice within
        // a second; the random suffix keeps writers from overwriting
        // each other
        let token = Uuid::new_v4().simple().to_string();
        let filename = format!(
            "gen_{actor_id}_{}_{}.png",
            chrono::Utc::now().timestamp(),
            &token[..8]
        );
        let path = self.out_dir.join(filename);
        tokio::fs::write(&path, &image_bytes).await?;

        info!(path = %path.display(), "image saved");
        Ok(path.to_string_lossy().into_owned())
    }
}
