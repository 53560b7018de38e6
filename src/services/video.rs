//! Video generation via Pollo.ai (Sora 2)
//!
//! The long-running path: create a task, poll its status at a fixed
//! interval, then stream the finished video to disk. Task creation and
//! status checks live in [`PolloClient`]; the loop itself is the generic
//! [`JobPoller`]. Results are cached per full parameter set.

use crate::cache::DEFAULT_CAPACITY;
use crate::config::{Settings, ALLOWED_VIDEO_LENGTHS, POLLO_CREATE_URL, POLLO_TASKS_URL};
use crate::dedupe::RequestDeduper;
use crate::fetch::ResultFetcher;
use crate::http::{clean_error_body, get_json, post_json};
use crate::poller::{
    map_remote_status, JobApi, JobHandle, JobOutcome, JobPoller, PollReply,
};
use crate::services::ServiceError;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Pollo.ai task API client.
pub struct PolloClient {
    client: HttpClient,
    api_key: String,
    create_url: String,
    tasks_url: String,
}

impl PolloClient {
    #[must_use]
    pub fn new(client: HttpClient, api_key: String) -> Self {
        Self {
            client,
            api_key,
            create_url: POLLO_CREATE_URL.to_string(),
            tasks_url: POLLO_TASKS_URL.to_string(),
        }
    }

    /// Overrides the endpoints, for tests against a mock server.
    #[must_use]
    pub fn with_endpoints(mut self, create_url: String, tasks_url: String) -> Self {
        self.create_url = create_url;
        self.tasks_url = tasks_url;
        self
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [
            ("x-api-key", self.api_key.as_str()),
            ("Content-Type", "application/json"),
        ]
    }
}

#[async_trait]
impl JobApi for PolloClient {
    async fn submit(&self, params: &Value) -> Result<JobHandle, ServiceError> {
        let response = post_json(&self.client, &self.create_url, params, &self.headers()).await?;

        let task_id = response["taskId"].as_str().ok_or_else(|| {
            ServiceError::MalformedResponse("no taskId in creation response".to_string())
        })?;

        info!(task_id, "video task created");
        Ok(JobHandle {
            id: task_id.to_string(),
        })
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollReply, ServiceError> {
        let url = format!("{}{}", self.tasks_url, handle.id);
        let response = get_json(&self.client, &url, &self.headers()).await?;

        let raw_status = response["status"].as_str().unwrap_or("");
        let status = map_remote_status(raw_status);

        // The artifact URL may appear flat or nested
        let artifact_url = response["video_url"]
            .as_str()
            .or_else(|| response["output"]["url"].as_str())
            .map(ToString::to_string);

        // On failure the whole reply body is the only diagnostic available
        let failure_detail = matches!(status, crate::poller::JobStatus::Failed)
            .then(|| clean_error_body(&response.to_string()));

        Ok(PollReply {
            status,
            artifact_url,
            failure_detail,
        })
    }
}

/// Caller-supplied video parameters.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    /// Optional source image for image-to-video
    pub image_url: Option<String>,
    /// Requested clip length in seconds; snapped to the allowed set
    pub length_secs: u32,
    pub aspect_ratio: String,
}

impl Default for VideoRequest {
    fn default() -> Self {
        Self {
            image_url: None,
            length_secs: 8,
            aspect_ratio: "16:9".to_string(),
        }
    }
}

/// Snaps a requested clip length to the nearest allowed value, ties
/// going to the smaller one. Lenient by contract: callers relying on
/// exact lengths must validate beforehand.
#[must_use]
pub fn snap_length(requested: u32) -> u32 {
    let mut best = ALLOWED_VIDEO_LENGTHS[0];
    for &allowed in &ALLOWED_VIDEO_LENGTHS {
        if allowed.abs_diff(requested) < best.abs_diff(requested) {
            best = allowed;
        }
    }
    best
}

/// End-to-end video generation pipeline.
pub struct VideoService {
    api: Option<PolloClient>,
    poller: JobPoller,
    fetcher: ResultFetcher,
    deduper: RequestDeduper,
}

impl VideoService {
    #[must_use]
    pub fn new(settings: &Settings, client: HttpClient) -> Self {
        let api = match &settings.pollo_api_key {
            Some(key) => Some(PolloClient::new(client.clone(), key.clone())),
            None => {
                warn!("Pollo.ai API key not set, video generation disabled");
                None
            }
        };

        Self {
            api,
            poller: JobPoller::new(
                Duration::from_secs(settings.video_poll_interval_secs),
                settings.video_max_poll_attempts,
                settings.max_transient_poll_errors,
            ),
            fetcher: ResultFetcher::new(
                client,
                &settings.generated_videos_dir,
                settings.max_artifact_bytes,
            ),
            deduper: RequestDeduper::new("videos", DEFAULT_CAPACITY),
        }
    }

    /// Replaces the task API client, for tests against a mock server.
    pub fn set_api(&mut self, api: PolloClient) {
        self.api = Some(api);
    }

    /// Replaces the poller, for tests that need fast intervals.
    pub fn set_poller(&mut self, poller: JobPoller) {
        self.poller = poller;
    }

    /// Generates a video for `prompt` and returns the local path, or
    /// `None` when the service is disabled or the pipeline failed.
    pub async fn generate(
        &self,
        prompt: &str,
        actor_id: i64,
        request: &VideoRequest,
    ) -> Option<PathBuf> {
        match self.generate_inner(prompt, actor_id, request).await {
            Ok(path) => Some(PathBuf::from(path)),
            Err(ServiceError::Unavailable(feature)) => {
                warn!(actor_id, feature, "video request on disabled service");
                None
            }
            Err(e) => {
                error!(actor_id, error = %e, "video generation failed");
                None
            }
        }
    }

    async fn generate_inner(
        &self,
        prompt: &str,
        actor_id: i64,
        request: &VideoRequest,
    ) -> Result<String, ServiceError> {
        let api = self
            .api
            .as_ref()
            .ok_or(ServiceError::Unavailable("video generation"))?;

        let length = snap_length(request.length_secs);
        if length != request.length_secs {
            warn!(
                requested = request.length_secs,
                snapped = length,
                "video length outside allowed set, snapped"
            );
        }

        let length_str = length.to_string();
        let image_part = request.image_url.clone().unwrap_or_default();
        let params = [
            ("prompt", prompt),
            ("length", length_str.as_str()),
            ("aspect", request.aspect_ratio.as_str()),
            ("image", image_part.as_str()),
        ];

        self.deduper
            .execute_if(
                "video",
                actor_id,
                &params,
                |path| Path::new(path).exists(),
                || self.run_pipeline(api, prompt, actor_id, request, length),
            )
            .await
    }

    async fn run_pipeline(
        &self,
        api: &PolloClient,
        prompt: &str,
        actor_id: i64,
        request: &VideoRequest,
        length: u32,
    ) -> Result<String, ServiceError> {
        let mut input = json!({
            "prompt": prompt,
            "length": length,
            "aspectRatio": request.aspect_ratio,
        });
        if let Some(image_url) = &request.image_url {
            input["image"] = json!(image_url);
        }
        let payload = json!({ "input": input });

        let handle = api.submit(&payload).await?;

        match self.poller.wait(api, &handle).await {
            JobOutcome::Succeeded { artifact_url } => {
                let path = self
                    .fetcher
                    .fetch(&artifact_url, "sora2", actor_id, "mp4")
                    .await?;
                Ok(path.to_string_lossy().into_owned())
            }
            JobOutcome::Failed { detail } => Err(ServiceError::JobFailed(detail)),
            JobOutcome::TimedOut => Err(ServiceError::Timeout {
                attempts: self.poller.max_attempts(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_length_to_nearest_allowed() {
        assert_eq!(snap_length(7), 8);
        assert_eq!(snap_length(5), 4);
        assert_eq!(snap_length(4), 4);
        assert_eq!(snap_length(12), 12);
        assert_eq!(snap_length(100), 12);
        assert_eq!(snap_length(0), 4);
        // Equidistant snaps down
        assert_eq!(snap_length(6), 4);
        assert_eq!(snap_length(10), 8);
    }
}
