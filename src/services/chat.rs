//! Chat completion service
//!
//! Forwards prompts to an OpenAI-compatible `/chat/completions` endpoint
//! and deduplicates identical requests through the response cache. The
//! public entry point always returns text; failures surface as the
//! user-facing fallback strings, never as errors.

use crate::cache::DEFAULT_CAPACITY;
use crate::config::Settings;
use crate::dedupe::RequestDeduper;
use crate::http::{extract_text_content, post_json};
use crate::services::ServiceError;
use reqwest::Client as HttpClient;
use serde_json::json;
use tracing::{error, info};

const MAX_TOKENS: u32 = 1500;

const FALLBACK_UNAVAILABLE: &str = "AI сейчас недоступен. Попробуй позже.";
const FALLBACK_TIMEOUT: &str = "AI слишком долго думает. Упрости вопрос или попробуй позже.";
const FALLBACK_ERROR: &str = "Временная ошибка AI. Попробуй позже.";

/// Response persona selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Helpful,
    Rude,
}

impl ChatMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::Rude => "rude",
        }
    }

    const fn system_prompt(self) -> &'static str {
        match self {
            Self::Helpful => {
                "You are a helpful, detailed and friendly AI assistant. \
                 Answer in the same language as the user's question. \
                 Be clear, informative and kind."
            }
            Self::Rude => {
                "You are a sarcastic, rude and direct AI assistant called RudeGPT. \
                 Answer in the same language as the user's question. \
                 Use humor, sarcasm and be brutally honest."
            }
        }
    }

    // Rude mode runs slightly more creative
    const fn temperature(self) -> f64 {
        match self {
            Self::Helpful => 0.8,
            Self::Rude => 1.0,
        }
    }
}

/// Client for the chat completions API.
pub struct ChatService {
    client: HttpClient,
    url: String,
    model: String,
    deduper: RequestDeduper,
}

impl ChatService {
    #[must_use]
    pub fn new(settings: &Settings, client: HttpClient) -> Self {
        Self {
            client,
            url: format!(
                "{}/chat/completions",
                settings.ai_api_base_url.trim_end_matches('/')
            ),
            model: settings.ai_model.clone(),
            deduper: RequestDeduper::new("responses", DEFAULT_CAPACITY),
        }
    }

    /// Generates a response for `prompt`, serving repeats from the cache.
    /// Always returns text; on failure the text is a fallback message.
    pub async fn generate(&self, prompt: &str, actor_id: i64, mode: ChatMode) -> String {
        match self.generate_inner(prompt, actor_id, mode).await {
            Ok(text) => text,
            Err(e) => {
                error!(actor_id, mode = mode.as_str(), error = %e, "chat generation failed");
                match e {
                    ServiceError::RequestTimeout(_) => FALLBACK_TIMEOUT.to_string(),
                    ServiceError::Network(_) | ServiceError::Remote { .. } => {
                        FALLBACK_UNAVAILABLE.to_string()
                    }
                    _ => FALLBACK_ERROR.to_string(),
                }
            }
        }
    }

    async fn generate_inner(
        &self,
        prompt: &str,
        actor_id: i64,
        mode: ChatMode,
    ) -> Result<String, ServiceError> {
        let params = [("prompt", prompt), ("mode", mode.as_str())];

        self.deduper
            .execute("chat", actor_id, &params, || async {
                info!(actor_id, mode = mode.as_str(), "requesting chat completion");

                let payload = json!({
                    "model": self.model,
                    "messages": [
                        {"role": "system", "content": mode.system_prompt()},
                        {"role": "user", "content": prompt}
                    ],
                    "max_tokens": MAX_TOKENS,
                    "temperature": mode.temperature(),
                    "stream": false
                });

                let response = post_json(&self.client, &self.url, &payload, &[]).await?;
                let text =
                    extract_text_content(&response, &["choices", "0", "message", "content"])?;
                Ok(text.trim().to_string())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parameters() {
        assert_eq!(ChatMode::Helpful.as_str(), "helpful");
        assert!(ChatMode::Rude.system_prompt().contains("RudeGPT"));
        assert!(ChatMode::Rude.temperature() > ChatMode::Helpful.temperature());
    }
}
