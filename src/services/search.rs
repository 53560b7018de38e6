//! Web search via SearXNG
//!
//! Queries a SearXNG instance's JSON API and formats the results for a
//! chat message. When the primary instance refuses the connection, an
//! ordered list of public fallback instances is tried until one answers
//! or all are exhausted.

use crate::config::{
    Settings, SEARCH_FALLBACK_INSTANCES, SEARCH_MAX_RESULTS, SEARCH_OUTPUT_MAX_CHARS,
};
use crate::services::ServiceError;
use crate::utils::truncate_str;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{debug, error, info, warn};

const SNIPPET_MAX_CHARS: usize = 247;
const URL_DISPLAY_MAX_CHARS: usize = 57;

/// Search filters; defaults mirror the SearXNG API defaults.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// 0 = off, 1 = moderate, 2 = strict
    pub safesearch: u8,
    /// "day", "week", "month", "year"
    pub time_range: Option<String>,
    pub language: String,
    pub categories: String,
    /// Comma-separated engine list, e.g. "google,duckduckgo"
    pub engines: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            safesearch: 1,
            time_range: None,
            language: "all".to_string(),
            categories: "general".to_string(),
            engines: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
    #[serde(default)]
    suggestions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "body")]
    content: Option<String>,
    #[serde(default, alias = "href")]
    url: Option<String>,
    #[serde(default)]
    engine: Option<String>,
}

/// Client for the SearXNG search API.
pub struct SearchService {
    client: HttpClient,
    instance_url: String,
    fallback_instances: Vec<String>,
    max_results: usize,
}

impl SearchService {
    #[must_use]
    pub fn new(settings: &Settings, client: HttpClient) -> Self {
        Self {
            client,
            instance_url: settings.searxng_url.trim_end_matches('/').to_string(),
            fallback_instances: SEARCH_FALLBACK_INSTANCES
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_results: SEARCH_MAX_RESULTS,
        }
    }

    /// Overrides the instance list, for tests against mock servers.
    #[must_use]
    pub fn with_instances(mut self, primary: String, fallbacks: Vec<String>) -> Self {
        self.instance_url = primary.trim_end_matches('/').to_string();
        self.fallback_instances = fallbacks;
        self
    }

    /// Runs a search and returns formatted results, or an error message
    /// suitable for direct display. Never returns an error.
    pub async fn search(&self, query: &str, opts: &SearchQuery) -> String {
        match self.fetch_results(query, opts).await {
            Ok(results) if results.is_empty() => "❌ No results found.".to_string(),
            Ok(results) => self.render(query, opts, &results),
            Err(e) => {
                error!(query, error = %e, "search failed");
                format!("❌ Search error: {e}")
            }
        }
    }

    /// Like [`search`](Self::search), retrying transient failures a
    /// bounded number of times at a fixed interval.
    pub async fn search_with_retry(&self, query: &str, opts: &SearchQuery) -> String {
        let strategy = FixedInterval::new(Duration::from_millis(500)).take(2);
        let outcome = Retry::spawn(strategy, || self.fetch_results(query, opts)).await;

        match outcome {
            Ok(results) if results.is_empty() => "❌ No results found.".to_string(),
            Ok(results) => self.render(query, opts, &results),
            Err(e) => {
                error!(query, error = %e, "search failed after retries");
                format!("❌ Search failed after multiple attempts: {e}")
            }
        }
    }

    async fn fetch_results(
        &self,
        query: &str,
        opts: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ServiceError> {
        let params = build_params(query, opts);

        match self.query_instance(&self.instance_url, &params).await {
            Ok(results) => Ok(results),
            Err(e @ (ServiceError::Network(_) | ServiceError::RequestTimeout(_))) => {
                warn!(instance = %self.instance_url, error = %e, "primary instance unreachable");
                self.try_fallbacks(&params).await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_fallbacks(
        &self,
        params: &[(&'static str, String)],
    ) -> Result<Vec<SearchResult>, ServiceError> {
        for instance in &self.fallback_instances {
            if *instance == self.instance_url {
                continue;
            }
            info!(instance = %instance, "trying fallback search instance");
            match self.query_instance(instance, params).await {
                Ok(results) => {
                    info!(instance = %instance, "fallback instance answered");
                    return Ok(results);
                }
                Err(e) => {
                    debug!(instance = %instance, error = %e, "fallback instance failed");
                }
            }
        }
        Err(ServiceError::Network(
            "all search instances are unavailable".to_string(),
        ))
    }

    async fn query_instance(
        &self,
        instance_url: &str,
        params: &[(&'static str, String)],
    ) -> Result<Vec<SearchResult>, ServiceError> {
        let endpoint = format!("{}/search", instance_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&endpoint)
            .query(params)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(crate::http::error_from_response(response).await);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        if body.results.is_empty() && !body.suggestions.is_empty() {
            let suggestions = body.suggestions.iter().take(3).cloned().collect::<Vec<_>>();
            return Ok(vec![SearchResult {
                title: Some("Did you mean:".to_string()),
                content: Some(suggestions.join(", ")),
                url: None,
                engine: Some("suggestion".to_string()),
            }]);
        }

        Ok(body.results.into_iter().take(self.max_results).collect())
    }

    fn render(&self, query: &str, opts: &SearchQuery, results: &[SearchResult]) -> String {
        let mut header = format!("🌐 Search results for: **{query}**");
        if let Some(range) = &opts.time_range {
            let _ = write!(header, " (last {range})");
        }

        let mut out = header;
        out.push_str("\n\n");
        for (i, result) in results.iter().enumerate() {
            out.push_str(&format_result(i + 1, result));
            out.push('\n');
        }

        truncate_str(out.trim_end(), SEARCH_OUTPUT_MAX_CHARS)
    }
}

fn build_params(query: &str, opts: &SearchQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", query.to_string()),
        ("format", "json".to_string()),
        ("safesearch", opts.safesearch.to_string()),
        ("language", opts.language.clone()),
        ("categories", opts.categories.clone()),
    ];
    if let Some(range) = &opts.time_range {
        params.push(("time_range", range.clone()));
    }
    if let Some(engines) = &opts.engines {
        params.push(("engines", engines.clone()));
    }
    params
}

fn format_result(index: usize, result: &SearchResult) -> String {
    let title = result.title.as_deref().unwrap_or("No title");
    let snippet = result
        .content
        .as_deref()
        .filter(|c| !c.is_empty())
        .map_or_else(
            || "No description available".to_string(),
            |c| truncate_str(c, SNIPPET_MAX_CHARS),
        );

    let mut text = format!("**{index}.** {title}");
    if let Some(engine) = result.engine.as_deref().filter(|e| !e.is_empty()) {
        let _ = write!(text, " (via {engine})");
    }
    let _ = write!(text, "\n{snippet}");
    if let Some(url) = result.url.as_deref().filter(|u| !u.is_empty()) {
        let _ = write!(text, "\n🔗 {}", truncate_str(url, URL_DISPLAY_MAX_CHARS));
    }
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, content: &str, url: &str, engine: &str) -> SearchResult {
        SearchResult {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            url: Some(url.to_string()),
            engine: Some(engine.to_string()),
        }
    }

    #[test]
    fn formats_numbered_entry_with_engine_and_url() {
        let text = format_result(
            1,
            &result("Rust", "A systems language", "https://rust-lang.org", "wikipedia"),
        );
        assert!(text.starts_with("**1.** Rust (via wikipedia)"));
        assert!(text.contains("A systems language"));
        assert!(text.contains("🔗 https://rust-lang.org"));
    }

    #[test]
    fn long_snippets_and_urls_are_truncated() {
        let text = format_result(
            2,
            &result("T", &"x".repeat(400), &format!("https://e.com/{}", "p".repeat(100)), ""),
        );
        assert!(text.contains(&format!("{}...", "x".repeat(247))));
        assert!(!text.contains(&"p".repeat(100)));
    }

    #[test]
    fn missing_fields_fall_back_to_placeholders() {
        let empty = SearchResult {
            title: None,
            content: None,
            url: None,
            engine: None,
        };
        let text = format_result(3, &empty);
        assert!(text.contains("No title"));
        assert!(text.contains("No description available"));
        assert!(!text.contains("🔗"));
    }

    #[test]
    fn body_and_href_aliases_deserialize() {
        let raw = r#"{"title":"T","body":"from body","href":"https://h","engine":"ddg"}"#;
        let parsed: SearchResult = serde_json::from_str(raw).expect("alias parse");
        assert_eq!(parsed.content.as_deref(), Some("from body"));
        assert_eq!(parsed.url.as_deref(), Some("https://h"));
    }

    #[test]
    fn params_include_optional_filters() {
        let opts = SearchQuery {
            time_range: Some("week".to_string()),
            engines: Some("google,bing".to_string()),
            ..SearchQuery::default()
        };
        let params = build_params("weather today", &opts);
        assert!(params.contains(&("q", "weather today".to_string())));
        assert!(params.contains(&("format", "json".to_string())));
        assert!(params.contains(&("time_range", "week".to_string())));
        assert!(params.contains(&("engines", "google,bing".to_string())));
    }
}
