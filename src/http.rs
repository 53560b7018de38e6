//! HTTP utilities shared by the remote service clients
//!
//! Centralizes request/response handling so the individual services
//! don't each reimplement status checks and error-body cleanup.

use crate::services::ServiceError;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

/// Maximum error-body length carried in a [`ServiceError::Remote`].
const ERROR_BODY_MAX_CHARS: usize = 500;

/// Creates an HTTP client with the given request timeout.
///
/// Prevents infinite hangs when an upstream API is slow or unresponsive.
#[must_use]
pub fn create_http_client(timeout_secs: u64) -> HttpClient {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends a JSON POST request and returns the parsed JSON response.
///
/// # Errors
///
/// Returns `ServiceError::Network` on connectivity issues,
/// `ServiceError::RequestTimeout` when the request deadline elapses,
/// `ServiceError::Remote` on non-success status codes, or
/// `ServiceError::MalformedResponse` if the body is not valid JSON.
pub async fn post_json(
    client: &HttpClient,
    url: &str,
    body: &Value,
    headers: &[(&str, &str)],
) -> Result<Value, ServiceError> {
    let mut request = client.post(url).json(body);
    for (key, value) in headers {
        request = request.header(*key, *value);
    }

    parse_json_response(request.send().await?).await
}

/// Sends a GET request and returns the parsed JSON response.
///
/// # Errors
///
/// Same taxonomy as [`post_json`].
pub async fn get_json(
    client: &HttpClient,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<Value, ServiceError> {
    let mut request = client.get(url);
    for (key, value) in headers {
        request = request.header(*key, *value);
    }

    parse_json_response(request.send().await?).await
}

async fn parse_json_response(response: reqwest::Response) -> Result<Value, ServiceError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| ServiceError::MalformedResponse(e.to_string()))
}

/// Converts a non-success response into a [`ServiceError::Remote`] with a
/// diagnosable, bounded body.
pub async fn error_from_response(response: reqwest::Response) -> ServiceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ServiceError::Remote {
        status,
        body: clean_error_body(&body),
    }
}

/// Truncates an error body and collapses HTML error pages from proxies
/// so raw markup never lands in logs or user-facing diagnostics.
#[must_use]
pub fn clean_error_body(body: &str) -> String {
    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return "(server returned HTML error page)".to_string();
    }

    crate::utils::truncate_str(body, ERROR_BODY_MAX_CHARS)
}

/// Extracts a string from a JSON response by navigating a path of keys
/// and numeric indices.
///
/// ```ignore
/// // For chat completions: ["choices", "0", "message", "content"]
/// let content = extract_text_content(&response, &["choices", "0", "message", "content"])?;
/// ```
///
/// # Errors
///
/// Returns `ServiceError::MalformedResponse` if the path is missing or the
/// target is not a string.
pub fn extract_text_content(response: &Value, path: &[&str]) -> Result<String, ServiceError> {
    let mut current = response;

    for segment in path {
        current = if let Ok(index) = segment.parse::<usize>() {
            current.get(index).ok_or_else(|| {
                ServiceError::MalformedResponse(format!("missing index {index} in response"))
            })?
        } else {
            current.get(*segment).ok_or_else(|| {
                ServiceError::MalformedResponse(format!("missing key {segment} in response"))
            })?
        };
    }

    current
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            ServiceError::MalformedResponse(format!("expected string at path, got: {current:?}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_text_content_nested() {
        let response = json!({
            "choices": [{"message": {"content": "hello"}}]
        });
        let content = extract_text_content(&response, &["choices", "0", "message", "content"]);
        assert_eq!(content.ok(), Some("hello".to_string()));
    }

    #[test]
    fn test_extract_text_content_missing_key() {
        let response = json!({"choices": []});
        let result = extract_text_content(&response, &["choices", "0", "message"]);
        assert!(matches!(result, Err(ServiceError::MalformedResponse(_))));
    }

    #[test]
    fn test_clean_error_body_truncates() {
        let body = "x".repeat(600);
        let cleaned = clean_error_body(&body);
        assert!(cleaned.chars().count() <= 503);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn test_clean_error_body_hides_html() {
        let cleaned = clean_error_body("<!DOCTYPE html><html>502 Bad Gateway</html>");
        assert!(!cleaned.contains("<html"));
    }
}
