use oxide_media_bot::config::Settings;
use oxide_media_bot::http::create_http_client;
use oxide_media_bot::services::{ChatMode, ChatService, ImageService, TtsService, VoicePreset};
use serde_json::json;
use std::path::Path;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_settings(base_url: &str, media_dir: &Path) -> Settings {
    Settings {
        ai_api_base_url: format!("{base_url}/v1"),
        ai_model: "test-model".to_string(),
        stability_api_key: Some("sk-stability".to_string()),
        pollo_api_key: None,
        tts_api_key: Some("sk-tts".to_string()),
        tts_api_base_url: format!("{base_url}/v1"),
        tts_model: "tts-1".to_string(),
        searxng_url: base_url.to_string(),
        generated_images_dir: media_dir.join("img").to_string_lossy().into_owned(),
        generated_videos_dir: media_dir.join("vid").to_string_lossy().into_owned(),
        tts_cache_dir: media_dir.join("tts").to_string_lossy().into_owned(),
        video_poll_interval_secs: 10,
        video_max_poll_attempts: 30,
        max_transient_poll_errors: 10,
        max_artifact_bytes: 1024 * 1024,
        http_timeout_secs: 5,
    }
}

#[tokio::test]
async fn identical_prompts_issue_one_upstream_call() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "test-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "  The red fox.  "}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = ChatService::new(&settings, create_http_client(5));

    let first = chat.generate("what is a fox", 7, ChatMode::Helpful).await;
    assert_eq!(first, "The red fox.");
    let second = chat.generate("what is a fox", 7, ChatMode::Helpful).await;
    assert_eq!(second, first);
}

#[tokio::test]
async fn chat_failure_returns_fallback_text() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let chat = ChatService::new(&settings, create_http_client(5));
    let reply = chat.generate("hello", 7, ChatMode::Helpful).await;
    assert_eq!(reply, "AI сейчас недоступен. Попробуй позже.");
}

#[tokio::test]
async fn chat_timeout_returns_timeout_text() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(3))
                .set_body_json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "late"}}]
                })),
        )
        .mount(&server)
        .await;

    // Client deadline well below the response delay
    let chat = ChatService::new(&settings, create_http_client(1));
    let reply = chat.generate("hello", 7, ChatMode::Helpful).await;
    assert_eq!(reply, "AI слишком долго думает. Упрости вопрос или попробуй позже.");
}

#[tokio::test]
async fn chat_malformed_response_returns_generic_error_text() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    // Success status but no choices array
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "error"})))
        .mount(&server)
        .await;

    let chat = ChatService::new(&settings, create_http_client(5));
    let reply = chat.generate("hello", 7, ChatMode::Helpful).await;
    assert_eq!(reply, "Временная ошибка AI. Попробуй позже.");
}

#[tokio::test]
async fn different_modes_are_cached_separately() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "answer"}}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let chat = ChatService::new(&settings, create_http_client(5));
    chat.generate("hello", 7, ChatMode::Helpful).await;
    chat.generate("hello", 7, ChatMode::Rude).await;
}

#[tokio::test]
async fn image_is_decoded_from_base64_and_cached() {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    let png_bytes = b"\x89PNG\r\n\x1a\nfakepng".to_vec();
    Mock::given(method("POST"))
        .and(path("/v1/generation/text-to-image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{"base64": STANDARD.encode(&png_bytes)}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let image = ImageService::new(&settings, create_http_client(5))
        .with_endpoint(format!("{}/v1/generation/text-to-image", server.uri()));

    let first = image.generate("A Fox", 7, None).await;
    let local = first.expect("generation should produce a file");
    assert_eq!(std::fs::read(&local).expect("read image"), png_bytes);

    // Prompt casing is normalized, so this hits the cache
    let second = image.generate("a fox", 7, None).await;
    assert_eq!(second, Some(local));
}

#[tokio::test]
async fn distinct_prompts_in_same_second_write_distinct_files() {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    Mock::given(method("POST"))
        .and(path("/v1/generation/text-to-image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{"base64": STANDARD.encode(b"fakepng")}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let image = ImageService::new(&settings, create_http_client(5))
        .with_endpoint(format!("{}/v1/generation/text-to-image", server.uri()));

    // Back to back, so both land in the same timestamp second
    let first = image.generate("a red fox", 7, None).await;
    let second = image.generate("a blue wolf", 7, None).await;

    let first = first.expect("first generation");
    let second = second.expect("second generation");
    assert_ne!(first, second, "distinct prompts overwrote the same file");
    assert!(first.exists());
    assert!(second.exists());
    let name = first.file_name().map(|n| n.to_string_lossy().into_owned());
    assert!(name.is_some_and(|n| n.starts_with("gen_7_") && n.ends_with(".png")));
}

#[tokio::test]
async fn image_without_key_is_disabled() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut settings = test_settings(&server.uri(), tmp.path());
    settings.stability_api_key = None;

    let image = ImageService::new(&settings, create_http_client(5));
    assert_eq!(image.generate("a fox", 7, None).await, None);
}

#[tokio::test]
async fn tts_writes_audio_and_rejects_empty_payload() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fake-mp3-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let tts = TtsService::new(&settings, create_http_client(5));

    let path = tts.synthesize("привет", 7, VoicePreset::Normal).await;
    let path = path.expect("synthesis should produce a file");
    assert!(path.exists());
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    assert!(name.is_some_and(|n| n.starts_with("tts_7_") && n.ends_with(".mp3")));

    // Cached: no second upstream call for the identical request
    let again = tts.synthesize("привет", 7, VoicePreset::Normal).await;
    assert_eq!(again, Some(path));
}

#[tokio::test]
async fn tts_empty_body_is_a_failure() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(&server.uri(), tmp.path());

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::new()))
        .mount(&server)
        .await;

    let tts = TtsService::new(&settings, create_http_client(5));
    let result = tts.synthesize("hi", 7, VoicePreset::Fast).await;
    assert_eq!(result, None);
    // No zero-byte file left behind
    let dir = Path::new(&settings.tts_cache_dir);
    let entries = std::fs::read_dir(dir).map_or(0, |d| d.count());
    assert_eq!(entries, 0);
}
