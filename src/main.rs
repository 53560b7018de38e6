use anyhow::Result;
use dotenvy::dotenv;
use oxide_media_bot::config::Settings;
use oxide_media_bot::services::{ChatMode, SearchQuery, Services, VideoRequest, VoicePreset};
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting credentials from log output
struct RedactionPatterns {
    bearer: Regex,
    api_key_header: Regex,
    key_assignment: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bearer: Regex::new(r"Bearer [A-Za-z0-9._~+/-]+=*")?,
            api_key_header: Regex::new(r#"(?i)(x-api-key["':=\s]+)[A-Za-z0-9._-]+"#)?,
            key_assignment: Regex::new(r"(?i)([A-Z0-9_]*API_KEY=)[^\s&]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self.bearer.replace_all(&output, "Bearer [MASKED]").to_string();
        output = self
            .api_key_header
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .key_assignment
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length to satisfy the contract even though
        // the redacted string may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting oxide-media-bot core...");

    let settings = Settings::new()?;
    let services = Services::new(&settings);
    let actor_id: i64 = std::env::var("OPERATOR_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    info!("Services initialized, reading commands from stdin");
    println!("Commands: /ask /rude /img /video /tts /search /quit");

    run_repl(&services, actor_id).await
}

/// Thin line-oriented adapter around the core. The real platform layer
/// (chat command handlers) calls the same service functions.
async fn run_repl(services: &Services, actor_id: i64) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "/quit" => break,
            "" => {}
            _ if rest.is_empty() => println!("Usage: {command} <text>"),
            _ => dispatch(services, actor_id, command, rest).await,
        }
    }

    Ok(())
}

async fn dispatch(services: &Services, actor_id: i64, command: &str, rest: &str) {
    match command {
        "/ask" => {
            println!("{}", services.chat.generate(rest, actor_id, ChatMode::Helpful).await);
        }
        "/rude" => {
            println!("{}", services.chat.generate(rest, actor_id, ChatMode::Rude).await);
        }
        "/img" => {
            match services.image.generate(rest, actor_id, None).await {
                Some(path) => println!("Image saved: {}", path.display()),
                None => println!("Image generation failed or disabled."),
            }
        }
        "/video" => {
            let request = VideoRequest::default();
            match services.video.generate(rest, actor_id, &request).await {
                Some(path) => println!("Video saved: {}", path.display()),
                None => println!("Video generation failed or disabled."),
            }
        }
        "/tts" => {
            match services.tts.synthesize(rest, actor_id, VoicePreset::Normal).await {
                Some(path) => println!("Audio saved: {}", path.display()),
                None => println!("Speech synthesis failed or disabled."),
            }
        }
        "/search" => {
            println!(
                "{}",
                services
                    .search
                    .search_with_retry(rest, &SearchQuery::default())
                    .await
            );
        }
        _ => println!("Unknown command: {command}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction_masks_credentials() -> Result<(), regex::Error> {
        let patterns = RedactionPatterns::new()?;
        let redacted =
            patterns.redact("Authorization: Bearer sk-abc123, x-api-key: pk-9f8e7d, STABILITY_API_KEY=secret");
        assert!(!redacted.contains("sk-abc123"));
        assert!(!redacted.contains("pk-9f8e7d"));
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("[MASKED]"));
        Ok(())
    }
}
