//! Streamed artifact download
//!
//! Downloads a completed remote artifact to local storage in chunks,
//! without buffering the whole payload in memory. Filenames are scoped
//! by actor id plus a random suffix, so concurrent writers never
//! collide. The size ceiling is enforced during the streamed write
//! (upstream APIs don't announce sizes reliably); an oversized or
//! truncated transfer leaves no partial file behind.

use crate::services::ServiceError;
use futures_util::StreamExt;
use reqwest::Client as HttpClient;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

/// Downloads remote artifacts into one destination directory.
pub struct ResultFetcher {
    client: HttpClient,
    dest_dir: PathBuf,
    max_bytes: u64,
}

impl ResultFetcher {
    /// Creates a fetcher writing into `dest_dir`, rejecting artifacts
    /// larger than `max_bytes`.
    #[must_use]
    pub fn new(client: HttpClient, dest_dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            client,
            dest_dir: dest_dir.into(),
            max_bytes,
        }
    }

    /// Streams `remote_ref` to `"{prefix}_{actor_id}_{suffix}.{ext}"`
    /// under the destination directory and returns the local path.
    ///
    /// # Errors
    ///
    /// `ServiceError::Remote` on a non-success status,
    /// `ServiceError::Network` if the stream breaks mid-transfer,
    /// `ServiceError::MalformedResponse` if the body is shorter than the
    /// announced Content-Length, and `ServiceError::SizeLimit` when the
    /// transfer exceeds the ceiling. The partial file is removed in every
    /// failure case.
    pub async fn fetch(
        &self,
        remote_ref: &str,
        prefix: &str,
        actor_id: i64,
        ext: &str,
    ) -> Result<PathBuf, ServiceError> {
        let response = self.client.get(remote_ref).send().await?;

        if !response.status().is_success() {
            return Err(crate::http::error_from_response(response).await);
        }

        fs::create_dir_all(&self.dest_dir).await?;

        let token = Uuid::new_v4().simple().to_string();
        let filename = format!("{prefix}_{actor_id}_{}.{ext}", &token[..8]);
        let path = self.dest_dir.join(filename);

        let expected_len = response.content_length();
        match self.write_stream(response, &path).await {
            Ok(written) => {
                if let Some(expected) = expected_len {
                    if written != expected {
                        error!(
                            path = %path.display(),
                            written,
                            expected,
                            "download shorter than announced length"
                        );
                        remove_quietly(&path).await;
                        return Err(ServiceError::MalformedResponse(format!(
                            "truncated download: got {written} of {expected} bytes"
                        )));
                    }
                }
                info!(path = %path.display(), bytes = written, "artifact saved");
                Ok(path)
            }
            Err(e) => {
                remove_quietly(&path).await;
                Err(e)
            }
        }
    }

    async fn write_stream(
        &self,
        response: reqwest::Response,
        path: &Path,
    ) -> Result<u64, ServiceError> {
        let mut file = fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| ServiceError::Network(format!("stream terminated: {e}")))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(ServiceError::SizeLimit {
                    size: written,
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        Ok(written)
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            error!(path = %path.display(), error = %e, "failed to remove partial artifact");
        }
    }
}
