//! Generic asynchronous job polling
//!
//! Submit/poll/fetch state machine for remote job APIs: submit a task,
//! poll its status at a fixed interval until a terminal state or the
//! attempt budget runs out, then hand the artifact reference back to the
//! caller. Remote status vocabularies are normalized through an explicit
//! mapping table; unknown statuses keep polling instead of crashing.

use crate::services::ServiceError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Normalized job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    /// Remote status outside the known vocabulary; treated as
    /// "continue polling".
    Unknown,
}

impl JobStatus {
    /// Whether polling stops at this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Maps a remote status string onto the internal vocabulary.
#[must_use]
pub fn map_remote_status(raw: &str) -> JobStatus {
    match raw.to_ascii_lowercase().as_str() {
        "pending" | "waiting" | "queued" => JobStatus::Pending,
        "processing" | "running" => JobStatus::Processing,
        "succeed" | "succeeded" | "success" => JobStatus::Succeeded,
        "failed" | "error" => JobStatus::Failed,
        _ => JobStatus::Unknown,
    }
}

/// Handle to a submitted remote job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Identifier assigned by the remote service; opaque.
    pub id: String,
}

/// One poll response, already normalized.
#[derive(Debug, Clone)]
pub struct PollReply {
    pub status: JobStatus,
    /// Artifact location, present only on success.
    pub artifact_url: Option<String>,
    /// Remote-supplied failure detail, present only on failure.
    pub failure_detail: Option<String>,
}

/// Seam between the poll loop and a concrete remote job API.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Submits a creation request and returns the job handle.
    ///
    /// # Errors
    ///
    /// Fails when the API is unreachable, returns a non-success status,
    /// or the response lacks a job identifier.
    async fn submit(&self, params: &Value) -> Result<JobHandle, ServiceError>;

    /// Issues one status request for the job.
    ///
    /// # Errors
    ///
    /// Fails on network or status-endpoint errors; the poll loop treats
    /// these as transient up to a cap.
    async fn poll(&self, handle: &JobHandle) -> Result<PollReply, ServiceError>;
}

/// Final outcome of waiting on a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { artifact_url: String },
    Failed { detail: String },
    TimedOut,
}

/// Fixed-interval poll loop with an attempt budget.
#[derive(Debug, Clone)]
pub struct JobPoller {
    poll_interval: Duration,
    max_attempts: u32,
    max_transient_errors: u32,
}

impl JobPoller {
    /// Creates a poller. `max_transient_errors` caps *consecutive*
    /// status-check failures; a successful poll resets the counter.
    #[must_use]
    pub const fn new(
        poll_interval: Duration,
        max_attempts: u32,
        max_transient_errors: u32,
    ) -> Self {
        Self {
            poll_interval,
            max_attempts,
            max_transient_errors,
        }
    }

    /// Polls until a terminal status or until `max_attempts` is
    /// exhausted. Each attempt sleeps the poll interval first, matching
    /// the latency profile of the upstream APIs (a task is never done
    /// immediately after submission).
    ///
    /// A `succeeded` reply without an artifact URL is classified as
    /// `Failed` — malformed success is not success. Remote failure detail
    /// is carried in the outcome for diagnostics; no automatic resubmit.
    pub async fn wait<A: JobApi + ?Sized>(&self, api: &A, handle: &JobHandle) -> JobOutcome {
        let mut transient_errors: u32 = 0;

        for attempt in 1..=self.max_attempts {
            sleep(self.poll_interval).await;

            let reply = match api.poll(handle).await {
                Ok(reply) => {
                    transient_errors = 0;
                    reply
                }
                Err(e) => {
                    transient_errors += 1;
                    warn!(
                        job_id = %handle.id,
                        attempt,
                        transient_errors,
                        error = %e,
                        "status check failed, continuing"
                    );
                    if transient_errors >= self.max_transient_errors {
                        return JobOutcome::Failed {
                            detail: format!(
                                "status endpoint failed {transient_errors} times in a row: {e}"
                            ),
                        };
                    }
                    continue;
                }
            };

            info!(job_id = %handle.id, attempt, status = ?reply.status, "job status");

            match reply.status {
                JobStatus::Succeeded => {
                    return reply.artifact_url.map_or_else(
                        || {
                            warn!(job_id = %handle.id, "succeeded reply carries no artifact URL");
                            JobOutcome::Failed {
                                detail: "succeeded without artifact reference".to_string(),
                            }
                        },
                        |artifact_url| JobOutcome::Succeeded { artifact_url },
                    );
                }
                JobStatus::Failed => {
                    return JobOutcome::Failed {
                        detail: reply
                            .failure_detail
                            .unwrap_or_else(|| "no failure detail supplied".to_string()),
                    };
                }
                JobStatus::Pending | JobStatus::Processing | JobStatus::Unknown => {}
            }
        }

        warn!(
            job_id = %handle.id,
            attempts = self.max_attempts,
            "job did not reach a terminal state"
        );
        JobOutcome::TimedOut
    }

    /// Total attempt budget, for timeout reporting.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
