//! Media, speech-to-text and summarization boundaries
//!
//! The telephony platform, STT service and summarizer are external
//! collaborators; this module only defines the contracts the router drives
//! them through, plus `RecordingService`, which owns the bounded polling,
//! download retries and transcription timeout around them.

use crate::config::RecordingConfig;
use crate::error::{Result, RouteError};
use crate::store::{ConversationLog, EgressRegistry};
use crate::types::{EgressRecord, EgressStatus};
use async_trait::async_trait;
use std::sync::Arc;

/// Recording (egress) side of the telephony platform
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Start a composite recording of `room`, returning the egress id
    async fn start_recording(&self, room: &str) -> Result<String>;

    /// Ask the platform to stop an egress; it may still be finalizing
    async fn stop_recording(&self, egress_id: &str) -> Result<EgressStatus>;

    /// Current state of an egress
    async fn egress_status(&self, egress_id: &str) -> Result<EgressStatus>;

    /// Fetch a finished recording, returning a local artifact reference
    async fn download(&self, location: &str, room: &str) -> Result<String>;
}

/// Speech-to-text service
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, artifact: &str) -> Result<String>;
}

/// Transcript summarizer (best-effort)
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<String>;
}

/// Drives recordings from start to a transcribed conversation segment
pub struct RecordingService {
    platform: Arc<dyn MediaPlatform>,
    stt: Arc<dyn SpeechToText>,
    egress: Arc<dyn EgressRegistry>,
    conversations: Arc<dyn ConversationLog>,
    config: RecordingConfig,
}

impl RecordingService {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        stt: Arc<dyn SpeechToText>,
        egress: Arc<dyn EgressRegistry>,
        conversations: Arc<dyn ConversationLog>,
        config: RecordingConfig,
    ) -> Self {
        Self {
            platform,
            stt,
            egress,
            conversations,
            config,
        }
    }

    /// Start recording `room`
    ///
    /// Rejected with `RecordingActive` while the room already has one.
    pub async fn start(&self, room: &str) -> Result<EgressRecord> {
        if let Some(existing) = self.egress.get(room).await? {
            return Err(RouteError::RecordingActive {
                room: room.to_string(),
                egress_id: existing.egress_id,
            });
        }

        let egress_id = self.platform.start_recording(room).await?;
        match self.egress.register(room, &egress_id).await {
            Ok(record) => {
                tracing::info!(room = %room, egress_id = %egress_id, "Recording started");
                Ok(record)
            }
            Err(e) => {
                // Lost a race with another start for the same room
                if let Err(stop_err) = self.platform.stop_recording(&egress_id).await {
                    tracing::warn!(
                        room = %room,
                        egress_id = %egress_id,
                        error = %stop_err,
                        "Failed to stop duplicate recording"
                    );
                }
                Err(e)
            }
        }
    }

    /// Stop the room's recording and fetch the artifact
    ///
    /// Polls the platform a bounded number of times for a terminal state,
    /// then downloads with linear backoff. The egress mapping is kept until
    /// the artifact is fetched, so a failed stop can be retried without
    /// losing the recording.
    pub async fn stop(&self, room: &str) -> Result<String> {
        let record = self
            .egress
            .get(room)
            .await?
            .ok_or_else(|| RouteError::NotFound(format!("No recording for room {}", room)))?;
        let egress_id = record.egress_id;

        tracing::info!(room = %room, egress_id = %egress_id, "Stopping recording");
        let mut status = match self.platform.stop_recording(&egress_id).await {
            Ok(status) => status,
            Err(e) => match self.platform.egress_status(&egress_id).await {
                // Stopped by an earlier attempt
                Ok(status) if status.is_terminal() => {
                    tracing::warn!(
                        egress_id = %egress_id,
                        error = %e,
                        "Stop rejected, egress already finished"
                    );
                    status
                }
                _ => return Err(e),
            },
        };

        let mut polls = 0;
        while !status.is_terminal() && polls < self.config.stop_poll_attempts {
            tokio::time::sleep(self.config.stop_poll_interval()).await;
            polls += 1;
            match self.platform.egress_status(&egress_id).await {
                Ok(current) => status = current,
                Err(e) => tracing::warn!(
                    egress_id = %egress_id,
                    attempt = polls,
                    error = %e,
                    "Could not check egress status"
                ),
            }
        }

        match status {
            EgressStatus::Completed { location } => {
                let artifact = self.download(&location, room).await?;
                self.egress.clear(room).await?;
                Ok(artifact)
            }
            EgressStatus::Failed { reason } => {
                self.egress.clear(room).await?;
                Err(RouteError::upstream("recording", reason))
            }
            EgressStatus::Active => Err(RouteError::Timeout(format!(
                "egress {} still active after {} status checks",
                egress_id, polls
            ))),
        }
    }

    async fn download(&self, location: &str, room: &str) -> Result<String> {
        let attempts = self.config.download_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.platform.download(location, room).await {
                Ok(artifact) => {
                    tracing::info!(room = %room, artifact = %artifact, "Recording saved");
                    return Ok(artifact);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        room = %room,
                        attempt,
                        error = %e,
                        "Recording download failed, retrying"
                    );
                    tokio::time::sleep(self.config.download_backoff(attempt)).await;
                }
                Err(e) => {
                    return Err(RouteError::upstream(
                        "recording download",
                        format!("failed after {} attempts: {}", attempts, e),
                    ));
                }
            }
        }
    }

    /// Transcribe `artifact` and append non-blank text to the pair's log
    pub async fn transcribe_into(
        &self,
        artifact: &str,
        customer_id: &str,
        agent_id: &str,
    ) -> Result<String> {
        let timeout = self.config.transcription_timeout();
        let text = tokio::time::timeout(timeout, self.stt.transcribe(artifact))
            .await
            .map_err(|_| {
                RouteError::Timeout(format!(
                    "transcription of {} exceeded {}s",
                    artifact,
                    timeout.as_secs()
                ))
            })??;

        if text.trim().is_empty() {
            tracing::warn!(artifact = %artifact, "Transcription returned no text");
        } else {
            self.conversations.append(customer_id, agent_id, &text).await?;
            tracing::info!(
                customer_id = %customer_id,
                agent_id = %agent_id,
                chars = text.len(),
                "Transcript segment saved"
            );
        }
        Ok(text)
    }

    /// Platform status of the room's recording, if one is registered
    pub async fn status(&self, room: &str) -> Result<Option<EgressStatus>> {
        match self.egress.get(room).await? {
            Some(record) => Ok(Some(self.platform.egress_status(&record.egress_id).await?)),
            None => Ok(None),
        }
    }

    /// Whether the room has a registered recording
    pub async fn is_recording(&self, room: &str) -> Result<bool> {
        Ok(self.egress.get(room).await?.is_some())
    }
}
