//! Resumable podcast synthesis.
//!
//! A build runs up to `max_attempts` session attempts. Every attempt after
//! the first session reuses the task id and tells the server which round
//! finished last, so the server resumes instead of starting over. Audio
//! from all attempts accumulates in one [`AudioAssembler`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::assembler::AudioAssembler;
use crate::client::{generate_id, ClientConfig};
use crate::error::{Error, Result};
use crate::payload::{
    AudioConfig, InputInfo, PodcastRequest, RetryInfo, SpeakerInfo, ACTION_DIALOGUE,
};
use crate::round::RoundTracker;
use crate::script::{convert_script, DialogueScript, VoiceMap};
use crate::session::run_attempt;

/// Per-build synthesis options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PodcastOptions {
    /// Role to voice mapping.
    pub voices: VoiceMap,
    pub audio_config: AudioConfig,
    /// Prepend intro music (round -1).
    pub use_head_music: bool,
    /// Append outro music (round 9999).
    pub use_tail_music: bool,
}

/// Cross-attempt checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Set once some attempt reached SessionStarted.
    pub task_id: Option<String>,
    /// -1 until a round completes.
    pub last_finished_round_id: i32,
    pub attempts_remaining: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            task_id: None,
            last_finished_round_id: -1,
            attempts_remaining: max_attempts,
        }
    }

    /// Resume info for the next attempt, if the server knows a task.
    pub fn resume_info(&self) -> Option<RetryInfo> {
        self.task_id.as_ref().map(|task_id| RetryInfo {
            retry_task_id: task_id.clone(),
            last_finished_round_id: self.last_finished_round_id,
        })
    }
}

/// Audio of a finished build, not yet written anywhere.
#[derive(Debug)]
pub struct RenderedPodcast {
    pub task_id: String,
    pub attempts: u32,
    pub audio: AudioAssembler,
}

/// Summary of a persisted build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisResult {
    pub task_id: String,
    pub attempts: u32,
    pub rounds: usize,
    pub bytes: usize,
    pub path: PathBuf,
}

/// Builds the first attempt's StartSession request.
///
/// Fails with [`Error::EmptyScript`] before any I/O.
pub fn build_request(script: &DialogueScript, opts: &PodcastOptions) -> Result<PodcastRequest> {
    let nlp_texts = convert_script(script, &opts.voices)?;
    Ok(PodcastRequest {
        input_id: format!("podcast_{}", chrono::Utc::now().timestamp()),
        nlp_texts,
        action: ACTION_DIALOGUE,
        use_head_music: opts.use_head_music,
        use_tail_music: opts.use_tail_music,
        input_info: InputInfo::default(),
        speaker_info: SpeakerInfo::default(),
        audio_config: opts.audio_config.clone(),
        retry_info: None,
    })
}

/// Podcast synthesis service.
pub struct PodcastSynthesizer {
    config: Arc<ClientConfig>,
}

impl PodcastSynthesizer {
    pub(crate) fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }

    /// Synthesizes `script` and writes the audio to `path`.
    pub async fn synthesize(
        &self,
        script: &DialogueScript,
        opts: &PodcastOptions,
        path: &Path,
    ) -> Result<SynthesisResult> {
        self.synthesize_with_cancel(script, opts, path, &CancellationToken::new())
            .await
    }

    /// Like [`synthesize`](Self::synthesize), stopping between attempts once
    /// `cancel` fires.
    pub async fn synthesize_with_cancel(
        &self,
        script: &DialogueScript,
        opts: &PodcastOptions,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<SynthesisResult> {
        let rendered = self.render(script, opts, cancel).await?;
        let path = rendered.audio.persist(path)?;

        Ok(SynthesisResult {
            task_id: rendered.task_id,
            attempts: rendered.attempts,
            rounds: rendered.audio.rounds().len(),
            bytes: rendered.audio.len(),
            path,
        })
    }

    /// Runs attempts until one finishes cleanly and returns the audio.
    pub async fn render(
        &self,
        script: &DialogueScript,
        opts: &PodcastOptions,
        cancel: &CancellationToken,
    ) -> Result<RenderedPodcast> {
        let mut request = build_request(script, opts)?;
        let config = &self.config;

        let mut state = RetryState::new(config.max_attempts);
        let mut tracker = RoundTracker::new();
        let mut audio = AudioAssembler::new();
        let mut attempts = 0;
        let mut last_error = None;

        info!(
            "synthesizing {} segments (input_id={})",
            request.nlp_texts.len(),
            request.input_id
        );

        while state.attempts_remaining > 0 {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            state.attempts_remaining -= 1;
            attempts += 1;

            let session_id = generate_id();
            request.retry_info = state.resume_info();
            if let Some(retry) = &request.retry_info {
                warn!(
                    "resuming task {} after round {} (attempt {}/{})",
                    retry.retry_task_id,
                    retry.last_finished_round_id,
                    attempts,
                    config.max_attempts
                );
            }

            let report = run_attempt(
                config.connector.as_ref(),
                &config.connect_headers(),
                &request,
                &session_id,
                config.timeout,
                &mut tracker,
                &mut audio,
            )
            .await;

            if report.session_started && state.task_id.is_none() {
                state.task_id = Some(session_id.clone());
            }
            state.last_finished_round_id = tracker.last_finished().unwrap_or(-1);

            let err = match report.error {
                None => {
                    if audio.is_empty() {
                        return Err(Error::NoAudioProduced);
                    }
                    let task_id = state.task_id.unwrap_or(session_id);
                    info!(
                        "synthesis finished: {} rounds, {} bytes, {} attempt(s) (task_id={})",
                        audio.rounds().len(),
                        audio.len(),
                        attempts,
                        task_id
                    );
                    return Ok(RenderedPodcast {
                        task_id,
                        attempts,
                        audio,
                    });
                }
                Some(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            let cause = if err.is_connection_error() {
                "lost connection"
            } else {
                "failed"
            };
            warn!(
                "attempt {}/{} {} after {} new rounds: {}",
                attempts, config.max_attempts, cause, report.rounds_completed, err
            );
            last_error = Some(err);

            if state.attempts_remaining == 0 {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(config.backoff) => {}
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        if audio.is_empty() {
            error!("no audio after {} attempts: {}", attempts, last_error);
            return Err(Error::NoAudioProduced);
        }
        error!(
            "giving up after {} attempts with {} rounds assembled: {}",
            attempts,
            audio.rounds().len(),
            last_error
        );
        Err(Error::SynthesisIncomplete {
            attempts,
            last_error,
        })
    }
}
