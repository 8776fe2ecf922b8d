//! JSON payloads exchanged with the podcast endpoint.
//!
//! Outgoing: the `StartSession` request. Incoming: one typed record per
//! server event that carries JSON. Incoming records are decoded strictly;
//! a missing required field is a decode error, not a default.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::script::NlpText;

/// `action` value selecting multi-speaker scripted synthesis from `nlp_texts`.
pub const ACTION_DIALOGUE: i32 = 3;

// ================== Request Types ==================

/// StartSession payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodcastRequest {
    /// Unique per build.
    pub input_id: String,
    /// Ordered speaking turns.
    pub nlp_texts: Vec<NlpText>,
    /// Synthesis mode.
    pub action: i32,
    pub use_head_music: bool,
    pub use_tail_music: bool,
    pub input_info: InputInfo,
    pub speaker_info: SpeakerInfo,
    pub audio_config: AudioConfig,
    /// Present only on resume attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_info: Option<RetryInfo>,
}

/// Input source options. Scripted synthesis leaves the URL empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfo {
    pub input_url: String,
    pub return_audio_url: bool,
    pub only_nlp_text: bool,
}

/// Speaker ordering options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub random_order: bool,
}

/// Output audio configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio format (`mp3`, `wav`, `pcm`, `ogg_opus`).
    #[serde(default = "default_format")]
    pub format: String,
    /// Sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: i32,
    /// Speech rate offset, 0 is normal speed.
    #[serde(default)]
    pub speech_rate: i32,
}

fn default_format() -> String {
    "mp3".to_string()
}

fn default_sample_rate() -> i32 {
    24000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            sample_rate: default_sample_rate(),
            speech_rate: 0,
        }
    }
}

/// Resume checkpoint attached to every attempt after the first session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    pub retry_task_id: String,
    pub last_finished_round_id: i32,
}

// ================== Event Payloads ==================

/// `PodcastRoundStart` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoundStartEvent {
    pub round_id: i32,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// `PodcastRoundEnd` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoundEndEvent {
    #[serde(default)]
    pub is_error: Option<bool>,
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub audio_duration: Option<f64>,
}

impl RoundEndEvent {
    /// Returns true if the server flagged the round as failed.
    pub fn failed(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

/// `PodcastEnd` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PodcastEndEvent {
    #[serde(default)]
    pub meta_info: Option<PodcastMetaInfo>,
}

/// Metadata delivered with `PodcastEnd`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PodcastMetaInfo {
    #[serde(default)]
    pub audio_url: Option<String>,
}

/// `SessionFailed` and JSON error frame payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailureEvent {
    #[serde(default, alias = "status_code")]
    pub code: Option<i64>,
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}

/// Decodes an event payload into its typed record.
pub fn decode_event<T: DeserializeOwned>(event: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| {
        Error::Decode(format!(
            "{} payload: {} ({})",
            event,
            e,
            String::from_utf8_lossy(&payload[..payload.len().min(200)])
        ))
    })
}
