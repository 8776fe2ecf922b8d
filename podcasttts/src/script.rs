//! Dialogue scripts and their conversion to `nlp_texts`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Host role name.
pub const ROLE_HOST: &str = "host";
/// Guest role name.
pub const ROLE_GUEST: &str = "guest";

/// Default host voice.
pub const DEFAULT_HOST_VOICE: &str = "zh_male_dayixiansheng_v2_saturn_bigtts";
/// Default guest voice.
pub const DEFAULT_GUEST_VOICE: &str = "zh_female_mizaitongxue_v2_saturn_bigtts";

/// An ordered two-speaker transcript.
///
/// Deserializes from `{"segments": [{"speaker": "host", "text": "..."}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueScript {
    #[serde(default)]
    pub segments: Vec<Segment>,
}

/// One speaking turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Speaker role, usually `host` or `guest`.
    #[serde(rename = "speaker", default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub text: String,
}

fn default_role() -> String {
    ROLE_HOST.to_string()
}

impl Segment {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }
}

impl DialogueScript {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromIterator<Segment> for DialogueScript {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Role to voice-identifier mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceMap(HashMap<String, String>);

impl Default for VoiceMap {
    fn default() -> Self {
        Self::new()
            .with(ROLE_HOST, DEFAULT_HOST_VOICE)
            .with(ROLE_GUEST, DEFAULT_GUEST_VOICE)
    }
}

impl VoiceMap {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Adds or replaces the voice for a role.
    pub fn with(mut self, role: impl Into<String>, voice: impl Into<String>) -> Self {
        self.0.insert(role.into(), voice.into());
        self
    }

    /// Returns the voice for `role`, or `role` itself when unmapped.
    pub fn voice_for<'a>(&'a self, role: &'a str) -> &'a str {
        self.0.get(role).map(String::as_str).unwrap_or(role)
    }
}

/// One request-level speaking turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlpText {
    pub text: String,
    /// Voice identifier.
    pub speaker: String,
}

/// Converts a script into `nlp_texts`, one entry per segment, in order.
pub fn convert_script(script: &DialogueScript, voices: &VoiceMap) -> Result<Vec<NlpText>> {
    if script.is_empty() {
        return Err(Error::EmptyScript);
    }

    Ok(script
        .segments
        .iter()
        .map(|seg| NlpText {
            text: seg.text.clone(),
            speaker: voices.voice_for(&seg.role).to_string(),
        })
        .collect())
}
