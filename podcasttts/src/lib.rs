//! Resumable podcast TTS for Rust.
//!
//! Renders a two-speaker dialogue script into one audio file over the
//! Volcengine podcast TTS WebSocket API (V3 binary protocol).
//!
//! # Features
//!
//! - Script conversion: host/guest segments to voice-tagged `nlp_texts`
//! - Session client: handshake, streaming receive loop, guaranteed close
//! - Resume: failed attempts restart from the last finished round
//! - Atomic artifact write: temporary file plus rename, never a partial file
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dailycast_podcasttts::{Client, DialogueScript, PodcastOptions, Segment};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder("your-app-id")
//!         .access_key("your-access-key")
//!         .build()?;
//!
//!     let script = DialogueScript::new(vec![
//!         Segment::new("host", "Welcome"),
//!         Segment::new("guest", "Thanks"),
//!     ]);
//!     let result = client
//!         .podcast()
//!         .synthesize(&script, &PodcastOptions::default(), "podcast.mp3".as_ref())
//!         .await?;
//!
//!     println!("{} rounds, {} bytes", result.rounds, result.bytes);
//!     Ok(())
//! }
//! ```

mod assembler;
mod client;
mod error;
mod payload;
pub mod protocol;
mod round;
mod script;
mod session;
mod synthesizer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{persist_audio, AssembledRound, AudioAssembler};
pub use client::{
    generate_id, Client, ClientBuilder, APP_KEY_PODCAST, DEFAULT_BACKOFF, DEFAULT_ENDPOINT,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT, RESOURCE_PODCAST,
};
pub use error::{Error, Result};
pub use payload::{
    decode_event, AudioConfig, FailureEvent, InputInfo, PodcastEndEvent, PodcastMetaInfo,
    PodcastRequest, RetryInfo, RoundEndEvent, RoundStartEvent, SpeakerInfo, ACTION_DIALOGUE,
};
pub use round::{
    ClosedRound, RoundKind, RoundStatus, RoundTracker, HEAD_MUSIC_ROUND, TAIL_MUSIC_ROUND,
};
pub use script::{
    convert_script, DialogueScript, NlpText, Segment, VoiceMap, DEFAULT_GUEST_VOICE,
    DEFAULT_HOST_VOICE, ROLE_GUEST, ROLE_HOST,
};
pub use session::{run_attempt, AttemptReport, SessionState};
pub use synthesizer::{
    build_request, PodcastOptions, PodcastSynthesizer, RenderedPodcast, RetryState,
    SynthesisResult,
};
pub use transport::{ConnectHeaders, Connector, FrameTransport, WsConnector};
