//! Synthesis round tracking.
//!
//! The server announces each round with `PodcastRoundStart`, streams its
//! audio, and closes it with `PodcastRoundEnd`. Only successfully closed
//! rounds reach the [`AudioAssembler`]; a round still open when an attempt
//! ends is discarded.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::assembler::AudioAssembler;
use crate::error::{Error, Result};

/// Round id of the head-music pseudo-round.
pub const HEAD_MUSIC_ROUND: i32 = -1;
/// Round id of the tail-music pseudo-round.
pub const TAIL_MUSIC_ROUND: i32 = 9999;

/// What a round carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundKind {
    HeadMusic,
    Dialogue,
    TailMusic,
}

impl RoundKind {
    pub fn of(round_id: i32) -> Self {
        match round_id {
            HEAD_MUSIC_ROUND => RoundKind::HeadMusic,
            TAIL_MUSIC_ROUND => RoundKind::TailMusic,
            _ => RoundKind::Dialogue,
        }
    }
}

/// Round lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    Open,
    ClosedSuccess,
    ClosedError,
}

#[derive(Debug)]
struct OpenRound {
    id: i32,
    voice: String,
    audio: Vec<u8>,
}

/// Outcome of closing a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedRound {
    pub round_id: i32,
    pub status: RoundStatus,
    pub bytes: usize,
    /// True if the round had already been assembled by an earlier attempt.
    pub duplicate: bool,
}

/// Tracks the open round and the build's completion checkpoint.
///
/// One tracker lives for the whole build; [`RoundTracker::discard_open`]
/// is called when an attempt ends.
#[derive(Debug, Default)]
pub struct RoundTracker {
    open: Option<OpenRound>,
    last_finished: Option<i32>,
    completed: HashSet<i32>,
}

impl RoundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a round announced by the server.
    pub fn open(&mut self, round_id: i32, speaker: Option<&str>) -> Result<()> {
        if let Some(open) = &self.open {
            return Err(Error::Protocol(format!(
                "round {} started while round {} is open",
                round_id, open.id
            )));
        }

        let voice = match RoundKind::of(round_id) {
            RoundKind::HeadMusic => "head_music".to_string(),
            RoundKind::TailMusic => "tail_music".to_string(),
            RoundKind::Dialogue => speaker.unwrap_or("unknown").to_string(),
        };
        info!("round {} started: {}", round_id, voice);

        self.open = Some(OpenRound {
            id: round_id,
            voice,
            audio: Vec::new(),
        });
        Ok(())
    }

    /// Appends audio to the open round.
    pub fn append(&mut self, chunk: &[u8]) -> Result<()> {
        match &mut self.open {
            Some(open) => {
                open.audio.extend_from_slice(chunk);
                Ok(())
            }
            None => Err(Error::Protocol(format!(
                "{} audio bytes received outside a round",
                chunk.len()
            ))),
        }
    }

    /// Closes the open round successfully and hands its audio to the assembler.
    pub fn close_success(&mut self, assembler: &mut AudioAssembler) -> Result<ClosedRound> {
        let round = self
            .open
            .take()
            .ok_or_else(|| Error::Protocol("round end without an open round".to_string()))?;

        let duplicate = !self.completed.insert(round.id);
        if duplicate {
            warn!(
                "round {} was already assembled; dropping {} resent bytes",
                round.id,
                round.audio.len()
            );
        } else {
            assembler.append(round.id, &round.audio);
            info!(
                "round {} completed: {} ({} bytes)",
                round.id,
                round.voice,
                round.audio.len()
            );
        }
        self.last_finished = Some(round.id);

        Ok(ClosedRound {
            round_id: round.id,
            status: RoundStatus::ClosedSuccess,
            bytes: round.audio.len(),
            duplicate,
        })
    }

    /// Closes the open round as failed, dropping its audio.
    pub fn close_error(&mut self) -> Result<ClosedRound> {
        let round = self
            .open
            .take()
            .ok_or_else(|| Error::Protocol("round end without an open round".to_string()))?;

        Ok(ClosedRound {
            round_id: round.id,
            status: RoundStatus::ClosedError,
            bytes: round.audio.len(),
            duplicate: false,
        })
    }

    /// Drops the open round, if any, returning its id and buffered size.
    pub fn discard_open(&mut self) -> Option<(i32, usize)> {
        self.open.take().map(|r| (r.id, r.audio.len()))
    }

    /// Id of the open round.
    pub fn open_round(&self) -> Option<i32> {
        self.open.as_ref().map(|r| r.id)
    }

    /// Id of the most recently completed round in this build.
    pub fn last_finished(&self) -> Option<i32> {
        self.last_finished
    }
}
