//! Build-scoped audio accumulation and artifact persistence.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Error, Result};

/// Placement of one completed round inside the assembled audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembledRound {
    pub round_id: i32,
    pub offset: usize,
    pub len: usize,
}

/// Accumulates completed rounds for one build, across every attempt.
///
/// Rounds are appended in the order they complete and are never reordered.
#[derive(Debug, Default)]
pub struct AudioAssembler {
    audio: Vec<u8>,
    rounds: Vec<AssembledRound>,
}

impl AudioAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed round.
    pub fn append(&mut self, round_id: i32, bytes: &[u8]) {
        self.rounds.push(AssembledRound {
            round_id,
            offset: self.audio.len(),
            len: bytes.len(),
        });
        self.audio.extend_from_slice(bytes);
    }

    /// Total audio bytes.
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    /// Completed rounds in completion order.
    pub fn rounds(&self) -> &[AssembledRound] {
        &self.rounds
    }

    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    /// Writes the audio to `path` through a temporary file in the same
    /// directory, then renames it into place.
    pub fn persist(&self, path: &Path) -> Result<PathBuf> {
        persist_audio(&self.audio, path)
    }
}

/// Atomically writes `audio` to `path`, creating parent directories.
pub fn persist_audio(audio: &[u8], path: &Path) -> Result<PathBuf> {
    if audio.is_empty() {
        return Err(Error::NoAudioProduced);
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(audio)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    info!("audio saved: {} ({} bytes)", path.display(), audio.len());
    Ok(path.to_path_buf())
}
