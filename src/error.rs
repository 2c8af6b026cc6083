//! Error types for the playback core.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a playback engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// The stream could not be decoded, during load or mid-playback.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("seek failed: {0}")]
    Seek(String),
}

/// Failures reported by a waveform provider. Never fatal to playback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("failed to open {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("no audio samples in {}", .0.display())]
    Empty(PathBuf),
}

/// Rejections returned by `Controller::dispatch`.
///
/// Precondition failures leave the controller untouched. Engine failures are
/// turned into a `Stopped` state plus a user-visible message before they are
/// returned, so callers may ignore them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayerError {
    #[error("Playlist is empty")]
    EmptyCatalog,

    #[error("Track {index} is out of range (playlist has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("No track loaded")]
    NothingLoaded,

    #[error("Seek position {0} is outside 0..=1")]
    InvalidSeekFraction(f64),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
