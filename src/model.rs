use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Stable identity of a catalog entry. Survives re-indexing on removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    pub path: PathBuf,
    pub title: String,
    /// From the file headers on import, otherwise from the first load.
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "REPEAT",
            Self::One => "REPEAT (ONE)",
            Self::All => "REPEAT (ALL)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackMode {
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    /// Transient: resolved into `Loading` or `Stopped` before the next snapshot.
    Ended,
}

impl PlaybackStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Playing => "PLAYING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
            Self::Ended => "ENDED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: RepeatMode,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default = "default_autoplay_on_select")]
    pub autoplay_on_select: bool,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_waveform_bins")]
    pub waveform_bins: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub playlist: Vec<PathBuf>,
}

fn default_volume() -> u8 {
    70
}

fn default_autoplay_on_select() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    300
}

fn default_waveform_bins() -> usize {
    200
}

fn default_log_level() -> String {
    String::from("info")
}

impl PersistedState {
    pub fn playback_mode(&self) -> PlaybackMode {
        PlaybackMode {
            shuffle: self.shuffle,
            repeat: self.repeat,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.clamp(16, 5_000))
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            shuffle: false,
            repeat: RepeatMode::Off,
            volume: default_volume(),
            autoplay_on_select: default_autoplay_on_select(),
            tick_interval_ms: default_tick_interval_ms(),
            waveform_bins: default_waveform_bins(),
            log_level: default_log_level(),
            playlist: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_cycles_off_all_one() {
        assert_eq!(RepeatMode::Off.next(), RepeatMode::All);
        assert_eq!(RepeatMode::All.next(), RepeatMode::One);
        assert_eq!(RepeatMode::One.next(), RepeatMode::Off);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let state: PersistedState = serde_json::from_str(r#"{"shuffle":true}"#).expect("parse");
        assert!(state.shuffle);
        assert_eq!(state.repeat, RepeatMode::Off);
        assert_eq!(state.volume, 70);
        assert!(state.autoplay_on_select);
        assert_eq!(state.waveform_bins, 200);
        assert!(state.playlist.is_empty());
    }
}
