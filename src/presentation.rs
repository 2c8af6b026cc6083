use crate::model::{PlaybackStatus, RepeatMode, TrackId};
use crate::waveform::Waveform;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRow {
    pub id: TrackId,
    pub title: String,
    pub duration: Option<Duration>,
}

/// Everything a front-end needs to draw the player, pushed after every
/// processed event and every position tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub status: PlaybackStatus,
    pub current_track: Option<TrackId>,
    pub current_index: Option<usize>,
    pub title: Option<String>,
    pub elapsed: Duration,
    pub remaining: Duration,
    pub duration: Option<Duration>,
    pub scrub_fraction: f64,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub volume: u8,
    pub waveform: Option<Arc<Waveform>>,
    pub error_message: Option<String>,
    pub warning: Option<String>,
    pub tracks: Arc<[TrackRow]>,
}

impl Snapshot {
    pub fn elapsed_label(&self) -> String {
        format_clock(self.elapsed)
    }

    pub fn remaining_label(&self) -> String {
        format!("-{}", format_clock(self.remaining))
    }
}

pub trait PresentationSink {
    fn present(&mut self, snapshot: &Snapshot);
}

/// Forwards snapshots over a channel to whoever draws them.
pub struct ChannelSink {
    tx: Sender<Snapshot>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Snapshot>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl PresentationSink for ChannelSink {
    fn present(&mut self, snapshot: &Snapshot) {
        let _ = self.tx.send(snapshot.clone());
    }
}

/// Drops every snapshot.
pub struct DiscardSink;

impl PresentationSink for DiscardSink {
    fn present(&mut self, _snapshot: &Snapshot) {}
}

/// `mm:ss`, minutes keep counting past 59.
pub fn format_clock(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

/// Drains a snapshot receiver and keeps only the newest one.
pub fn latest(rx: &Receiver<Snapshot>) -> Option<Snapshot> {
    let mut newest = None;
    while let Ok(snapshot) = rx.try_recv() {
        newest = Some(snapshot);
    }
    newest
}
