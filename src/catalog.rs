use crate::error::{PlayerError, Result};
use crate::model::{Track, TrackId};
use std::path::PathBuf;
use std::time::Duration;

/// Ordered playlist. Insertion order is playback order.
///
/// Every structural change (add, remove, clear) bumps `version`, which the
/// controller compares against the last version it reconciled.
#[derive(Debug, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
    next_id: u64,
    version: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf, title: String) -> usize {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        self.tracks.push(Track {
            id,
            path,
            title,
            duration: None,
        });
        self.version += 1;
        self.tracks.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Result<TrackId> {
        if index >= self.tracks.len() {
            return Err(PlayerError::IndexOutOfRange {
                index,
                len: self.tracks.len(),
            });
        }
        let removed = self.tracks.remove(index);
        self.version += 1;
        Ok(removed.id)
    }

    pub fn clear(&mut self) -> Vec<TrackId> {
        let removed = self.tracks.drain(..).map(|track| track.id).collect();
        self.version += 1;
        removed
    }

    pub fn get(&self, index: usize) -> Result<&Track> {
        self.tracks.get(index).ok_or(PlayerError::IndexOutOfRange {
            index,
            len: self.tracks.len(),
        })
    }

    pub fn by_id(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|track| track.id == id)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn record_duration(&mut self, id: TrackId, duration: Duration) {
        if let Some(track) = self.tracks.iter_mut().find(|track| track.id == id) {
            track.duration = Some(duration);
        }
    }

    /// Fills in what a header probe found. A duration already recorded from
    /// the engine wins. Returns `false` if the entry is gone.
    pub fn apply_info(&mut self, id: TrackId, title: String, duration: Option<Duration>) -> bool {
        let Some(track) = self.tracks.iter_mut().find(|track| track.id == id) else {
            return false;
        };
        track.title = title;
        if track.duration.is_none() {
            track.duration = duration;
        }
        true
    }

    pub fn size(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.tracks.iter().map(|track| track.path.clone()).collect()
    }
}
