//! Amplitude overviews for the waveform strip.
//!
//! Extraction is slow (it decodes the whole file) so it runs on one
//! long-lived worker thread and posts results back through the controller's
//! queue. Only the most recently requested track is worth decoding: queued
//! jobs for anything else are skipped. Results are cached per track identity
//! until the track leaves the catalog.

use crate::error::ExtractionError;
use crate::events::{Event, EventSender};
use crate::model::TrackId;
use rodio::{Decoder, Source};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

const FRAMES_PER_BLOCK: usize = 512;
const DEFAULT_RESOLUTION: usize = 2_000;
const NO_TRACK: u64 = u64::MAX;

/// Peak amplitude per time slice, each in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Waveform {
    amplitudes: Vec<f32>,
}

impl Waveform {
    pub fn new(amplitudes: Vec<f32>) -> Self {
        Self {
            amplitudes: amplitudes
                .into_iter()
                .map(|value| if value.is_finite() { value.abs() } else { 0.0 })
                .collect(),
        }
    }

    pub fn amplitudes(&self) -> &[f32] {
        &self.amplitudes
    }

    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Linearly interpolates onto `bins` points and scales so the loudest
    /// point is 1.0. Empty input gives a flat line.
    pub fn resample(&self, bins: usize) -> Vec<f32> {
        if bins == 0 {
            return Vec::new();
        }
        if self.amplitudes.is_empty() {
            return vec![0.0; bins];
        }

        let last = (self.amplitudes.len() - 1) as f32;
        let mut out: Vec<f32> = (0..bins)
            .map(|bin| {
                let at = if bins == 1 {
                    0.0
                } else {
                    bin as f32 * last / (bins - 1) as f32
                };
                let lower = at.floor() as usize;
                let upper = (lower + 1).min(self.amplitudes.len() - 1);
                let t = at - lower as f32;
                self.amplitudes[lower] * (1.0 - t) + self.amplitudes[upper] * t
            })
            .collect();

        let peak = out.iter().copied().fold(0.0_f32, f32::max).max(1e-9);
        for value in &mut out {
            *value /= peak;
        }
        out
    }
}

pub trait WaveformProvider: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Waveform, ExtractionError>;
}

/// Decodes the file with rodio and keeps the peak of each slice.
#[derive(Debug, Clone)]
pub struct DecodedWaveformProvider {
    resolution: usize,
}

impl DecodedWaveformProvider {
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution: resolution.max(1),
        }
    }
}

impl Default for DecodedWaveformProvider {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION)
    }
}

impl WaveformProvider for DecodedWaveformProvider {
    fn extract(&self, path: &Path) -> Result<Waveform, ExtractionError> {
        let file = File::open(path).map_err(|err| ExtractionError::Open {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let source = Decoder::try_from(file).map_err(|err| ExtractionError::Decode {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let channels = usize::from(source.channels().get()).max(1);
        let samples_per_block = channels * FRAMES_PER_BLOCK;

        let mut blocks = Vec::new();
        let mut peak = 0.0_f32;
        let mut in_block = 0_usize;
        for sample in source {
            let value = f32::from(sample).abs();
            if value.is_finite() && value > peak {
                peak = value;
            }
            in_block += 1;
            if in_block == samples_per_block {
                blocks.push(peak);
                peak = 0.0;
                in_block = 0;
            }
        }
        if in_block > 0 {
            blocks.push(peak);
        }

        if blocks.is_empty() {
            return Err(ExtractionError::Empty(path.to_path_buf()));
        }
        Ok(Waveform::new(bucket_peaks(&blocks, self.resolution)))
    }
}

/// Folds `values` into at most `buckets` slices, keeping each slice's peak.
pub fn bucket_peaks(values: &[f32], buckets: usize) -> Vec<f32> {
    if values.len() <= buckets || buckets == 0 {
        return values.to_vec();
    }
    (0..buckets)
        .map(|bucket| {
            let start = bucket * values.len() / buckets;
            let end = ((bucket + 1) * values.len() / buckets).max(start + 1);
            values[start..end.min(values.len())]
                .iter()
                .copied()
                .fold(0.0_f32, f32::max)
        })
        .collect()
}

struct Job {
    track: TrackId,
    path: PathBuf,
}

/// Per-session waveform cache in front of the extraction worker.
pub struct WaveformStore {
    cache: HashMap<TrackId, Arc<Waveform>>,
    pending: Option<TrackId>,
    wanted: Arc<AtomicU64>,
    jobs: Sender<Job>,
}

impl WaveformStore {
    /// Spawns the extraction worker. It exits once the store is dropped.
    pub fn new(provider: Arc<dyn WaveformProvider>, events: EventSender) -> Self {
        let (jobs, rx) = mpsc::channel();
        let wanted = Arc::new(AtomicU64::new(NO_TRACK));
        let worker_wanted = Arc::clone(&wanted);
        thread::spawn(move || extraction_loop(provider, rx, worker_wanted, events));

        Self {
            cache: HashMap::new(),
            pending: None,
            wanted,
            jobs,
        }
    }

    pub fn cached(&self, track: TrackId) -> Option<Arc<Waveform>> {
        self.cache.get(&track).cloned()
    }

    /// Returns the cached waveform, or queues an extraction whose result
    /// arrives later as `Event::Waveform`. Either way `track` becomes the
    /// only one the worker still decodes.
    pub fn request(&mut self, track: TrackId, path: &Path) -> Option<Arc<Waveform>> {
        if let Some(hit) = self.cached(track) {
            self.want(None);
            self.pending = None;
            return Some(hit);
        }
        self.want(Some(track));
        if self.pending == Some(track) {
            return None;
        }

        self.pending = Some(track);
        let job = Job {
            track,
            path: path.to_path_buf(),
        };
        if self.jobs.send(job).is_err() {
            log::warn!("waveform worker is gone; no waveform for track {track}");
            self.pending = None;
        }
        None
    }

    /// Accepts a finished extraction. Results for tracks that left the
    /// catalog meanwhile are dropped and `None` is returned.
    pub fn complete(
        &mut self,
        track: TrackId,
        result: Result<Arc<Waveform>, ExtractionError>,
        still_listed: bool,
    ) -> Option<Result<Arc<Waveform>, ExtractionError>> {
        if self.pending == Some(track) {
            self.pending = None;
        }
        if !still_listed {
            return None;
        }
        if let Ok(waveform) = &result {
            self.cache.insert(track, Arc::clone(waveform));
        }
        Some(result)
    }

    pub fn evict(&mut self, track: TrackId) {
        self.cache.remove(&track);
        if self.pending == Some(track) {
            self.pending = None;
            self.want(None);
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.pending = None;
        self.want(None);
    }

    fn want(&self, track: Option<TrackId>) {
        let raw = track.map_or(NO_TRACK, |track| track.0);
        self.wanted.store(raw, Ordering::Release);
    }
}

fn extraction_loop(
    provider: Arc<dyn WaveformProvider>,
    jobs: Receiver<Job>,
    wanted: Arc<AtomicU64>,
    events: EventSender,
) {
    for job in jobs {
        if wanted.load(Ordering::Acquire) != job.track.0 {
            log::trace!("skipping superseded waveform for track {}", job.track);
            continue;
        }
        let result = provider.extract(&job.path).map(Arc::new);
        events.send(Event::Waveform {
            track: job.track,
            result,
        });
    }
}
