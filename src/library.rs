use crate::events::{Event, EventSender};
use crate::model::TrackId;
use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use symphonia::core::codecs::CodecParameters;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Tag};
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;
use walkdir::WalkDir;

/// Extensions picked up by folder import. Playback itself never looks at them.
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "ogg", "flac", "m4a", "mp4", "mov", "mkv", "avi", "webm",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub duration: Option<Duration>,
}

/// Media files under `root`, sorted by path.
pub fn scan_folder(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_media(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    paths.sort();
    paths
}

/// Title and header duration for a new playlist entry. Unreadable files
/// still get an entry named after the file.
pub fn probe(path: &Path) -> TrackInfo {
    let (title, duration) = probe_headers(path).unwrap_or_default();
    TrackInfo {
        title: title.unwrap_or_else(|| fallback_title(path)),
        duration,
    }
}

/// Runs header probes off the controller's thread, one file at a time, and
/// posts each result back as `Event::Probed`.
pub struct Prober {
    jobs: Sender<(TrackId, PathBuf)>,
}

impl Prober {
    /// Spawns the probe worker. It exits once the `Prober` is dropped.
    pub fn spawn(events: EventSender) -> Self {
        let (jobs, rx) = mpsc::channel();
        thread::spawn(move || probe_loop(rx, events));
        Self { jobs }
    }

    pub fn submit(&self, track: TrackId, path: PathBuf) {
        if self.jobs.send((track, path)).is_err() {
            log::warn!("probe worker is gone; track {track} keeps its file name");
        }
    }
}

fn probe_loop(jobs: Receiver<(TrackId, PathBuf)>, events: EventSender) {
    for (track, path) in jobs {
        let info = probe(&path);
        events.send(Event::Probed { track, info });
    }
}

pub fn is_media(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    MEDIA_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

/// Title shown until (or unless) the file's tags provide a better one.
pub fn fallback_title(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .and_then(OsStr::to_str)
        .unwrap_or("unknown")
        .to_string()
}

fn probe_headers(path: &Path) -> Option<(Option<String>, Option<Duration>)> {
    let file = File::open(path).ok()?;
    let source = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }

    let mut probed = get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let duration = probed
        .format
        .default_track()
        .and_then(|track| codec_duration(&track.codec_params));

    // Tags may sit in the container or in the probe-level metadata (ID3v2
    // ahead of an MP3 stream).
    let mut title = probed
        .format
        .metadata()
        .current()
        .and_then(|revision| tag_value(revision.tags(), StandardTagKey::TrackTitle, &["title"]));
    if title.is_none()
        && let Some(metadata) = probed.metadata.get()
        && let Some(revision) = metadata.current()
    {
        title = tag_value(revision.tags(), StandardTagKey::TrackTitle, &["title"]);
    }

    Some((title, duration))
}

fn codec_duration(codec_params: &CodecParameters) -> Option<Duration> {
    if let (Some(time_base), Some(frame_count)) = (codec_params.time_base, codec_params.n_frames) {
        let time = time_base.calc_time(frame_count);
        return Some(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac));
    }

    codec_params
        .n_frames
        .zip(codec_params.sample_rate)
        .filter(|(_, sample_rate)| *sample_rate > 0)
        .map(|(frames, sample_rate)| Duration::from_secs_f64(frames as f64 / f64::from(sample_rate)))
}

fn tag_value(tags: &[Tag], standard_key: StandardTagKey, fallback_keys: &[&str]) -> Option<String> {
    let from_standard = tags
        .iter()
        .find(|tag| tag.std_key == Some(standard_key))
        .map(|tag| tag.value.to_string());

    let from_fallback = || {
        tags.iter()
            .find(|tag| {
                fallback_keys
                    .iter()
                    .any(|key| tag.key.eq_ignore_ascii_case(key))
            })
            .map(|tag| tag.value.to_string())
    };

    from_standard.or_else(from_fallback).and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then_some(trimmed.to_string())
    })
}
