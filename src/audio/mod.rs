mod scripted;

pub use scripted::{EngineCall, ScriptHandle, ScriptedEngine};

use crate::error::EngineError;
use crate::events::{EngineEvent, EngineNotifier};
use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{
    Decoder, DeviceSinkBuilder as OutputStreamBuilder, MixerDeviceSink as OutputStream,
    Player as Sink,
};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// Capabilities the controller needs from a media engine.
///
/// `load` only fails synchronously for problems it can see immediately (an
/// unreadable file). Everything slower is reported later through the
/// notifier handed in with the load: `Loaded`, `DurationResolved`,
/// `EndOfTrack` (exactly once per natural completion) and `Error`.
/// `play`/`pause`/`stop` are idempotent.
pub trait PlaybackEngine {
    fn load(&mut self, path: &Path, notifier: EngineNotifier) -> Result<(), EngineError>;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    /// Clamps silently to `[0, duration]`.
    fn seek(&mut self, position: Duration) -> Result<(), EngineError>;
    fn position(&self) -> Option<Duration>;
    /// `None` means unknown, which is distinct from a zero-length track.
    fn duration(&self) -> Option<Duration>;
    /// `level` is 0..=100.
    fn set_volume(&mut self, level: u8);
    /// Pumps engine-side work and raises pending notifications.
    fn tick(&mut self);
    fn name(&self) -> String;
}

type DecodedSource = Box<dyn Source + Send>;

struct DecodedTrack {
    token: u64,
    result: std::result::Result<(DecodedSource, Option<Duration>), String>,
}

/// Plays through the default (or first working) audio output via rodio.
/// Decoding happens on a worker thread; `tick` installs the decoded source.
pub struct RodioEngine {
    stream: OutputStream,
    sink: Sink,
    current: Option<PathBuf>,
    track_duration: Option<Duration>,
    notifier: Option<EngineNotifier>,
    load_token: u64,
    decoded_tx: Sender<DecodedTrack>,
    decoded_rx: Receiver<DecodedTrack>,
    loaded: bool,
    play_requested: bool,
    end_reported: bool,
    volume: u8,
    output_name: String,
}

impl RodioEngine {
    pub fn new() -> Result<Self> {
        let (stream, output_name) = open_output_stream()?;
        let sink = Sink::connect_new(stream.mixer());
        let (decoded_tx, decoded_rx) = mpsc::channel();

        Ok(Self {
            stream,
            sink,
            current: None,
            track_duration: None,
            notifier: None,
            load_token: 0,
            decoded_tx,
            decoded_rx,
            loaded: false,
            play_requested: false,
            end_reported: false,
            volume: 100,
            output_name,
        })
    }

    fn linear_volume(&self) -> f32 {
        f32::from(self.volume.min(100)) / 100.0
    }

    fn notify(&self, event: EngineEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(event);
        }
    }

    fn install_decoded(&mut self) {
        while let Ok(decoded) = self.decoded_rx.try_recv() {
            if decoded.token != self.load_token {
                continue;
            }
            match decoded.result {
                Ok((source, duration)) => {
                    self.track_duration = duration;
                    self.sink.append(source);
                    self.loaded = true;
                    if self.play_requested {
                        self.sink.play();
                    }
                    self.notify(EngineEvent::Loaded {
                        duration: self.track_duration,
                    });
                }
                Err(reason) => {
                    log::warn!("decode failed: {reason}");
                    self.notify(EngineEvent::Error(EngineError::Decode(reason)));
                }
            }
        }
    }
}

impl PlaybackEngine for RodioEngine {
    fn load(&mut self, path: &Path, notifier: EngineNotifier) -> Result<(), EngineError> {
        let file = File::open(path).map_err(|err| EngineError::Load {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();
        self.sink.set_volume(self.linear_volume());

        self.load_token += 1;
        self.current = Some(path.to_path_buf());
        self.track_duration = None;
        self.notifier = Some(notifier);
        self.loaded = false;
        self.play_requested = false;
        self.end_reported = false;

        let token = self.load_token;
        let tx = self.decoded_tx.clone();
        let display = path.display().to_string();
        thread::spawn(move || {
            let result = Decoder::try_from(file)
                .map(|source| {
                    let duration = source.total_duration().filter(|d| !d.is_zero());
                    (Box::new(source) as DecodedSource, duration)
                })
                .map_err(|err| format!("failed to decode {display}: {err}"));
            let _ = tx.send(DecodedTrack { token, result });
        });
        Ok(())
    }

    fn play(&mut self) {
        self.play_requested = true;
        if self.loaded {
            self.sink.play();
        }
    }

    fn pause(&mut self) {
        self.play_requested = false;
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.load_token += 1;
        self.loaded = false;
        self.play_requested = false;
        self.end_reported = false;
    }

    fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        if !self.loaded {
            return Err(EngineError::Seek(String::from("no active track")));
        }
        let target = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.sink
            .try_seek(target)
            .map_err(|err| EngineError::Seek(format!("{err:?}")))
    }

    fn position(&self) -> Option<Duration> {
        self.loaded.then(|| self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn set_volume(&mut self, level: u8) {
        self.volume = level.min(100);
        self.sink.set_volume(self.linear_volume());
    }

    fn tick(&mut self) {
        self.install_decoded();

        if self.loaded && !self.end_reported && !self.sink.is_paused() && self.sink.empty() {
            self.end_reported = true;
            if let Some(path) = &self.current {
                log::debug!("end of track {}", path.display());
            }
            self.notify(EngineEvent::EndOfTrack);
        }
    }

    fn name(&self) -> String {
        self.output_name.clone()
    }
}

fn open_output_stream() -> Result<(OutputStream, String)> {
    let (mut stream, name) = with_silenced_stderr(|| {
        let default = OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")
            .and_then(|builder| {
                builder
                    .with_error_callback(|_| {})
                    .open_sink_or_fallback()
                    .context("failed to start default output stream")
            });
        let default_err = match default {
            Ok(stream) => return Ok((stream, String::from("System default output"))),
            Err(err) => err,
        };

        let host = rodio::cpal::default_host();
        let mut candidates: Vec<String> = host
            .output_devices()
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|device| device.name().ok())
            .collect();
        candidates.sort_by_cached_key(|name| {
            let lower = name.to_ascii_lowercase();
            let rank = if lower.contains("pulse") {
                0_u8
            } else if lower.contains("pipewire") {
                1_u8
            } else {
                2_u8
            };
            (rank, lower)
        });
        candidates.dedup();

        for candidate in candidates {
            let Some(device) = host
                .output_devices()
                .ok()
                .into_iter()
                .flatten()
                .find(|entry| entry.name().ok().as_deref() == Some(candidate.as_str()))
            else {
                continue;
            };
            let opened = OutputStreamBuilder::from_device(device)
                .context("failed to open fallback output device")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_sink_or_fallback()
                        .context("failed to start fallback output stream")
                });
            if let Ok(stream) = opened {
                return Ok((stream, candidate));
            }
        }

        Err(default_err.context("no audio output stream could be started"))
    })?;
    stream.log_on_drop(false);
    Ok((stream, name))
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

/// Wall-clock engine used when no output device can be opened. Keeps the
/// player usable (position, end-of-track, seeking) without sound.
pub struct NullEngine {
    paused: bool,
    current: Option<PathBuf>,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
    notifier: Option<EngineNotifier>,
    end_reported: bool,
}

impl NullEngine {
    pub fn new() -> Self {
        Self {
            paused: true,
            current: None,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
            notifier: None,
            end_reported: false,
        }
    }

    fn estimate_duration(file: File) -> Option<Duration> {
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.current.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }

    fn is_finished(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.current.is_some() && !self.paused && self.current_position() >= duration
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for NullEngine {
    fn load(&mut self, path: &Path, notifier: EngineNotifier) -> Result<(), EngineError> {
        let file = File::open(path).map_err(|err| EngineError::Load {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        self.paused = true;
        self.current = Some(path.to_path_buf());
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = Self::estimate_duration(file);
        self.end_reported = false;
        notifier.notify(EngineEvent::Loaded {
            duration: self.track_duration,
        });
        self.notifier = Some(notifier);
        Ok(())
    }

    fn play(&mut self) {
        if self.current.is_some() && self.paused {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn stop(&mut self) {
        self.paused = true;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.end_reported = false;
    }

    fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        if self.current.is_none() {
            return Err(EngineError::Seek(String::from("no active track")));
        }

        self.position_offset = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn set_volume(&mut self, _level: u8) {}

    fn tick(&mut self) {
        if !self.end_reported && self.is_finished() {
            self.end_reported = true;
            if let Some(notifier) = &self.notifier {
                notifier.notify(EngineEvent::EndOfTrack);
            }
        }
    }

    fn name(&self) -> String {
        String::from("Null audio engine")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{NullEngine, PlaybackEngine};
    use crate::error::EngineError;
    use crate::events::{EngineEvent, Event, EventQueue};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use std::thread;
    use std::time::Duration;

    pub(crate) fn write_test_wav(path: &Path, duration_ms: u32) {
        let sample_rate: u32 = 44_100;
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
        let data_size = total_samples * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);
        let riff_chunk_size = 36_u32.saturating_add(data_size);

        let mut bytes = Vec::with_capacity((44_u32 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&riff_chunk_size.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.resize((44_u32 + data_size) as usize, 0_u8);

        fs::write(path, bytes).expect("wav fixture should be written");
    }

    /// A readable file no decoder understands, so its duration stays unknown.
    fn opaque_track(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("opaque.flac");
        fs::write(&path, b"not audio at all").expect("opaque fixture should be written");
        path
    }

    fn loaded_null_engine(queue: &EventQueue, path: &Path) -> NullEngine {
        let mut engine = NullEngine::new();
        engine
            .load(path, queue.sender().notifier(1))
            .expect("load should still work in null mode");
        engine
    }

    #[test]
    fn null_engine_reports_loaded_with_unknown_duration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = EventQueue::new();
        let _engine = loaded_null_engine(&queue, &opaque_track(&dir));

        match queue.try_next() {
            Some(Event::Engine { generation, event }) => {
                assert_eq!(generation, 1);
                assert_eq!(event, EngineEvent::Loaded { duration: None });
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn null_engine_refuses_missing_file() {
        let queue = EventQueue::new();
        let mut engine = NullEngine::new();
        let result = engine.load(Path::new("missing-track.flac"), queue.sender().notifier(1));
        assert!(matches!(result, Err(EngineError::Load { .. })));
        assert!(queue.try_next().is_none());
        assert_eq!(engine.position(), None);
    }

    #[test]
    fn null_engine_position_advances_only_after_play() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = EventQueue::new();
        let mut engine = loaded_null_engine(&queue, &opaque_track(&dir));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.position(), Some(Duration::ZERO));

        engine.play();
        thread::sleep(Duration::from_millis(20));
        let after = engine.position().expect("position should be present");
        assert!(after > Duration::ZERO, "position should advance while playing");
    }

    #[test]
    fn null_engine_pause_and_resume_control_position_progression() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = EventQueue::new();
        let mut engine = loaded_null_engine(&queue, &opaque_track(&dir));
        engine.play();
        thread::sleep(Duration::from_millis(20));

        engine.pause();
        let paused = engine.position().expect("position should be present");
        thread::sleep(Duration::from_millis(20));
        let paused_later = engine.position().expect("position should be present");
        assert_eq!(paused_later, paused, "position should freeze while paused");

        engine.play();
        thread::sleep(Duration::from_millis(20));
        let resumed = engine.position().expect("position should be present");
        assert!(resumed > paused, "position should continue after resume");
    }

    #[test]
    fn null_engine_seek_updates_position() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = EventQueue::new();
        let mut engine = loaded_null_engine(&queue, &opaque_track(&dir));
        engine.play();

        let target = Duration::from_secs(12);
        engine.seek(target).expect("seek should succeed");
        let position = engine.position().expect("position should be present");
        assert!(position >= target, "seek should move logical position");
    }

    #[test]
    fn null_engine_raises_end_of_track_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 80);

        let queue = EventQueue::new();
        let mut engine = loaded_null_engine(&queue, &track);
        let duration = engine.duration().expect("duration should be detected");
        assert!(duration >= Duration::from_millis(70));
        let _loaded = queue.try_next();

        engine.play();
        thread::sleep(Duration::from_millis(120));
        engine.tick();
        engine.tick();

        assert!(matches!(
            queue.try_next(),
            Some(Event::Engine {
                event: EngineEvent::EndOfTrack,
                ..
            })
        ));
        assert!(queue.try_next().is_none(), "end of track must fire once");
    }

    #[test]
    fn null_engine_unknown_duration_does_not_auto_finish() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = EventQueue::new();
        let mut engine = loaded_null_engine(&queue, &opaque_track(&dir));
        let _loaded = queue.try_next();
        engine.play();

        thread::sleep(Duration::from_millis(40));
        engine.tick();
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn null_engine_stop_rewinds_without_end_of_track() {
        let dir = tempfile::tempdir().expect("tempdir");
        let track = dir.path().join("short.wav");
        write_test_wav(&track, 30);

        let queue = EventQueue::new();
        let mut engine = loaded_null_engine(&queue, &track);
        let _loaded = queue.try_next();
        engine.play();
        engine.stop();
        thread::sleep(Duration::from_millis(50));
        engine.tick();

        assert_eq!(engine.position(), Some(Duration::ZERO));
        assert!(queue.try_next().is_none());
    }
}
