//! Playback controller: the one owner of session, mode and shuffle state.
//!
//! Every mutation arrives as an [`Event`] through the controller's queue (or
//! a direct `dispatch` on the owning thread) and is followed by a snapshot
//! pushed to the presentation sink. Engine notifications carry the
//! generation of the load that produced them; anything older than the
//! current generation is discarded.

use crate::audio::PlaybackEngine;
use crate::catalog::Catalog;
use crate::error::{ExtractionError, PlayerError, Result};
use crate::events::{Command, EngineEvent, Event, EventQueue, EventSender};
use crate::library::{self, Prober, TrackInfo};
use crate::model::{PersistedState, PlaybackMode, PlaybackStatus, RepeatMode, TrackId};
use crate::presentation::{PresentationSink, Snapshot, TrackRow};
use crate::shuffle::ShuffleOrder;
use crate::waveform::{Waveform, WaveformProvider, WaveformStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub autoplay_on_select: bool,
    pub volume: u8,
    pub mode: PlaybackMode,
    /// Fixed seed for the shuffle permutation; `None` seeds from the OS.
    pub shuffle_seed: Option<u64>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            autoplay_on_select: true,
            volume: 70,
            mode: PlaybackMode::default(),
            shuffle_seed: None,
        }
    }
}

impl From<&PersistedState> for ControllerOptions {
    fn from(state: &PersistedState) -> Self {
        Self {
            autoplay_on_select: state.autoplay_on_select,
            volume: state.volume.min(100),
            mode: state.playback_mode(),
            shuffle_seed: None,
        }
    }
}

/// One loaded track. Replaced, never retargeted, when the track changes.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub track: TrackId,
    pub generation: u64,
    pub position: Duration,
    pub duration: Option<Duration>,
}

pub struct Controller {
    catalog: Catalog,
    engine: Box<dyn PlaybackEngine>,
    waveforms: WaveformStore,
    prober: Prober,
    sink: Box<dyn PresentationSink>,
    queue: EventQueue,
    events: EventSender,
    mode: PlaybackMode,
    shuffle: ShuffleOrder,
    session: Option<PlaybackSession>,
    status: PlaybackStatus,
    generation: u64,
    start_when_loaded: bool,
    pending_seek: Option<f64>,
    volume: u8,
    autoplay_on_select: bool,
    waveform: Option<Arc<Waveform>>,
    error_message: Option<String>,
    warning: Option<String>,
    seen_version: u64,
    rows: Arc<[TrackRow]>,
}

impl Controller {
    pub fn new(
        mut engine: Box<dyn PlaybackEngine>,
        provider: Arc<dyn WaveformProvider>,
        sink: Box<dyn PresentationSink>,
        options: ControllerOptions,
    ) -> Self {
        let queue = EventQueue::new();
        let events = queue.sender();
        let volume = options.volume.min(100);
        engine.set_volume(volume);
        let shuffle = match options.shuffle_seed {
            Some(seed) => ShuffleOrder::seeded(seed),
            None => ShuffleOrder::new(),
        };

        Self {
            catalog: Catalog::new(),
            engine,
            waveforms: WaveformStore::new(provider, events.clone()),
            prober: Prober::spawn(events.clone()),
            sink,
            queue,
            events,
            mode: options.mode,
            shuffle,
            session: None,
            status: PlaybackStatus::Idle,
            generation: 0,
            start_when_loaded: options.autoplay_on_select,
            pending_seek: None,
            volume,
            autoplay_on_select: options.autoplay_on_select,
            waveform: None,
            error_message: None,
            warning: None,
            seen_version: 0,
            rows: Arc::from(Vec::new()),
        }
    }

    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn current_track(&self) -> Option<TrackId> {
        self.session.as_ref().map(|session| session.track)
    }

    /// Resolved by identity, so it follows the track across re-indexing.
    pub fn current_index(&self) -> Option<usize> {
        self.catalog.index_of(self.current_track()?)
    }

    /// Applies one command on the owning thread and publishes a snapshot.
    pub fn dispatch(&mut self, command: Command) -> Result<()> {
        let result = self.apply(command);
        self.reconcile_catalog();
        self.publish();
        result
    }

    /// Handles one queued event. Returns `false` once shutdown was requested.
    pub fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Command(command) => {
                let label = format!("{command:?}");
                if let Err(err) = self.apply(command) {
                    log::debug!("command {label} rejected: {err}");
                }
            }
            Event::Engine { generation, event } => self.on_engine_event(generation, event),
            Event::Waveform { track, result } => self.on_waveform(track, result),
            Event::Probed { track, info } => self.on_probed(track, info),
            Event::Shutdown => return false,
        }
        self.reconcile_catalog();
        self.publish();
        true
    }

    /// Drains everything currently queued. Returns `false` on shutdown.
    pub fn process_pending(&mut self) -> bool {
        while let Some(event) = self.queue.try_next() {
            if !self.handle(event) {
                return false;
            }
        }
        true
    }

    /// Blocks up to `timeout` for one event, then drains the rest.
    pub fn wait_and_process(&mut self, timeout: Duration) -> bool {
        match self.queue.next_timeout(timeout) {
            Some(event) => self.handle(event) && self.process_pending(),
            None => true,
        }
    }

    /// Position tick: lets the engine raise notifications, drains the queue,
    /// refreshes derived values and publishes.
    pub fn tick(&mut self) -> bool {
        self.engine.tick();
        let running = self.process_pending();
        self.refresh_position();
        self.publish();
        running
    }

    pub fn shutdown(&mut self) {
        if self.session.is_some() {
            self.engine.stop();
        }
        self.generation += 1;
        self.session = None;
        self.waveform = None;
        self.waveforms.clear();
        self.status = PlaybackStatus::Idle;
        log::info!("playback session torn down");
    }

    pub fn snapshot(&self) -> Snapshot {
        let (elapsed, duration) = match &self.session {
            Some(session) => (clamp_to(session.position, session.duration), session.duration),
            None => (Duration::ZERO, None),
        };
        let remaining = duration
            .map(|duration| duration.saturating_sub(elapsed))
            .unwrap_or(Duration::ZERO);
        let scrub_fraction = duration
            .filter(|duration| !duration.is_zero())
            .map(|duration| (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0))
            .unwrap_or(0.0);
        let title = self
            .current_track()
            .and_then(|id| self.catalog.by_id(id))
            .map(|track| track.title.clone());

        Snapshot {
            status: self.status,
            current_track: self.current_track(),
            current_index: self.current_index(),
            title,
            elapsed,
            remaining,
            duration,
            scrub_fraction,
            shuffle: self.mode.shuffle,
            repeat: self.mode.repeat,
            volume: self.volume,
            waveform: self.waveform.clone(),
            error_message: self.error_message.clone(),
            warning: self.warning.clone(),
            tracks: Arc::clone(&self.rows),
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.sink.present(&snapshot);
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SelectTrack(index) => self.select_track(index),
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::TogglePlayPause => {
                if self.status == PlaybackStatus::Playing {
                    self.pause()
                } else {
                    self.play()
                }
            }
            Command::Stop => self.stop(),
            Command::Next => self.next(),
            Command::Back => self.back(),
            Command::Seek(fraction) => self.seek(fraction),
            Command::SetShuffle(enabled) => {
                self.set_shuffle(enabled);
                Ok(())
            }
            Command::ToggleShuffle => {
                self.set_shuffle(!self.mode.shuffle);
                Ok(())
            }
            Command::SetRepeat(repeat) => {
                self.set_repeat(repeat);
                Ok(())
            }
            Command::CycleRepeat => {
                self.set_repeat(self.mode.repeat.next());
                Ok(())
            }
            Command::SetVolume(level) => {
                self.set_volume(level);
                Ok(())
            }
            Command::AddTrack(path) => {
                self.add_track(path);
                Ok(())
            }
            Command::AddTracks(paths) => {
                for path in paths {
                    self.add_track(path);
                }
                Ok(())
            }
            Command::RemoveTrack(index) => self.remove_track(index),
            Command::ReplaceCatalog(paths) => {
                self.replace_catalog(paths);
                Ok(())
            }
        }
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        if self.catalog.is_empty() {
            return Err(PlayerError::EmptyCatalog);
        }
        self.catalog.get(index)?;
        if self.mode.shuffle {
            self.ensure_shuffle_dealt();
            self.shuffle.mark_played(index);
        }
        self.load_index(index, self.autoplay_on_select)
    }

    fn play(&mut self) -> Result<()> {
        match self.status {
            PlaybackStatus::Playing => Ok(()),
            PlaybackStatus::Loading => {
                self.start_when_loaded = true;
                Ok(())
            }
            PlaybackStatus::Paused => {
                self.engine.play();
                self.transition(PlaybackStatus::Playing);
                Ok(())
            }
            PlaybackStatus::Stopped | PlaybackStatus::Idle | PlaybackStatus::Ended => {
                if let Some(index) = self.current_index() {
                    return self.load_index(index, true);
                }
                self.start_first(true)
            }
        }
    }

    fn pause(&mut self) -> Result<()> {
        match self.status {
            PlaybackStatus::Playing => {
                self.engine.pause();
                self.transition(PlaybackStatus::Paused);
                Ok(())
            }
            PlaybackStatus::Loading => {
                self.start_when_loaded = false;
                Ok(())
            }
            _ if self.session.is_none() => Err(PlayerError::NothingLoaded),
            _ => Ok(()),
        }
    }

    fn stop(&mut self) -> Result<()> {
        match self.status {
            PlaybackStatus::Playing | PlaybackStatus::Paused | PlaybackStatus::Loading => {
                if self.status == PlaybackStatus::Loading {
                    self.generation += 1;
                }
                self.engine.stop();
                self.pending_seek = None;
                if let Some(session) = self.session.as_mut() {
                    session.position = Duration::ZERO;
                }
                self.transition(PlaybackStatus::Stopped);
                Ok(())
            }
            _ if self.session.is_none() => Err(PlayerError::NothingLoaded),
            _ => Ok(()),
        }
    }

    fn next(&mut self) -> Result<()> {
        if self.catalog.is_empty() {
            return Err(PlayerError::EmptyCatalog);
        }
        let keep_playing = self.autoplay_on_select || self.status == PlaybackStatus::Playing;
        let Some(current) = self.current_index() else {
            return self.start_first(keep_playing);
        };

        let len = self.catalog.size();
        let target = if self.mode.shuffle {
            self.shuffle.next(len, Some(current))
        } else if current + 1 < len {
            Some(current + 1)
        } else if self.mode.repeat == RepeatMode::All {
            Some(0)
        } else {
            None
        };

        match target {
            Some(index) => self.load_index(index, keep_playing),
            None => Ok(()),
        }
    }

    fn back(&mut self) -> Result<()> {
        if self.catalog.is_empty() {
            return Err(PlayerError::EmptyCatalog);
        }
        let Some(current) = self.current_index() else {
            return Ok(());
        };
        let keep_playing = self.autoplay_on_select || self.status == PlaybackStatus::Playing;

        let len = self.catalog.size();
        let target = if self.mode.shuffle {
            self.shuffle.back()
        } else if current > 0 {
            Some(current - 1)
        } else if self.mode.repeat == RepeatMode::All {
            Some(len - 1)
        } else {
            None
        };

        match target {
            Some(index) => self.load_index(index, keep_playing),
            None => Ok(()),
        }
    }

    fn seek(&mut self, fraction: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(PlayerError::InvalidSeekFraction(fraction));
        }
        let Some(known) = self.session.as_ref().map(|session| session.duration) else {
            return Err(PlayerError::NothingLoaded);
        };
        if matches!(
            self.status,
            PlaybackStatus::Stopped | PlaybackStatus::Idle | PlaybackStatus::Ended
        ) {
            return Err(PlayerError::NothingLoaded);
        }

        match known {
            Some(duration) if self.status != PlaybackStatus::Loading => {
                self.apply_seek(fraction, duration);
            }
            _ => {
                log::debug!("seek to {fraction:.3} queued until duration is known");
                self.pending_seek = Some(fraction);
            }
        }
        Ok(())
    }

    fn apply_seek(&mut self, fraction: f64, duration: Duration) {
        let target = duration.mul_f64(fraction);
        match self.engine.seek(target) {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    session.position = target;
                }
            }
            Err(err) => {
                log::warn!("seek failed: {err}");
                self.warning = Some(err.to_string());
            }
        }
    }

    fn apply_pending_seek(&mut self) {
        let Some(duration) = self.session.as_ref().and_then(|session| session.duration) else {
            return;
        };
        if let Some(fraction) = self.pending_seek.take() {
            self.apply_seek(fraction, duration);
        }
    }

    fn set_shuffle(&mut self, enabled: bool) {
        if self.mode.shuffle == enabled {
            return;
        }
        self.mode.shuffle = enabled;
        if enabled {
            self.shuffle
                .regenerate(self.catalog.size(), self.current_index());
        } else {
            self.shuffle.clear();
        }
        log::info!("shuffle {}", if enabled { "on" } else { "off" });
    }

    fn set_repeat(&mut self, repeat: RepeatMode) {
        self.mode.repeat = repeat;
        log::info!("repeat mode {repeat:?}");
    }

    fn set_volume(&mut self, level: u8) {
        self.volume = level.min(100);
        self.engine.set_volume(self.volume);
    }

    /// The entry is listed under its file name at once; tags and header
    /// duration follow as `Event::Probed`.
    fn add_track(&mut self, path: PathBuf) {
        let index = self.catalog.add(path.clone(), library::fallback_title(&path));
        if let Ok(track) = self.catalog.get(index) {
            self.prober.submit(track.id, path);
        }
        log::debug!("added track at {index}");
    }

    fn remove_track(&mut self, index: usize) -> Result<()> {
        let removed = self.catalog.remove(index)?;
        self.waveforms.evict(removed);
        log::debug!("removed track {removed} from {index}");
        Ok(())
    }

    fn replace_catalog(&mut self, paths: Vec<PathBuf>) {
        if self.session.is_some() {
            self.engine.stop();
        }
        self.generation += 1;
        self.session = None;
        self.waveform = None;
        self.pending_seek = None;
        self.catalog.clear();
        self.waveforms.clear();
        for path in paths {
            self.add_track(path);
        }
        self.transition(PlaybackStatus::Idle);
    }

    fn start_first(&mut self, start: bool) -> Result<()> {
        let len = self.catalog.size();
        if len == 0 {
            return Err(PlayerError::EmptyCatalog);
        }
        let index = if self.mode.shuffle {
            self.shuffle.next(len, None).unwrap_or(0)
        } else {
            0
        };
        self.load_index(index, start)
    }

    fn ensure_shuffle_dealt(&mut self) {
        if self.shuffle.is_exhausted() {
            self.shuffle
                .regenerate(self.catalog.size(), self.current_index());
        }
    }

    /// Starts a fresh session for `index` under a new generation.
    fn load_index(&mut self, index: usize, start: bool) -> Result<()> {
        let (id, path) = {
            let track = self.catalog.get(index)?;
            (track.id, track.path.clone())
        };

        self.generation += 1;
        self.session = Some(PlaybackSession {
            track: id,
            generation: self.generation,
            position: Duration::ZERO,
            duration: None,
        });
        self.start_when_loaded = start;
        self.pending_seek = None;
        self.waveform = None;
        self.warning = None;
        log::debug!(
            "loading {} (track {id}, generation {})",
            path.display(),
            self.generation
        );

        let notifier = self.events.notifier(self.generation);
        match self.engine.load(&path, notifier) {
            Ok(()) => {
                self.transition(PlaybackStatus::Loading);
                self.waveform = self.waveforms.request(id, &path);
                Ok(())
            }
            Err(err) => {
                log::warn!("{err}");
                self.fail_playback(err.to_string());
                Err(err.into())
            }
        }
    }

    fn on_engine_event(&mut self, generation: u64, event: EngineEvent) {
        if generation != self.generation {
            log::trace!(
                "discarding stale {event:?} from generation {generation} (current {})",
                self.generation
            );
            return;
        }

        match event {
            EngineEvent::Loaded { duration } => {
                if self.status != PlaybackStatus::Loading {
                    return;
                }
                self.resolve_duration(duration);
                if self.start_when_loaded {
                    self.engine.play();
                    self.transition(PlaybackStatus::Playing);
                } else {
                    self.transition(PlaybackStatus::Paused);
                }
                self.apply_pending_seek();
            }
            EngineEvent::DurationResolved(duration) => {
                if self
                    .session
                    .as_ref()
                    .is_some_and(|session| session.duration.is_none())
                {
                    self.resolve_duration(Some(duration));
                    if self.status != PlaybackStatus::Loading {
                        self.apply_pending_seek();
                    }
                }
            }
            EngineEvent::EndOfTrack => {
                if self.status != PlaybackStatus::Playing {
                    return;
                }
                self.status = PlaybackStatus::Ended;
                if let Some(session) = self.session.as_mut() {
                    session.position = session.duration.unwrap_or(session.position);
                }
                self.advance_after_end();
            }
            EngineEvent::Error(err) => {
                log::warn!("playback failed: {err}");
                self.fail_playback(err.to_string());
            }
        }
    }

    fn resolve_duration(&mut self, duration: Option<Duration>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.duration = duration;
        if let Some(duration) = duration {
            let id = session.track;
            session.position = session.position.min(duration);
            self.catalog.record_duration(id, duration);
            self.refresh_rows();
        }
    }

    /// Natural-end policy: repeat-one, then shuffle, then linear order.
    fn advance_after_end(&mut self) {
        let Some(current) = self.current_index() else {
            self.transition(PlaybackStatus::Stopped);
            return;
        };
        let len = self.catalog.size();

        let next = if self.mode.repeat == RepeatMode::One {
            Some(current)
        } else if self.mode.shuffle {
            self.shuffle.next(len, Some(current))
        } else if current + 1 < len {
            Some(current + 1)
        } else if self.mode.repeat == RepeatMode::All {
            Some(0)
        } else {
            None
        };

        match next {
            Some(index) => {
                if let Err(err) = self.load_index(index, true) {
                    log::debug!("advance to {index} failed: {err}");
                }
            }
            None => {
                log::info!("reached end of playlist");
                self.engine.stop();
                if let Some(session) = self.session.as_mut() {
                    session.position = Duration::ZERO;
                }
                self.transition(PlaybackStatus::Stopped);
            }
        }
    }

    fn on_waveform(&mut self, track: TrackId, result: std::result::Result<Arc<Waveform>, ExtractionError>) {
        let listed = self.catalog.contains(track);
        let Some(outcome) = self.waveforms.complete(track, result, listed) else {
            log::debug!("discarding waveform for removed track {track}");
            return;
        };
        let is_current = self.current_track() == Some(track);

        match outcome {
            Ok(waveform) => {
                if is_current {
                    self.waveform = Some(waveform);
                }
            }
            Err(err) => {
                log::warn!("waveform extraction failed: {err}");
                if is_current {
                    self.waveform = None;
                    self.warning = Some(format!("Waveform unavailable: {err}"));
                }
            }
        }
    }

    fn on_probed(&mut self, track: TrackId, info: TrackInfo) {
        if !self.catalog.apply_info(track, info.title, info.duration) {
            log::debug!("discarding probe for removed track {track}");
            return;
        }
        self.refresh_rows();
    }

    fn refresh_position(&mut self) {
        if !matches!(
            self.status,
            PlaybackStatus::Playing | PlaybackStatus::Paused
        ) {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let newly_known = match (session.duration, self.engine.duration()) {
            (None, Some(duration)) => Some(duration),
            _ => None,
        };

        if let Some(reported) = self.engine.position() {
            let clamped = clamp_to(reported, session.duration.or(newly_known));
            if self.status == PlaybackStatus::Paused || clamped > session.position {
                session.position = clamped;
            }
        }

        if let Some(duration) = newly_known {
            self.resolve_duration(Some(duration));
            self.apply_pending_seek();
        }
    }

    /// Reacts to structural catalog changes: the current track is re-found by
    /// identity and the shuffle permutation is re-dealt.
    fn reconcile_catalog(&mut self) {
        let version = self.catalog.version();
        if version == self.seen_version {
            return;
        }
        self.seen_version = version;

        let current_gone = self
            .session
            .as_ref()
            .is_some_and(|session| !self.catalog.contains(session.track));
        if current_gone {
            log::info!("current track left the playlist; stopping");
            self.engine.stop();
            self.generation += 1;
            self.session = None;
            self.waveform = None;
            self.pending_seek = None;
            self.status = PlaybackStatus::Stopped;
        }
        if self.session.is_none() && self.catalog.is_empty() {
            self.status = PlaybackStatus::Idle;
        }

        if self.mode.shuffle {
            self.shuffle
                .regenerate(self.catalog.size(), self.current_index());
        }
        self.refresh_rows();
    }

    fn refresh_rows(&mut self) {
        self.rows = self
            .catalog
            .tracks()
            .iter()
            .map(|track| TrackRow {
                id: track.id,
                title: track.title.clone(),
                duration: track.duration,
            })
            .collect::<Vec<_>>()
            .into();
    }

    fn transition(&mut self, status: PlaybackStatus) {
        if self.status != status {
            log::debug!("{:?} -> {status:?}", self.status);
        }
        self.status = status;
        self.error_message = None;
    }

    fn fail_playback(&mut self, message: String) {
        self.engine.stop();
        self.generation += 1;
        self.pending_seek = None;
        if let Some(session) = self.session.as_mut() {
            session.position = Duration::ZERO;
        }
        self.status = PlaybackStatus::Stopped;
        self.error_message = Some(message);
    }
}

fn clamp_to(position: Duration, duration: Option<Duration>) -> Duration {
    duration.map_or(position, |duration| position.min(duration))
}
