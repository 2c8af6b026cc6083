//! The single serialized inbound queue the controller drains.
//!
//! User commands, engine notifications and waveform results all arrive here,
//! whatever thread produced them. Only the controller reads the queue.

use crate::error::{EngineError, ExtractionError};
use crate::library::TrackInfo;
use crate::model::{RepeatMode, TrackId};
use crate::waveform::Waveform;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectTrack(usize),
    Play,
    Pause,
    TogglePlayPause,
    Stop,
    Next,
    Back,
    Seek(f64),
    SetShuffle(bool),
    ToggleShuffle,
    SetRepeat(RepeatMode),
    CycleRepeat,
    SetVolume(u8),
    AddTrack(PathBuf),
    AddTracks(Vec<PathBuf>),
    RemoveTrack(usize),
    ReplaceCatalog(Vec<PathBuf>),
}

/// Notifications a playback engine raises after a `load`.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The media is open and ready to play. Duration may still be unknown.
    Loaded { duration: Option<Duration> },
    DurationResolved(Duration),
    /// Natural completion. Never raised for stop or pause.
    EndOfTrack,
    /// Playback failed mid-stream or the asynchronous part of a load failed.
    Error(EngineError),
}

#[derive(Debug)]
pub enum Event {
    Command(Command),
    Engine {
        generation: u64,
        event: EngineEvent,
    },
    Waveform {
        track: TrackId,
        result: Result<Arc<Waveform>, ExtractionError>,
    },
    /// Header probe of a freshly added entry finished.
    Probed {
        track: TrackId,
        info: TrackInfo,
    },
    Shutdown,
}

pub struct EventQueue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub fn try_next(&self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable, `Send` handle for posting into the controller's queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    pub fn send(&self, event: Event) {
        // The controller may already be torn down; late events are moot.
        let _ = self.tx.send(event);
    }

    pub fn command(&self, command: Command) {
        self.send(Event::Command(command));
    }

    pub fn notifier(&self, generation: u64) -> EngineNotifier {
        EngineNotifier {
            generation,
            tx: self.tx.clone(),
        }
    }
}

/// Handed to the engine with each `load`. Tags every notification with the
/// load's generation so the controller can drop events from superseded loads.
#[derive(Debug, Clone)]
pub struct EngineNotifier {
    generation: u64,
    tx: Sender<Event>,
}

impl EngineNotifier {
    pub fn notify(&self, event: EngineEvent) {
        let _ = self.tx.send(Event::Engine {
            generation: self.generation,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_tags_generation() {
        let queue = EventQueue::new();
        let notifier = queue.sender().notifier(4);
        notifier.notify(EngineEvent::EndOfTrack);

        match queue.try_next() {
            Some(Event::Engine { generation, event }) => {
                assert_eq!(generation, 4);
                assert_eq!(event, EngineEvent::EndOfTrack);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn events_keep_send_order() {
        let queue = EventQueue::new();
        let sender = queue.sender();
        sender.command(Command::Play);
        sender.command(Command::Pause);

        assert!(matches!(queue.try_next(), Some(Event::Command(Command::Play))));
        assert!(matches!(queue.try_next(), Some(Event::Command(Command::Pause))));
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn senders_work_from_other_threads() {
        let queue = EventQueue::new();
        let sender = queue.sender();
        std::thread::spawn(move || sender.command(Command::Stop))
            .join()
            .expect("join");
        assert!(matches!(
            queue.next_timeout(Duration::from_secs(1)),
            Some(Event::Command(Command::Stop))
        ));
    }
}
