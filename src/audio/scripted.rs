use super::PlaybackEngine;
use crate::error::EngineError;
use crate::events::{EngineEvent, EngineNotifier};
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Load(PathBuf),
    Play,
    Pause,
    Stop,
    Seek(Duration),
    Volume(u8),
}

#[derive(Debug, Default)]
struct ScriptState {
    calls: Vec<EngineCall>,
    notifier: Option<EngineNotifier>,
    loaded: Option<PathBuf>,
    position: Duration,
    duration: Option<Duration>,
    unreadable: HashSet<PathBuf>,
}

/// Engine whose clock and notifications are driven by the caller through a
/// [`ScriptHandle`]. Records every call it receives.
pub struct ScriptedEngine {
    state: Rc<RefCell<ScriptState>>,
}

#[derive(Clone)]
pub struct ScriptHandle {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedEngine {
    pub fn new() -> (Self, ScriptHandle) {
        let state = Rc::new(RefCell::new(ScriptState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            ScriptHandle { state },
        )
    }
}

impl ScriptHandle {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.borrow().calls.clone()
    }

    pub fn loads(&self) -> Vec<PathBuf> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Load(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Notifier of the most recent load, for replaying stale events.
    pub fn notifier(&self) -> Option<EngineNotifier> {
        self.state.borrow().notifier.clone()
    }

    pub fn refuse(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().unreadable.insert(path.into());
    }

    pub fn finish_load(&self, duration: Option<Duration>) {
        self.state.borrow_mut().duration = duration;
        self.raise(EngineEvent::Loaded { duration });
    }

    pub fn resolve_duration(&self, duration: Duration) {
        self.state.borrow_mut().duration = Some(duration);
        self.raise(EngineEvent::DurationResolved(duration));
    }

    pub fn end_of_track(&self) {
        let duration = self.state.borrow().duration;
        if let Some(duration) = duration {
            self.state.borrow_mut().position = duration;
        }
        self.raise(EngineEvent::EndOfTrack);
    }

    pub fn fail(&self, reason: &str) {
        self.raise(EngineEvent::Error(EngineError::Decode(reason.to_string())));
    }

    pub fn set_position(&self, position: Duration) {
        self.state.borrow_mut().position = position;
    }

    pub fn set_duration(&self, duration: Option<Duration>) {
        self.state.borrow_mut().duration = duration;
    }

    fn raise(&self, event: EngineEvent) {
        if let Some(notifier) = &self.state.borrow().notifier {
            notifier.notify(event);
        }
    }
}

impl PlaybackEngine for ScriptedEngine {
    fn load(&mut self, path: &Path, notifier: EngineNotifier) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(EngineCall::Load(path.to_path_buf()));
        if state.unreadable.contains(path) {
            return Err(EngineError::Load {
                path: path.to_path_buf(),
                reason: String::from("unsupported media"),
            });
        }
        state.notifier = Some(notifier);
        state.loaded = Some(path.to_path_buf());
        state.position = Duration::ZERO;
        state.duration = None;
        Ok(())
    }

    fn play(&mut self) {
        self.state.borrow_mut().calls.push(EngineCall::Play);
    }

    fn pause(&mut self) {
        self.state.borrow_mut().calls.push(EngineCall::Pause);
    }

    fn stop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.calls.push(EngineCall::Stop);
        state.position = Duration::ZERO;
    }

    fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(EngineCall::Seek(position));
        if state.loaded.is_none() {
            return Err(EngineError::Seek(String::from("no active track")));
        }
        state.position = state
            .duration
            .map_or(position, |duration| position.min(duration));
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        let state = self.state.borrow();
        state.loaded.as_ref().map(|_| state.position)
    }

    fn duration(&self) -> Option<Duration> {
        self.state.borrow().duration
    }

    fn set_volume(&mut self, level: u8) {
        self.state
            .borrow_mut()
            .calls
            .push(EngineCall::Volume(level.min(100)));
    }

    fn tick(&mut self) {}

    fn name(&self) -> String {
        String::from("Scripted engine")
    }
}
