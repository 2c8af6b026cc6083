use ghost::audio::{EngineCall, ScriptHandle, ScriptedEngine};
use ghost::controller::{Controller, ControllerOptions};
use ghost::error::{EngineError, ExtractionError, PlayerError};
use ghost::events::{Command, EngineEvent};
use ghost::model::{PlaybackMode, PlaybackStatus, RepeatMode};
use ghost::presentation::{ChannelSink, Snapshot, latest};
use ghost::waveform::{Waveform, WaveformProvider};
use proptest::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

struct QuietProvider;

impl WaveformProvider for QuietProvider {
    fn extract(&self, _path: &Path) -> Result<Waveform, ExtractionError> {
        Ok(Waveform::default())
    }
}

struct Player {
    controller: Controller,
    script: ScriptHandle,
    snapshots: Receiver<Snapshot>,
}

impl Player {
    fn new(len: usize, mode: PlaybackMode, seed: u64) -> Self {
        let (engine, script) = ScriptedEngine::new();
        let (sink, snapshots) = ChannelSink::new();
        let mut controller = Controller::new(
            Box::new(engine),
            Arc::new(QuietProvider),
            Box::new(sink),
            ControllerOptions {
                mode,
                shuffle_seed: Some(seed),
                ..ControllerOptions::default()
            },
        );
        let paths = (0..len)
            .map(|idx| PathBuf::from(format!("track_{idx}.mp3")))
            .collect();
        controller
            .dispatch(Command::AddTracks(paths))
            .expect("add tracks");
        Self {
            controller,
            script,
            snapshots,
        }
    }

    fn confirm(&mut self, seconds: u64) {
        self.script.finish_load(Some(Duration::from_secs(seconds)));
        self.controller.process_pending();
    }

    /// Lets the current track run out and confirms whatever loads next.
    fn play_through(&mut self, seconds: u64) {
        self.script.end_of_track();
        self.controller.process_pending();
        if self.controller.status() == PlaybackStatus::Loading {
            self.confirm(seconds);
        }
    }

    fn index(&self) -> Option<usize> {
        self.controller.current_index()
    }
}

fn linear(repeat: RepeatMode) -> PlaybackMode {
    PlaybackMode {
        shuffle: false,
        repeat,
    }
}

#[test]
fn two_track_playlist_plays_through_and_stops_on_the_last() {
    let (engine, script) = ScriptedEngine::new();
    let (sink, snapshots) = ChannelSink::new();
    let mut controller = Controller::new(
        Box::new(engine),
        Arc::new(QuietProvider),
        Box::new(sink),
        ControllerOptions::default(),
    );
    controller
        .dispatch(Command::AddTrack(PathBuf::from("A.mp3")))
        .expect("add A");
    controller
        .dispatch(Command::AddTrack(PathBuf::from("B.mp3")))
        .expect("add B");

    controller.dispatch(Command::SelectTrack(0)).expect("select");
    script.finish_load(Some(Duration::from_secs(180)));
    controller.process_pending();
    let snapshot = latest(&snapshots).expect("snapshot");
    assert_eq!(snapshot.status, PlaybackStatus::Playing);
    assert_eq!(snapshot.title.as_deref(), Some("A"));

    script.set_position(Duration::from_secs(180));
    controller.tick();
    script.end_of_track();
    controller.process_pending();
    script.finish_load(Some(Duration::from_secs(200)));
    controller.process_pending();
    let snapshot = latest(&snapshots).expect("snapshot");
    assert_eq!(snapshot.status, PlaybackStatus::Playing);
    assert_eq!(snapshot.current_index, Some(1));
    assert_eq!(snapshot.title.as_deref(), Some("B"));
    assert_eq!(snapshot.elapsed, Duration::ZERO);

    script.end_of_track();
    controller.process_pending();
    let snapshot = latest(&snapshots).expect("snapshot");
    assert_eq!(snapshot.status, PlaybackStatus::Stopped);
    assert_eq!(snapshot.current_index, Some(1));
    assert_eq!(snapshot.title.as_deref(), Some("B"));
    assert_eq!(
        script.loads(),
        vec![PathBuf::from("A.mp3"), PathBuf::from("B.mp3")]
    );

    controller.dispatch(Command::Next).expect("next at end");
    assert_eq!(controller.status(), PlaybackStatus::Stopped);
    assert_eq!(script.loads().len(), 2);
}

#[test]
fn seeking_halfway_splits_elapsed_and_remaining() {
    let mut player = Player::new(1, PlaybackMode::default(), 1);
    player
        .controller
        .dispatch(Command::SelectTrack(0))
        .expect("select");
    player.confirm(200);

    player.controller.dispatch(Command::Seek(0.5)).expect("seek");
    let snapshot = latest(&player.snapshots).expect("snapshot");
    assert_eq!(snapshot.elapsed, Duration::from_secs(100));
    assert_eq!(snapshot.remaining, Duration::from_secs(100));
    assert!((snapshot.scrub_fraction - 0.5).abs() < 1e-9);
    assert!(
        player
            .script
            .calls()
            .contains(&EngineCall::Seek(Duration::from_secs(100)))
    );
}

#[test]
fn seek_without_a_session_is_rejected() {
    let mut player = Player::new(2, PlaybackMode::default(), 1);
    assert_eq!(
        player.controller.dispatch(Command::Seek(0.5)),
        Err(PlayerError::NothingLoaded)
    );
}

#[test]
fn repeat_one_reloads_on_natural_end_but_next_still_advances() {
    let mut player = Player::new(3, linear(RepeatMode::One), 1);
    player
        .controller
        .dispatch(Command::SelectTrack(1))
        .expect("select");
    player.confirm(30);

    for _ in 0..3 {
        let before = player.controller.generation();
        player.play_through(30);
        assert_eq!(player.index(), Some(1));
        assert!(player.controller.generation() > before);
        assert_eq!(player.controller.status(), PlaybackStatus::Playing);
    }

    player.controller.dispatch(Command::Next).expect("next");
    assert_eq!(player.index(), Some(2));
}

#[test]
fn back_at_first_track_only_wraps_with_repeat_all() {
    let mut player = Player::new(3, linear(RepeatMode::Off), 1);
    player
        .controller
        .dispatch(Command::SelectTrack(0))
        .expect("select");
    player.controller.dispatch(Command::Back).expect("back");
    assert_eq!(player.index(), Some(0));

    player
        .controller
        .dispatch(Command::SetRepeat(RepeatMode::All))
        .expect("repeat");
    player.controller.dispatch(Command::Back).expect("back");
    assert_eq!(player.index(), Some(2));
}

#[test]
fn removing_the_playing_track_leaves_no_dangling_reference() {
    let mut player = Player::new(3, PlaybackMode::default(), 1);
    player
        .controller
        .dispatch(Command::SelectTrack(1))
        .expect("select");
    player.confirm(60);

    player
        .controller
        .dispatch(Command::RemoveTrack(1))
        .expect("remove");
    let snapshot = latest(&player.snapshots).expect("snapshot");
    assert_eq!(snapshot.status, PlaybackStatus::Stopped);
    assert_eq!(snapshot.current_track, None);
    assert_eq!(snapshot.current_index, None);
    assert_eq!(snapshot.tracks.len(), 2);

    player.script.end_of_track();
    player.controller.process_pending();
    assert_eq!(player.controller.status(), PlaybackStatus::Stopped);
}

#[test]
fn stale_load_error_does_not_touch_the_new_track() {
    let mut player = Player::new(2, PlaybackMode::default(), 1);
    player
        .controller
        .dispatch(Command::SelectTrack(0))
        .expect("select");
    let stale = player.script.notifier().expect("notifier");
    player
        .controller
        .dispatch(Command::SelectTrack(1))
        .expect("select");
    player.confirm(60);

    stale.notify(EngineEvent::Error(EngineError::Decode(String::from(
        "old decoder died",
    ))));
    player.controller.process_pending();
    assert_eq!(player.controller.status(), PlaybackStatus::Playing);
    assert!(player.controller.error_message().is_none());
}

#[test]
fn shuffle_survives_catalog_growth() {
    let mut player = Player::new(
        3,
        PlaybackMode {
            shuffle: true,
            repeat: RepeatMode::Off,
        },
        9,
    );
    player.controller.dispatch(Command::Play).expect("play");
    player.confirm(10);
    player
        .controller
        .dispatch(Command::AddTrack(PathBuf::from("late.mp3")))
        .expect("add");

    let mut seen = HashSet::new();
    for _ in 0..3 {
        player.play_through(10);
        let index = player.index().expect("current");
        assert!(index < 4);
        assert!(seen.insert(index));
    }
}

proptest! {
    #[test]
    fn linear_next_increases_until_the_end(len in 1usize..12, presses in 0usize..30) {
        let mut player = Player::new(len, linear(RepeatMode::Off), 1);
        player.controller.dispatch(Command::SelectTrack(0)).expect("select");

        let mut previous = 0;
        for _ in 0..presses {
            player.controller.dispatch(Command::Next).expect("next");
            let index = player.index().expect("current");
            if previous + 1 < len {
                prop_assert_eq!(index, previous + 1);
            } else {
                prop_assert_eq!(index, previous);
            }
            previous = index;
        }
        prop_assert_eq!(previous, presses.min(len - 1));
    }

    #[test]
    fn repeat_all_cycles_with_catalog_period(len in 1usize..10, start in 0usize..10) {
        let start = start % len;
        let mut player = Player::new(len, linear(RepeatMode::All), 1);
        player.controller.dispatch(Command::SelectTrack(start)).expect("select");
        player.confirm(5);

        for step in 1..=len {
            player.play_through(5);
            prop_assert_eq!(player.index(), Some((start + step) % len));
            prop_assert_eq!(player.controller.status(), PlaybackStatus::Playing);
        }
        prop_assert_eq!(player.index(), Some(start));
    }

    #[test]
    fn shuffle_visits_every_track_once_per_traversal(len in 2usize..12, seed in any::<u64>()) {
        let mut player = Player::new(
            len,
            PlaybackMode { shuffle: true, repeat: RepeatMode::Off },
            seed,
        );
        player.controller.dispatch(Command::Play).expect("play");
        player.confirm(5);

        let mut visited = HashSet::new();
        visited.insert(player.index().expect("first pick"));
        for _ in 1..len {
            player.play_through(5);
            let index = player.index().expect("current");
            prop_assert!(visited.insert(index), "index {} repeated", index);
        }
        prop_assert_eq!(visited.len(), len);
    }

    #[test]
    fn random_commands_keep_snapshot_consistent(
        len in 0usize..6,
        steps in proptest::collection::vec((0u8..14, 0usize..8), 1..60),
    ) {
        let mut player = Player::new(len, PlaybackMode::default(), 3);

        for (op, arg) in steps {
            let _ = match op {
                0 => player.controller.dispatch(Command::SelectTrack(arg)),
                1 => player.controller.dispatch(Command::Play),
                2 => player.controller.dispatch(Command::Pause),
                3 => player.controller.dispatch(Command::Stop),
                4 => player.controller.dispatch(Command::Next),
                5 => player.controller.dispatch(Command::Back),
                6 => player.controller.dispatch(Command::Seek(arg as f64 / 7.0)),
                7 => player.controller.dispatch(Command::ToggleShuffle),
                8 => player.controller.dispatch(Command::CycleRepeat),
                9 => player.controller.dispatch(Command::RemoveTrack(arg)),
                10 => player.controller.dispatch(Command::AddTrack(PathBuf::from(format!("extra_{arg}.mp3")))),
                11 => {
                    player.script.finish_load(Some(Duration::from_secs(arg as u64 + 1)));
                    player.controller.process_pending();
                    Ok(())
                }
                12 => {
                    player.script.end_of_track();
                    player.controller.process_pending();
                    Ok(())
                }
                _ => {
                    player.script.set_position(Duration::from_secs(arg as u64));
                    player.controller.tick();
                    Ok(())
                }
            };

            let snapshot = player.controller.snapshot();
            let size = player.controller.catalog().size();
            prop_assert!((0.0..=1.0).contains(&snapshot.scrub_fraction));
            prop_assert_ne!(snapshot.status, PlaybackStatus::Ended);
            if let Some(index) = snapshot.current_index {
                prop_assert!(index < size);
            }
            prop_assert_eq!(snapshot.current_track.is_some(), snapshot.current_index.is_some());
            if let Some(duration) = snapshot.duration {
                prop_assert!(snapshot.elapsed <= duration);
                prop_assert_eq!(snapshot.elapsed + snapshot.remaining, duration);
            } else {
                prop_assert_eq!(snapshot.remaining, Duration::ZERO);
            }
            if matches!(snapshot.status, PlaybackStatus::Playing | PlaybackStatus::Paused | PlaybackStatus::Loading) {
                prop_assert!(snapshot.current_track.is_some());
            }
            if size == 0 {
                prop_assert_eq!(snapshot.status, PlaybackStatus::Idle);
            }
        }
    }
}
