#![no_main]

use ghost::audio::ScriptedEngine;
use ghost::controller::{Controller, ControllerOptions};
use ghost::error::ExtractionError;
use ghost::events::Command;
use ghost::model::{PlaybackStatus, RepeatMode};
use ghost::presentation::DiscardSink;
use ghost::waveform::{Waveform, WaveformProvider};
use libfuzzer_sys::fuzz_target;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

struct NoWaveform;

impl WaveformProvider for NoWaveform {
    fn extract(&self, path: &Path) -> Result<Waveform, ExtractionError> {
        Err(ExtractionError::Empty(path.to_path_buf()))
    }
}

fuzz_target!(|data: &[u8]| {
    let (engine, script) = ScriptedEngine::new();
    let mut controller = Controller::new(
        Box::new(engine),
        Arc::new(NoWaveform),
        Box::new(DiscardSink),
        ControllerOptions {
            shuffle_seed: Some(u64::from(data.first().copied().unwrap_or(0))),
            ..ControllerOptions::default()
        },
    );

    for pair in data.chunks(2) {
        let op = pair[0];
        let arg = usize::from(pair.get(1).copied().unwrap_or(0));
        let _ = match op % 16 {
            0 => controller.dispatch(Command::AddTrack(PathBuf::from(format!("t{arg}.mp3")))),
            1 => controller.dispatch(Command::RemoveTrack(arg % 8)),
            2 => controller.dispatch(Command::SelectTrack(arg % 8)),
            3 => controller.dispatch(Command::TogglePlayPause),
            4 => controller.dispatch(Command::Stop),
            5 => controller.dispatch(Command::Next),
            6 => controller.dispatch(Command::Back),
            7 => controller.dispatch(Command::Seek(arg as f64 / 200.0)),
            8 => controller.dispatch(Command::ToggleShuffle),
            9 => controller.dispatch(Command::SetRepeat(match arg % 3 {
                0 => RepeatMode::Off,
                1 => RepeatMode::One,
                _ => RepeatMode::All,
            })),
            10 => controller.dispatch(Command::SetVolume(arg as u8)),
            11 => {
                let duration = (arg % 4 != 0).then(|| Duration::from_secs(arg as u64));
                script.finish_load(duration);
                controller.process_pending();
                Ok(())
            }
            12 => {
                script.end_of_track();
                controller.process_pending();
                Ok(())
            }
            13 => {
                script.fail("fuzzed failure");
                controller.process_pending();
                Ok(())
            }
            14 => {
                script.set_position(Duration::from_millis(arg as u64 * 997));
                controller.tick();
                Ok(())
            }
            _ => {
                if arg % 2 == 0 {
                    script.refuse(format!("t{arg}.mp3"));
                }
                Ok(())
            }
        };

        let snapshot = controller.snapshot();
        assert!((0.0..=1.0).contains(&snapshot.scrub_fraction));
        assert_ne!(snapshot.status, PlaybackStatus::Ended);
        if let Some(index) = snapshot.current_index {
            assert!(index < controller.catalog().size());
        }
        if let Some(duration) = snapshot.duration {
            assert!(snapshot.elapsed <= duration);
        }
    }

    controller.shutdown();
});
