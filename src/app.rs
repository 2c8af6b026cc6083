use crate::audio::{NullEngine, PlaybackEngine, RodioEngine};
use crate::config;
use crate::controller::{Controller, ControllerOptions};
use crate::events::Command;
use crate::library;
use crate::model::PersistedState;
use crate::presentation::{ChannelSink, latest};
use crate::ui::{self, ViewState};
use crate::waveform::DecodedWaveformProvider;
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use simplelog::{LevelFilter, WriteLogger};
use std::fs::File;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const VOLUME_STEP: i16 = 5;
const REDRAW_INTERVAL: Duration = Duration::from_millis(250);
const INPUT_POLL: Duration = Duration::from_millis(33);

#[derive(Debug, Default)]
pub struct AppOptions {
    pub debug: bool,
    pub null_audio: bool,
    /// Files or folders appended to the restored playlist at startup.
    pub enqueue: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
enum KeyAction {
    Command(Command),
    Volume(i16),
    MoveCursor(isize),
    SelectCursor,
    RemoveCursor,
    CommandMode,
    Quit,
}

pub fn run(options: AppOptions) -> Result<()> {
    let mut state = config::load_state()?;
    init_logging(&state, options.debug)?;

    let engine = open_engine(options.null_audio);
    log::info!("audio engine: {}", engine.name());
    let (sink, snapshots) = ChannelSink::new();
    let mut controller = Controller::new(
        engine,
        Arc::new(DecodedWaveformProvider::default()),
        Box::new(sink),
        ControllerOptions::from(&state),
    );

    let mut startup: Vec<PathBuf> = state
        .playlist
        .iter()
        .filter(|path| path.exists())
        .cloned()
        .collect();
    for path in &options.enqueue {
        startup.extend(expand_path(path));
    }
    if let Err(err) = controller.dispatch(Command::AddTracks(startup)) {
        log::warn!("restoring playlist failed: {err}");
    }

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut view = ViewState {
        waveform_bins: state.waveform_bins,
        ..ViewState::default()
    };
    let mut snapshot = controller.snapshot();
    let tick_interval = state.tick_interval();
    let mut last_tick = Instant::now();
    let mut last_draw = Instant::now();
    let mut dirty = true;

    let result: Result<()> = loop {
        let running = if last_tick.elapsed() >= tick_interval {
            last_tick = Instant::now();
            controller.tick()
        } else {
            controller.process_pending()
        };
        if !running {
            break Ok(());
        }

        if let Some(newest) = latest(&snapshots) {
            view.cursor = view.cursor.min(newest.tracks.len().saturating_sub(1));
            snapshot = newest;
            dirty = true;
        }

        if dirty || last_draw.elapsed() > REDRAW_INTERVAL {
            terminal.draw(|frame| ui::draw(frame, &snapshot, &view))?;
            dirty = false;
            last_draw = Instant::now();
        }

        if !event::poll(INPUT_POLL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        dirty = true;

        if view.command_mode {
            match key.code {
                KeyCode::Esc => {
                    view.command_mode = false;
                    view.command_buffer.clear();
                }
                KeyCode::Enter => {
                    let raw = std::mem::take(&mut view.command_buffer);
                    view.command_mode = false;
                    view.message = Some(run_command(&mut controller, &raw));
                }
                KeyCode::Backspace => {
                    view.command_buffer.pop();
                }
                KeyCode::Char(ch) => view.command_buffer.push(ch),
                _ => {}
            }
            continue;
        }

        let Some(action) = map_key(key) else {
            continue;
        };
        view.message = None;
        let command = match action {
            KeyAction::Quit => break Ok(()),
            KeyAction::CommandMode => {
                view.command_mode = true;
                None
            }
            KeyAction::MoveCursor(delta) => {
                view.cursor = move_cursor(view.cursor, delta, snapshot.tracks.len());
                None
            }
            KeyAction::SelectCursor => Some(Command::SelectTrack(view.cursor)),
            KeyAction::RemoveCursor => Some(Command::RemoveTrack(view.cursor)),
            KeyAction::Volume(delta) => Some(Command::SetVolume(step_volume(snapshot.volume, delta))),
            KeyAction::Command(command) => Some(command),
        };
        if let Some(command) = command
            && let Err(err) = controller.dispatch(command)
        {
            view.message = Some(err.to_string());
        }
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    remember(&mut state, &controller);
    controller.shutdown();
    let save_result = config::save_state(&state);
    log::info!("exiting");
    result?;
    save_result?;
    Ok(())
}

fn init_logging(state: &PersistedState, debug: bool) -> Result<()> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        state.log_level.parse().unwrap_or(LevelFilter::Info)
    };
    let path = config::log_path()?;
    let file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    WriteLogger::init(level, simplelog::Config::default(), file)
        .context("failed to install logger")?;
    Ok(())
}

fn open_engine(null_audio: bool) -> Box<dyn PlaybackEngine> {
    if null_audio {
        return Box::new(NullEngine::new());
    }
    match RodioEngine::new() {
        Ok(engine) => Box::new(engine),
        Err(err) => {
            log::warn!("no audio output ({err:#}); falling back to silent playback");
            Box::new(NullEngine::new())
        }
    }
}

fn remember(state: &mut PersistedState, controller: &Controller) {
    let mode = controller.mode();
    state.shuffle = mode.shuffle;
    state.repeat = mode.repeat;
    state.volume = controller.volume();
    state.playlist = controller.catalog().paths();
}

fn map_key(key: KeyEvent) -> Option<KeyAction> {
    let action = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('q') => KeyAction::Quit,
        KeyCode::Char(' ') => KeyAction::Command(Command::TogglePlayPause),
        KeyCode::Char('p') => KeyAction::Command(Command::Play),
        KeyCode::Char('s') => KeyAction::Command(Command::Stop),
        KeyCode::Left => KeyAction::Command(Command::Back),
        KeyCode::Right => KeyAction::Command(Command::Next),
        KeyCode::Up => KeyAction::Volume(VOLUME_STEP),
        KeyCode::Down => KeyAction::Volume(-VOLUME_STEP),
        KeyCode::Char('z') => KeyAction::Command(Command::ToggleShuffle),
        KeyCode::Char('r') => KeyAction::Command(Command::CycleRepeat),
        KeyCode::Char(digit @ '0'..='9') => {
            let tenth = digit.to_digit(10).unwrap_or(0);
            KeyAction::Command(Command::Seek(f64::from(tenth) / 10.0))
        }
        KeyCode::Char('j') => KeyAction::MoveCursor(1),
        KeyCode::Char('k') => KeyAction::MoveCursor(-1),
        KeyCode::Enter => KeyAction::SelectCursor,
        KeyCode::Delete => KeyAction::RemoveCursor,
        KeyCode::Char(':') => KeyAction::CommandMode,
        _ => return None,
    };
    Some(action)
}

fn step_volume(current: u8, delta: i16) -> u8 {
    (i16::from(current) + delta).clamp(0, 100) as u8
}

fn move_cursor(cursor: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    cursor.saturating_add_signed(delta).min(len - 1)
}

fn expand_path(path: &Path) -> Vec<PathBuf> {
    let path = config::normalize_path(path);
    if path.is_dir() {
        library::scan_folder(&path)
    } else {
        vec![path]
    }
}

/// Runs one `:` command line and returns the message to show.
fn run_command(controller: &mut Controller, raw: &str) -> String {
    let input = raw.trim();
    if input.is_empty() {
        return String::from("No command");
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => String::from(
            "Commands: add <path> | folder <dir> | save <file> | load <file> | remove <n>",
        ),
        "add" => {
            if rest.is_empty() {
                return String::from("Usage: add <path>");
            }
            let paths = expand_path(Path::new(rest));
            let count = paths.len();
            match controller.dispatch(Command::AddTracks(paths)) {
                Ok(()) => format!("Added {count} track(s)"),
                Err(err) => err.to_string(),
            }
        }
        "folder" => {
            if rest.is_empty() {
                return String::from("Usage: folder <dir>");
            }
            let root = config::normalize_path(Path::new(rest));
            if !root.is_dir() {
                return format!("Not a folder: {}", root.display());
            }
            let paths = library::scan_folder(&root);
            if paths.is_empty() {
                return format!("No media files in {}", root.display());
            }
            let count = paths.len();
            match controller.dispatch(Command::AddTracks(paths)) {
                Ok(()) => format!("Imported {count} track(s)"),
                Err(err) => err.to_string(),
            }
        }
        "save" => {
            if rest.is_empty() {
                return String::from("Usage: save <file>");
            }
            match config::save_playlist(Path::new(rest), &controller.catalog().paths()) {
                Ok(()) => format!("Saved playlist to {rest}"),
                Err(err) => format!("{err:#}"),
            }
        }
        "load" => {
            if rest.is_empty() {
                return String::from("Usage: load <file>");
            }
            match config::load_playlist(Path::new(rest)) {
                Ok(paths) => {
                    let count = paths.len();
                    match controller.dispatch(Command::ReplaceCatalog(paths)) {
                        Ok(()) => format!("Loaded {count} track(s)"),
                        Err(err) => err.to_string(),
                    }
                }
                Err(err) => format!("{err:#}"),
            }
        }
        "remove" => match rest.parse::<usize>() {
            Ok(position) if position > 0 => {
                match controller.dispatch(Command::RemoveTrack(position - 1)) {
                    Ok(()) => format!("Removed track {position}"),
                    Err(err) => err.to_string(),
                }
            }
            _ => String::from("Usage: remove <n>"),
        },
        _ => String::from("Unknown command. Use :help"),
    }
}
