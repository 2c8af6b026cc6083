use crate::model::PersistedState;
use anyhow::{Context, Result, bail};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "ghost";
const STATE_FILE: &str = "state.json";
const LOG_FILE: &str = "ghost.log";

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("GHOST_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn state_path() -> Result<PathBuf> {
    Ok(config_root()?.join(STATE_FILE))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(ensure_config_dir()?.join(LOG_FILE))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

pub fn load_state() -> Result<PersistedState> {
    load_state_from(&state_path()?)
}

pub fn save_state(state: &PersistedState) -> Result<()> {
    ensure_config_dir()?;
    save_state_to(&state_path()?, state)
}

/// A missing file yields defaults; a malformed one is an error.
pub fn load_state_from(path: &Path) -> Result<PersistedState> {
    if !path.exists() {
        return Ok(PersistedState::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let state: PersistedState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse state file {}", path.display()))?;
    Ok(state)
}

pub fn save_state_to(path: &Path, state: &PersistedState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Writes the playlist as a JSON array of path strings.
pub fn save_playlist(path: &Path, tracks: &[PathBuf]) -> Result<()> {
    if tracks.is_empty() {
        bail!("Playlist is empty");
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(tracks)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_playlist(path: &Path) -> Result<Vec<PathBuf>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read playlist {}", path.display()))?;
    let tracks: Vec<PathBuf> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse playlist {}", path.display()))?;
    Ok(tracks)
}

pub fn normalize_path(path: &Path) -> PathBuf {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    strip_windows_verbatim_prefix(&canonical)
}

pub fn strip_windows_verbatim_prefix(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();

    if let Some(trimmed) = raw.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{trimmed}"));
    }

    if let Some(trimmed) = raw.strip_prefix(r"\\?\") {
        return PathBuf::from(trimmed);
    }

    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepeatMode;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip_through_config_dir() {
        let dir = tempdir().expect("tempdir");
        unsafe {
            env::set_var("GHOST_CONFIG_DIR", dir.path().to_string_lossy().as_ref());
        }

        let state = PersistedState {
            repeat: RepeatMode::All,
            volume: 35,
            playlist: vec![PathBuf::from("a.mp3")],
            ..PersistedState::default()
        };
        save_state(&state).expect("save");
        let loaded = load_state().expect("load");
        assert_eq!(loaded.repeat, RepeatMode::All);
        assert_eq!(loaded.volume, 35);
        assert_eq!(loaded.playlist, vec![PathBuf::from("a.mp3")]);
        assert!(log_path().expect("log path").starts_with(dir.path()));
    }

    #[test]
    fn missing_state_file_gives_defaults() {
        let dir = tempdir().expect("tempdir");
        let state = load_state_from(&dir.path().join("nope.json")).expect("load");
        assert_eq!(state.volume, 70);
        assert!(state.autoplay_on_select);
    }

    #[test]
    fn malformed_state_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(STATE_FILE);
        fs::write(&path, "{ not json").expect("write");
        let err = load_state_from(&path).expect_err("should fail");
        assert!(err.to_string().contains("failed to parse state file"));
    }

    #[test]
    fn playlist_round_trip_keeps_order() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("lists").join("evening.json");
        let tracks = vec![PathBuf::from("/music/b.flac"), PathBuf::from("/music/a.mp3")];

        save_playlist(&path, &tracks).expect("save");
        assert_eq!(load_playlist(&path).expect("load"), tracks);
    }

    #[test]
    fn empty_playlist_is_not_saved() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("empty.json");
        let err = save_playlist(&path, &[]).expect_err("should refuse");
        assert_eq!(err.to_string(), "Playlist is empty");
        assert!(!path.exists());
    }

    #[test]
    fn strips_windows_verbatim_prefix() {
        let cleaned = strip_windows_verbatim_prefix(Path::new(r"\\?\E:\MUSIC\a.mp3"));
        assert_eq!(cleaned, PathBuf::from(r"E:\MUSIC\a.mp3"));
        let unc = strip_windows_verbatim_prefix(Path::new(r"\\?\UNC\nas\share\b.mp3"));
        assert_eq!(unc, PathBuf::from(r"\\nas\share\b.mp3"));
    }
}
