//! XDG base-directory paths for config and persisted state.

use std::env;
use std::path::PathBuf;

fn home() -> PathBuf {
    env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

/// `$XDG_CONFIG_HOME/prismis` (default `~/.config/prismis`).
pub fn config_dir() -> PathBuf {
    let base = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home().join(".config"));
    base.join("prismis")
}

/// `$XDG_DATA_HOME/prismis` (default `~/.local/share/prismis`).
pub fn data_dir() -> PathBuf {
    let base = env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home().join(".local").join("share"));
    base.join("prismis")
}

pub fn db_path() -> PathBuf {
    data_dir().join("prismis.db")
}

pub fn audio_dir() -> PathBuf {
    data_dir().join("audio")
}

pub fn observability_dir() -> PathBuf {
    data_dir().join("observability")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hangs_off_data_dir() {
        let data = data_dir();
        assert!(db_path().starts_with(&data));
        assert!(audio_dir().starts_with(&data));
        assert!(observability_dir().starts_with(&data));
        assert!(db_path().ends_with("prismis/prismis.db"));
    }
}
