use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "quickdraw")
    }

    /// Local data directory, `~/.local/state/quickdraw` when `HOME` is set.
    pub fn data_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("quickdraw"),
            )
        } else {
            Self::project().map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("scores.db"))
    }

    /// Directory holding one JSON file per storage key.
    pub fn scores_dir() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("scores"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::project().map(|pd| pd.config_dir().join("config.json"))
    }
}
