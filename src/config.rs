use crate::app_dirs::AppDirs;
use crate::error::{Error, Result};
use crate::games::aim::AimMode;
use crate::games::reflex::ReflexMode;
use crate::games::typing::Difficulty;
use crate::medal::MedalPolicy;
use crate::position::Bounds;
use crate::storage::{JsonDirStore, KeyValueStore, MemoryStore, SqliteStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrecisionSettings {
    pub timer_secs: u32,
    pub min_margin: u32,
    pub top_margin: u32,
    pub target_radius: f64,
}

impl Default for PrecisionSettings {
    fn default() -> Self {
        Self {
            timer_secs: 30,
            min_margin: 20,
            top_margin: 80,
            target_radius: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AimSettings {
    pub mode: AimMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReflexSettings {
    pub mode: ReflexMode,
    pub target_radius: f64,
}

impl Default for ReflexSettings {
    fn default() -> Self {
        Self {
            mode: ReflexMode::default(),
            target_radius: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TypingSettings {
    pub timer_secs: u32,
    pub difficulty: Difficulty,
}

impl Default for TypingSettings {
    fn default() -> Self {
        Self {
            timer_secs: 120,
            difficulty: Difficulty::default(),
        }
    }
}

/// Where leaderboards and high scores are kept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Lost on exit.
    Memory,
    #[default]
    JsonDir,
    Sqlite,
}

impl StorageBackend {
    /// Open the backend at its platform location.
    pub fn open(&self) -> Result<Box<dyn KeyValueStore>> {
        let store: Box<dyn KeyValueStore> = match self {
            StorageBackend::Memory => Box::new(MemoryStore::new()),
            StorageBackend::JsonDir => {
                let dir = AppDirs::scores_dir()
                    .ok_or_else(|| Error::persistence("no data directory for scores"))?;
                Box::new(JsonDirStore::new(dir))
            }
            StorageBackend::Sqlite => {
                let path = AppDirs::db_path()
                    .ok_or_else(|| Error::persistence("no data directory for scores"))?;
                Box::new(SqliteStore::open(path)?)
            }
        };
        debug!(backend = ?self, "score storage opened");
        Ok(store)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArcadeConfig {
    pub area_width: u32,
    pub area_height: u32,
    pub precision: PrecisionSettings,
    pub aim: AimSettings,
    pub reflex: ReflexSettings,
    pub typing: TypingSettings,
    /// Entries kept per leaderboard; `None` keeps all of them.
    pub leaderboard_cap: Option<usize>,
    pub medal_policy: MedalPolicy,
    pub storage: StorageBackend,
}

impl Default for ArcadeConfig {
    fn default() -> Self {
        Self {
            area_width: 800,
            area_height: 600,
            precision: PrecisionSettings::default(),
            aim: AimSettings::default(),
            reflex: ReflexSettings::default(),
            typing: TypingSettings::default(),
            leaderboard_cap: Some(10),
            medal_policy: MedalPolicy::default(),
            storage: StorageBackend::default(),
        }
    }
}

impl ArcadeConfig {
    /// Placement bounds for a game with the given margins.
    pub fn bounds(&self, min_margin: u32, top_margin: u32) -> Bounds {
        Bounds::new(self.area_width, self.area_height, min_margin, top_margin)
    }
}

pub trait ConfigStore {
    fn load(&self) -> ArcadeConfig;
    fn save(&self, cfg: &ArcadeConfig) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("quickdraw_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> ArcadeConfig {
        let Ok(bytes) = fs::read(&self.path) else {
            return ArcadeConfig::default();
        };
        match serde_json::from_slice::<ArcadeConfig>(&bytes) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "config unreadable, using defaults");
                ArcadeConfig::default()
            }
        }
    }

    fn save(&self, cfg: &ArcadeConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
