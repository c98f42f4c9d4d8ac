pub mod aim;
pub mod precision;
pub mod reflex;
pub mod typing;

pub use aim::{AimMode, AimSession};
pub use precision::PrecisionSession;
pub use reflex::{ReflexMode, ReflexSession};
pub use typing::{Difficulty, TypingSession};

use crate::error::Result;
use crate::leaderboard::{BoardSpec, LeaderboardStore, Metadata, SortDirection};
use crate::runtime::GameEvent;
use crate::scheduler::TimerQueue;
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum GameKind {
    Precision,
    Aim,
    Reflex,
    Typing,
}

impl GameKind {
    pub const ALL: [GameKind; 4] = [
        GameKind::Precision,
        GameKind::Aim,
        GameKind::Reflex,
        GameKind::Typing,
    ];

    pub fn storage_key(&self) -> &'static str {
        match self {
            GameKind::Precision => "hitplayers",
            GameKind::Aim => "aimplayers",
            GameKind::Reflex => "reflexplayers",
            GameKind::Typing => "players",
        }
    }

    /// Leaderboard layout. Reaction time is the only metric where lower wins.
    pub fn board(&self, cap: Option<usize>) -> BoardSpec {
        let (metric_field, direction, high_score_key) = match self {
            GameKind::Precision => ("score", SortDirection::HigherIsBetter, "precisionhighscore"),
            GameKind::Aim => ("score", SortDirection::HigherIsBetter, "aimhighscore"),
            GameKind::Reflex => ("averageTime", SortDirection::LowerIsBetter, "reflexhighscore"),
            GameKind::Typing => ("wpm", SortDirection::HigherIsBetter, "typinghighscore"),
        };
        BoardSpec::new(self.storage_key(), metric_field, direction)
            .with_cap(cap)
            .with_high_score_key(high_score_key)
    }
}

/// Board specs for every game, ready for [`LeaderboardStore::new`].
pub fn boards(cap: Option<usize>) -> Vec<BoardSpec> {
    GameKind::ALL.iter().map(|g| g.board(cap)).collect()
}

/// Outcome of a finished game in the shape its leaderboard stores.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResult {
    pub game: GameKind,
    pub metric: f64,
    pub metadata: Metadata,
}

impl FinalResult {
    /// Add this result to the game's leaderboard under `name`.
    pub fn submit<S: KeyValueStore>(
        &self,
        board: &mut LeaderboardStore<S>,
        name: &str,
    ) -> Result<Option<usize>> {
        board.submit(self.game.storage_key(), name, self.metric, self.metadata.clone())
    }

    /// Record the metric as the game's best score if it beats the stored one.
    pub fn offer_high_score<S: KeyValueStore>(&self, board: &mut LeaderboardStore<S>) -> Result<bool> {
        board.offer_high_score(self.game.storage_key(), self.metric)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Nothing,
    /// Visible state changed.
    Changed,
    Finished(FinalResult),
}

pub trait GameSession {
    fn kind(&self) -> GameKind;

    /// Begin a fresh game at `now`, discarding any game in progress.
    fn start(&mut self, now: u64, queue: &mut TimerQueue) -> Result<()>;

    fn handle(&mut self, event: &GameEvent, now: u64, queue: &mut TimerQueue) -> Result<SessionUpdate>;

    /// Cancel every timer the session still holds.
    fn teardown(&mut self, queue: &mut TimerQueue);
}
