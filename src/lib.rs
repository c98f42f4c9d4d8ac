// Core of the quickdraw mini-games: timers, rounds, scoring and local
// leaderboards. Rendering and input capture belong to the embedding front end.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod error;
pub mod games;
pub mod leaderboard;
pub mod logging;
pub mod medal;
pub mod position;
pub mod rounds;
pub mod runtime;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod timer;
pub mod util;

pub use error::{Error, Result};
