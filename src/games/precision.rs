use super::{FinalResult, GameKind, GameSession, SessionUpdate};
use crate::config::{ArcadeConfig, PrecisionSettings};
use crate::error::Result;
use crate::leaderboard::{Metadata, MetaValue};
use crate::position::{Bounds, Position, PositionSource};
use crate::runtime::GameEvent;
use crate::scheduler::TimerQueue;
use crate::timer::{Countdown, TickOutcome};
use tracing::debug;

pub struct PrecisionSession {
    settings: PrecisionSettings,
    bounds: Bounds,
    countdown: Countdown,
    positions: Box<dyn PositionSource>,
    target: Option<Position>,
    hits: u32,
    misses: u32,
}

impl std::fmt::Debug for PrecisionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecisionSession")
            .field("countdown", &self.countdown)
            .field("target", &self.target)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish_non_exhaustive()
    }
}

impl PrecisionSession {
    pub fn new(config: &ArcadeConfig, positions: Box<dyn PositionSource>) -> Result<Self> {
        let settings = config.precision;
        Ok(Self {
            settings,
            bounds: config.bounds(settings.min_margin, settings.top_margin),
            countdown: Countdown::new(settings.timer_secs as i64)?,
            positions,
            target: None,
            hits: 0,
            misses: 0,
        })
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Where the target is, while a game is running.
    pub fn target(&self) -> Option<Position> {
        self.target
    }

    pub fn score(&self) -> u32 {
        self.hits
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    fn on_press(&mut self, at: Position) -> SessionUpdate {
        let Some(target) = self.target.filter(|_| self.countdown.is_running()) else {
            return SessionUpdate::Nothing;
        };
        if target.distance(&at) <= self.settings.target_radius {
            self.hits += 1;
            self.target = Some(self.positions.next_position(&self.bounds));
            debug!(score = self.hits, "target hit");
        } else {
            self.misses += 1;
        }
        SessionUpdate::Changed
    }

    fn finish(&mut self) -> FinalResult {
        self.target = None;
        let mut metadata = Metadata::new();
        metadata.insert("misses".into(), MetaValue::from(self.misses));
        FinalResult {
            game: GameKind::Precision,
            metric: self.hits as f64,
            metadata,
        }
    }
}

impl GameSession for PrecisionSession {
    fn kind(&self) -> GameKind {
        GameKind::Precision
    }

    fn start(&mut self, now: u64, queue: &mut TimerQueue) -> Result<()> {
        self.countdown
            .start(self.settings.timer_secs as i64, now, queue)?;
        self.hits = 0;
        self.misses = 0;
        self.target = Some(self.positions.next_position(&self.bounds));
        Ok(())
    }

    fn handle(&mut self, event: &GameEvent, now: u64, queue: &mut TimerQueue) -> Result<SessionUpdate> {
        let update = match *event {
            GameEvent::Press { at } => self.on_press(at),
            GameEvent::Timer(id) => match self.countdown.on_timer(id, now, queue) {
                TickOutcome::Ignored => SessionUpdate::Nothing,
                TickOutcome::Ticked(_) => SessionUpdate::Changed,
                TickOutcome::Completed => SessionUpdate::Finished(self.finish()),
            },
            _ => SessionUpdate::Nothing,
        };
        Ok(update)
    }

    fn teardown(&mut self, queue: &mut TimerQueue) {
        self.countdown.stop(queue);
        self.target = None;
    }
}
