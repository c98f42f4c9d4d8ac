use super::{FinalResult, GameKind, GameSession, SessionUpdate};
use crate::config::ArcadeConfig;
use crate::error::Result;
use crate::leaderboard::{MetaValue, Metadata};
use crate::position::{Position, PositionSource};
use crate::rounds::{Outcome, RoundSequencer, RoundTransition, SequencerConfig};
use crate::runtime::GameEvent;
use crate::scheduler::TimerQueue;
use crate::stats::shot_accuracy;
use crate::timer::{Countdown, TickOutcome};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const POINTS_PER_HIT: u32 = 10;
/// Extra pixels around a target that still count as a hit.
pub const HIT_TOLERANCE: f64 = 5.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AimMode {
    #[default]
    Classic,
    Rapid,
    Precision,
    Chaos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AimModeSettings {
    /// Target diameter in pixels.
    pub target_size: u32,
    /// Targets on screen at once.
    pub target_count: usize,
    /// How long a target stays before it moves.
    pub lifetime_ms: u64,
    pub time_limit_secs: u32,
}

impl AimMode {
    pub fn settings(&self) -> AimModeSettings {
        let (target_size, target_count, lifetime_ms, time_limit_secs) = match self {
            AimMode::Classic => (50, 1, 2_000, 30),
            AimMode::Rapid => (40, 2, 1_000, 30),
            AimMode::Precision => (30, 1, 3_000, 45),
            AimMode::Chaos => (35, 3, 800, 30),
        };
        AimModeSettings {
            target_size,
            target_count,
            lifetime_ms,
            time_limit_secs,
        }
    }
}

impl AimModeSettings {
    pub fn hit_radius(&self) -> f64 {
        self.target_size as f64 / 2.0 + HIT_TOLERANCE
    }

    /// Keeps whole targets inside the play area.
    pub fn margin(&self) -> u32 {
        (self.target_size / 2 + 20).max(50)
    }
}

pub struct AimSession<R: Rng = StdRng> {
    mode: AimMode,
    settings: AimModeSettings,
    countdown: Countdown,
    targets: RoundSequencer<R>,
    score: u32,
    hits: u32,
    shots: u32,
}

impl<R: Rng> std::fmt::Debug for AimSession<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AimSession")
            .field("mode", &self.mode)
            .field("countdown", &self.countdown)
            .field("targets", &self.targets)
            .field("score", &self.score)
            .field("shots", &self.shots)
            .finish()
    }
}

impl<R: Rng> AimSession<R> {
    pub fn new(
        mode: AimMode,
        config: &ArcadeConfig,
        rng: R,
        positions: Box<dyn PositionSource>,
    ) -> Result<Self> {
        let settings = mode.settings();
        let margin = settings.margin();
        let sequencer = SequencerConfig {
            target_rounds: None,
            max_active: settings.target_count,
            min_delay_ms: 0,
            max_delay_ms: 0,
            false_starts: false,
            lifetime_ms: Some(settings.lifetime_ms),
            bounds: config.bounds(margin, margin),
        };
        Ok(Self {
            mode,
            settings,
            countdown: Countdown::new(settings.time_limit_secs as i64)?,
            targets: RoundSequencer::new(sequencer, rng, positions)?,
            score: 0,
            hits: 0,
            shots: 0,
        })
    }

    pub fn mode(&self) -> AimMode {
        self.mode
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Targets currently on screen.
    pub fn live_targets(&self) -> Vec<Position> {
        self.targets
            .active()
            .filter(|r| r.is_actionable())
            .map(|r| r.position)
            .collect()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn shots(&self) -> u32 {
        self.shots
    }

    pub fn accuracy(&self) -> u32 {
        shot_accuracy(self.hits, self.shots)
    }

    fn on_press(&mut self, at: Position, now: u64, queue: &mut TimerQueue) -> Result<SessionUpdate> {
        if !self.countdown.is_running() {
            return Ok(SessionUpdate::Nothing);
        }
        self.shots += 1;
        if let Some(id) = self.targets.hit_test(at, self.settings.hit_radius()) {
            self.targets.resolve(id, Outcome::Hit, now, queue);
            self.hits += 1;
            self.score += POINTS_PER_HIT;
            self.targets.fill(now, queue)?;
            debug!(score = self.score, "target hit");
        }
        Ok(SessionUpdate::Changed)
    }

    fn finish(&mut self, queue: &mut TimerQueue) -> FinalResult {
        self.targets.cancel_all(queue);
        let mut metadata = Metadata::new();
        metadata.insert("accuracy".into(), MetaValue::from(self.accuracy()));
        metadata.insert("hits".into(), MetaValue::from(self.hits));
        metadata.insert("shots".into(), MetaValue::from(self.shots));
        metadata.insert("gameMode".into(), MetaValue::from(self.mode.to_string()));
        FinalResult {
            game: GameKind::Aim,
            metric: self.score as f64,
            metadata,
        }
    }
}

impl<R: Rng> GameSession for AimSession<R> {
    fn kind(&self) -> GameKind {
        GameKind::Aim
    }

    fn start(&mut self, now: u64, queue: &mut TimerQueue) -> Result<()> {
        self.countdown
            .start(self.settings.time_limit_secs as i64, now, queue)?;
        self.targets.reset(queue);
        self.score = 0;
        self.hits = 0;
        self.shots = 0;
        self.targets.fill(now, queue)?;
        Ok(())
    }

    fn handle(&mut self, event: &GameEvent, now: u64, queue: &mut TimerQueue) -> Result<SessionUpdate> {
        match *event {
            GameEvent::Press { at } => self.on_press(at, now, queue),
            GameEvent::Timer(id) => {
                match self.countdown.on_timer(id, now, queue) {
                    TickOutcome::Ticked(_) => return Ok(SessionUpdate::Changed),
                    TickOutcome::Completed => return Ok(SessionUpdate::Finished(self.finish(queue))),
                    TickOutcome::Ignored => {}
                }
                match self.targets.on_timer(id, now, queue) {
                    Some(RoundTransition::Actionable { .. }) => Ok(SessionUpdate::Changed),
                    Some(RoundTransition::Expired(_)) => {
                        self.targets.fill(now, queue)?;
                        Ok(SessionUpdate::Changed)
                    }
                    None => Ok(SessionUpdate::Nothing),
                }
            }
            _ => Ok(SessionUpdate::Nothing),
        }
    }

    fn teardown(&mut self, queue: &mut TimerQueue) {
        self.countdown.stop(queue);
        self.targets.cancel_all(queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::FixedPositions;
    use rand::SeedableRng;

    fn session(mode: AimMode) -> AimSession {
        let positions = FixedPositions::new(vec![Position::new(200, 200), Position::new(500, 400)]);
        AimSession::new(
            mode,
            &ArcadeConfig::default(),
            StdRng::seed_from_u64(7),
            Box::new(positions),
        )
        .unwrap()
    }

    /// Deliver every timer due at `now`, returning the last update.
    fn pump(s: &mut AimSession, q: &mut TimerQueue, now: u64) -> Option<SessionUpdate> {
        q.poll(now)
            .into_iter()
            .map(|id| s.handle(&GameEvent::Timer(id), now, q).unwrap())
            .last()
    }

    fn press(x: u32, y: u32) -> GameEvent {
        GameEvent::Press {
            at: Position::new(x, y),
        }
    }

    #[test]
    fn mode_table() {
        let chaos = AimMode::Chaos.settings();
        assert_eq!(chaos.target_count, 3);
        assert_eq!(chaos.lifetime_ms, 800);
        assert_eq!(AimMode::Precision.settings().time_limit_secs, 45);
        assert_eq!(AimMode::Classic.settings().hit_radius(), 30.0);
        assert_eq!(AimMode::Rapid.to_string(), "rapid");
    }

    #[test]
    fn targets_appear_then_hits_score() {
        let mut s = session(AimMode::Classic);
        let mut q = TimerQueue::new();
        s.start(0, &mut q).unwrap();
        assert!(s.live_targets().is_empty());
        pump(&mut s, &mut q, 1);
        assert_eq!(s.live_targets(), vec![Position::new(200, 200)]);

        s.handle(&press(220, 210), 300, &mut q).unwrap();
        assert_eq!(s.score(), 10);
        assert_eq!(s.hits(), 1);
        pump(&mut s, &mut q, 301);
        assert_eq!(s.live_targets(), vec![Position::new(500, 400)]);

        s.handle(&press(10, 10), 400, &mut q).unwrap();
        assert_eq!(s.shots(), 2);
        assert_eq!(s.accuracy(), 50);
    }

    #[test]
    fn expired_targets_are_replaced() {
        let mut s = session(AimMode::Classic);
        let mut q = TimerQueue::new();
        s.start(0, &mut q).unwrap();
        pump(&mut s, &mut q, 1);
        assert_eq!(pump(&mut s, &mut q, 2_001), Some(SessionUpdate::Changed));
        pump(&mut s, &mut q, 2_002);
        assert_eq!(s.live_targets(), vec![Position::new(500, 400)]);
        assert_eq!(s.shots(), 0);
    }

    #[test]
    fn chaos_keeps_three_targets_live() {
        let mut s = session(AimMode::Chaos);
        let mut q = TimerQueue::new();
        s.start(0, &mut q).unwrap();
        pump(&mut s, &mut q, 1);
        assert_eq!(s.live_targets().len(), 3);
    }

    #[test]
    fn time_limit_ends_game_and_clears_targets() {
        let mut s = session(AimMode::Classic);
        let mut q = TimerQueue::new();
        s.start(0, &mut q).unwrap();
        pump(&mut s, &mut q, 1);
        s.handle(&press(200, 200), 100, &mut q).unwrap();

        let mut result = None;
        for id in q.poll(30_000) {
            if let SessionUpdate::Finished(r) = s.handle(&GameEvent::Timer(id), 30_000, &mut q).unwrap() {
                result = Some(r);
            }
        }
        let result = result.unwrap();
        assert_eq!(result.metric, 10.0);
        assert_eq!(result.metadata.get("accuracy"), Some(&MetaValue::Int(100)));
        assert_eq!(result.metadata.get("gameMode"), Some(&MetaValue::from("classic")));
        assert!(q.is_empty());
    }
}
