use super::{FinalResult, GameKind, GameSession, SessionUpdate};
use crate::config::ArcadeConfig;
use crate::error::Result;
use crate::leaderboard::{MetaValue, Metadata};
use crate::position::{Position, PositionSource};
use crate::rounds::{Outcome, RoundSequencer, RoundSummary, RoundTransition, SequencerConfig};
use crate::runtime::GameEvent;
use crate::scheduler::TimerQueue;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const TARGET_SIZE: u32 = 60;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReflexMode {
    #[default]
    Standard,
    Precision,
    Endurance,
    Blitz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflexModeSettings {
    pub rounds: u32,
    pub min_delay_ms: i64,
    pub max_delay_ms: i64,
    /// Show a target that has to be clicked, not just anywhere.
    pub targets: bool,
}

impl ReflexMode {
    pub fn settings(&self) -> ReflexModeSettings {
        let (rounds, min_delay_ms, max_delay_ms, targets) = match self {
            ReflexMode::Standard => (5, 1_000, 4_000, false),
            ReflexMode::Precision => (8, 800, 3_000, true),
            ReflexMode::Endurance => (10, 600, 3_500, false),
            ReflexMode::Blitz => (15, 400, 2_000, true),
        };
        ReflexModeSettings {
            rounds,
            min_delay_ms,
            max_delay_ms,
            targets,
        }
    }
}

/// Clicking before the signal is a false start. In target modes a click off
/// the target restarts the round without recording a time.
pub struct ReflexSession<R: Rng = StdRng> {
    mode: ReflexMode,
    settings: ReflexModeSettings,
    target_radius: f64,
    rounds: RoundSequencer<R>,
    started: bool,
}

impl<R: Rng> std::fmt::Debug for ReflexSession<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflexSession")
            .field("mode", &self.mode)
            .field("rounds", &self.rounds)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl<R: Rng> ReflexSession<R> {
    pub fn new(
        mode: ReflexMode,
        config: &ArcadeConfig,
        rng: R,
        positions: Box<dyn PositionSource>,
    ) -> Result<Self> {
        let settings = mode.settings();
        let margin = (TARGET_SIZE / 2 + 20).max(50);
        let sequencer = SequencerConfig {
            target_rounds: Some(settings.rounds),
            max_active: 1,
            min_delay_ms: settings.min_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            false_starts: true,
            lifetime_ms: None,
            bounds: config.bounds(margin, margin),
        };
        Ok(Self {
            mode,
            settings,
            target_radius: config.reflex.target_radius,
            rounds: RoundSequencer::new(sequencer, rng, positions)?,
            started: false,
        })
    }

    pub fn mode(&self) -> ReflexMode {
        self.mode
    }

    /// True once the current round's signal is showing.
    pub fn is_live(&self) -> bool {
        self.rounds.active().any(|r| r.is_actionable())
    }

    /// Position of the live target in target modes.
    pub fn target(&self) -> Option<Position> {
        if !self.settings.targets {
            return None;
        }
        self.rounds
            .active()
            .find(|r| r.is_actionable())
            .map(|r| r.position)
    }

    pub fn completed_rounds(&self) -> u32 {
        self.rounds.resolved_count()
    }

    pub fn summary(&self) -> RoundSummary {
        self.rounds.summary()
    }

    fn on_press(&mut self, at: Position, now: u64, queue: &mut TimerQueue) -> Result<SessionUpdate> {
        if !self.started || self.rounds.is_complete() {
            return Ok(SessionUpdate::Nothing);
        }
        let Some(round) = self.rounds.active().next().cloned() else {
            return Ok(SessionUpdate::Nothing);
        };
        if !round.is_actionable() {
            self.rounds.premature_action(now, queue)?;
            return Ok(SessionUpdate::Changed);
        }
        if self.settings.targets && round.position.distance(&at) > self.target_radius {
            self.rounds.retry(round.id, now, queue)?;
            return Ok(SessionUpdate::Changed);
        }

        let Some(resolved) = self.rounds.resolve(round.id, Outcome::Hit, now, queue) else {
            return Ok(SessionUpdate::Nothing);
        };
        match resolved.summary {
            Some(summary) => Ok(self.finish(summary)),
            None => {
                self.rounds.fill(now, queue)?;
                Ok(SessionUpdate::Changed)
            }
        }
    }

    fn finish(&mut self, summary: RoundSummary) -> SessionUpdate {
        self.started = false;
        let Some(average) = summary.average_reaction_ms else {
            warn!("reflex game ended without a reaction time");
            return SessionUpdate::Changed;
        };
        let best = summary.reaction_times_ms.iter().copied().min().unwrap_or(average);
        let mut metadata = Metadata::new();
        metadata.insert("bestTime".into(), MetaValue::Int(best as i64));
        metadata.insert("totalRounds".into(), MetaValue::from(summary.hits));
        metadata.insert("falseStarts".into(), MetaValue::from(summary.false_starts));
        metadata.insert("gameMode".into(), MetaValue::from(self.mode.to_string()));
        if let Some(consistency) = summary.consistency_ms {
            metadata.insert("consistency".into(), MetaValue::Int(consistency.round() as i64));
        }
        info!(average, best, mode = %self.mode, "reflex game finished");
        SessionUpdate::Finished(FinalResult {
            game: GameKind::Reflex,
            metric: average as f64,
            metadata,
        })
    }
}

impl<R: Rng> GameSession for ReflexSession<R> {
    fn kind(&self) -> GameKind {
        GameKind::Reflex
    }

    fn start(&mut self, now: u64, queue: &mut TimerQueue) -> Result<()> {
        self.rounds.reset(queue);
        self.rounds.fill(now, queue)?;
        self.started = true;
        Ok(())
    }

    fn handle(&mut self, event: &GameEvent, now: u64, queue: &mut TimerQueue) -> Result<SessionUpdate> {
        match *event {
            GameEvent::Press { at } => self.on_press(at, now, queue),
            GameEvent::Timer(id) => match self.rounds.on_timer(id, now, queue) {
                Some(RoundTransition::Actionable { .. }) => Ok(SessionUpdate::Changed),
                Some(RoundTransition::Expired(_)) | None => Ok(SessionUpdate::Nothing),
            },
            _ => Ok(SessionUpdate::Nothing),
        }
    }

    fn teardown(&mut self, queue: &mut TimerQueue) {
        self.rounds.cancel_all(queue);
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::FixedPositions;
    use rand::SeedableRng;

    const SPOT: Position = Position { x: 300, y: 300 };

    fn session(mode: ReflexMode) -> ReflexSession {
        ReflexSession::new(
            mode,
            &ArcadeConfig::default(),
            StdRng::seed_from_u64(3),
            Box::new(FixedPositions::new(vec![SPOT])),
        )
        .unwrap()
    }

    fn press_at(p: Position) -> GameEvent {
        GameEvent::Press { at: p }
    }

    /// Advance to the next round timer and fire it.
    fn go_live(s: &mut ReflexSession, q: &mut TimerQueue) -> u64 {
        let now = q.next_deadline().unwrap();
        for id in q.poll(now) {
            s.handle(&GameEvent::Timer(id), now, q).unwrap();
        }
        assert!(s.is_live());
        now
    }

    #[test]
    fn mode_table() {
        assert_eq!(ReflexMode::Standard.settings().rounds, 5);
        let blitz = ReflexMode::Blitz.settings();
        assert_eq!((blitz.rounds, blitz.min_delay_ms, blitz.max_delay_ms), (15, 400, 2_000));
        assert!(ReflexMode::Precision.settings().targets);
        assert!(!ReflexMode::Endurance.settings().targets);
    }

    #[test]
    fn standard_game_averages_reaction_times() {
        let mut s = session(ReflexMode::Standard);
        let mut q = TimerQueue::new();
        s.start(0, &mut q).unwrap();

        let reactions = [200u64, 300, 250, 350, 400];
        let mut result = None;
        for r in reactions {
            let shown = go_live(&mut s, &mut q);
            if let SessionUpdate::Finished(done) = s.handle(&press_at(Position::new(1, 1)), shown + r, &mut q).unwrap() {
                result = Some(done);
            }
        }
        let result = result.unwrap();
        assert_eq!(result.game, GameKind::Reflex);
        assert_eq!(result.metric, 300.0);
        assert_eq!(result.metadata.get("bestTime"), Some(&MetaValue::Int(200)));
        assert_eq!(result.metadata.get("totalRounds"), Some(&MetaValue::Int(5)));
        assert!(q.is_empty());
    }

    #[test]
    fn early_click_is_a_false_start() {
        let mut s = session(ReflexMode::Standard);
        let mut q = TimerQueue::new();
        s.start(0, &mut q).unwrap();
        assert_eq!(s.handle(&press_at(SPOT), 100, &mut q).unwrap(), SessionUpdate::Changed);
        assert_eq!(s.summary().false_starts, 1);
        assert_eq!(s.completed_rounds(), 0);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn off_target_click_restarts_round() {
        let mut s = session(ReflexMode::Precision);
        let mut q = TimerQueue::new();
        s.start(0, &mut q).unwrap();
        let shown = go_live(&mut s, &mut q);
        assert_eq!(s.target(), Some(SPOT));

        s.handle(&press_at(Position::new(500, 500)), shown + 150, &mut q).unwrap();
        assert_eq!(s.completed_rounds(), 0);
        assert!(!s.is_live());
        assert_eq!(s.summary().false_starts, 0);

        let shown = go_live(&mut s, &mut q);
        s.handle(&press_at(Position::new(310, 320)), shown + 180, &mut q).unwrap();
        assert_eq!(s.completed_rounds(), 1);
        assert_eq!(s.summary().reaction_times_ms, vec![180]);
    }

    #[test]
    fn input_ignored_before_start() {
        let mut s = session(ReflexMode::Standard);
        let mut q = TimerQueue::new();
        assert_eq!(s.handle(&press_at(SPOT), 0, &mut q).unwrap(), SessionUpdate::Nothing);
    }
}
