use crate::error::{Error, Result};
use crate::position::{Bounds, Position, PositionSource};
use crate::scheduler::{TimerHandle, TimerId, TimerQueue};
use crate::stats::{average_reaction_ms, reaction_consistency_ms};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoundId(u64);

impl RoundId {
    pub fn new(raw: u64) -> Self {
        RoundId(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum Outcome {
    Pending,
    Hit,
    Missed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundEvent {
    pub id: RoundId,
    pub scheduled_delay_ms: u64,
    pub position: Position,
    pub outcome: Outcome,
    /// Set once the delay elapsed and the target is live.
    pub actionable_at: Option<u64>,
}

impl RoundEvent {
    pub fn is_actionable(&self) -> bool {
        self.outcome == Outcome::Pending && self.actionable_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Rounds that must resolve (hit or missed) before the sequence ends.
    /// `None` keeps going until the owner stops it, e.g. on a countdown.
    pub target_rounds: Option<u32>,
    pub max_active: usize,
    pub min_delay_ms: i64,
    pub max_delay_ms: i64,
    /// Acting before a round is live restarts it and counts a false start.
    pub false_starts: bool,
    /// Live targets expire after this long.
    pub lifetime_ms: Option<u64>,
    pub bounds: Bounds,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            target_rounds: Some(5),
            max_active: 1,
            min_delay_ms: 1_000,
            max_delay_ms: 4_000,
            false_starts: true,
            lifetime_ms: None,
            bounds: Bounds::default(),
        }
    }
}

fn check_range(min_ms: i64, max_ms: i64) -> Result<()> {
    if min_ms < 0 || max_ms < 0 || min_ms > max_ms {
        return Err(Error::InvalidRange { min_ms, max_ms });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundTransition {
    Actionable { id: RoundId, position: Position },
    Expired(RoundId),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RoundSummary {
    pub hits: u32,
    pub misses: u32,
    pub expired: u32,
    pub false_starts: u32,
    pub reaction_times_ms: Vec<u64>,
    pub average_reaction_ms: Option<u64>,
    pub consistency_ms: Option<f64>,
}

/// What a successful `resolve` did.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub id: RoundId,
    pub outcome: Outcome,
    pub reaction_ms: Option<u64>,
    /// Present when this resolution completed the sequence.
    pub summary: Option<RoundSummary>,
}

#[derive(Debug)]
struct ActiveRound {
    event: RoundEvent,
    timer: Option<TimerHandle>,
}

pub struct RoundSequencer<R: Rng> {
    config: SequencerConfig,
    rng: R,
    positions: Box<dyn PositionSource>,
    active: Vec<ActiveRound>,
    next_id: u64,
    resolved: u32,
    hits: u32,
    misses: u32,
    expired: u32,
    false_starts: u32,
    reaction_times_ms: Vec<u64>,
    complete: bool,
}

impl<R: Rng> std::fmt::Debug for RoundSequencer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundSequencer")
            .field("config", &self.config)
            .field("active", &self.active)
            .field("resolved", &self.resolved)
            .field("false_starts", &self.false_starts)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

impl<R: Rng> RoundSequencer<R> {
    pub fn new(config: SequencerConfig, rng: R, positions: Box<dyn PositionSource>) -> Result<Self> {
        check_range(config.min_delay_ms, config.max_delay_ms)?;
        Ok(Self {
            config: SequencerConfig {
                max_active: config.max_active.max(1),
                ..config
            },
            rng,
            positions,
            active: Vec::new(),
            next_id: 0,
            resolved: 0,
            hits: 0,
            misses: 0,
            expired: 0,
            false_starts: 0,
            reaction_times_ms: Vec::new(),
            complete: false,
        })
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn active(&self) -> impl Iterator<Item = &RoundEvent> {
        self.active.iter().map(|r| &r.event)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn round(&self, id: RoundId) -> Option<&RoundEvent> {
        self.active.iter().map(|r| &r.event).find(|e| e.id == id)
    }

    pub fn resolved_count(&self) -> u32 {
        self.resolved
    }

    pub fn false_starts(&self) -> u32 {
        self.false_starts
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn wants_more(&self) -> bool {
        if self.complete || self.active.len() >= self.config.max_active {
            return false;
        }
        match self.config.target_rounds {
            Some(target) => self.resolved + (self.active.len() as u32) < target,
            None => true,
        }
    }

    /// Schedule one round with a uniform delay in `[min_delay_ms,
    /// max_delay_ms]`. `Ok(None)` when at capacity or already complete.
    pub fn schedule_next(
        &mut self,
        min_delay_ms: i64,
        max_delay_ms: i64,
        now: u64,
        queue: &mut TimerQueue,
    ) -> Result<Option<RoundId>> {
        check_range(min_delay_ms, max_delay_ms)?;
        if !self.wants_more() {
            return Ok(None);
        }

        let delay = (self.rng.gen_range(min_delay_ms..=max_delay_ms) as u64).max(1);
        let position = self.positions.next_position(&self.config.bounds);
        self.next_id += 1;
        let id = RoundId(self.next_id);
        let timer = queue.once(delay, now);

        self.active.push(ActiveRound {
            event: RoundEvent {
                id,
                scheduled_delay_ms: delay,
                position,
                outcome: Outcome::Pending,
                actionable_at: None,
            },
            timer: Some(timer),
        });
        debug!(round = id.0, delay, "round scheduled");
        Ok(Some(id))
    }

    /// Schedule with the configured range until capacity is reached.
    pub fn fill(&mut self, now: u64, queue: &mut TimerQueue) -> Result<Vec<RoundId>> {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        let mut scheduled = Vec::new();
        while let Some(id) = self.schedule_next(min, max, now, queue)? {
            scheduled.push(id);
        }
        Ok(scheduled)
    }

    /// Route a timer fire to the round that owns it.
    pub fn on_timer(
        &mut self,
        fired: TimerId,
        now: u64,
        queue: &mut TimerQueue,
    ) -> Option<RoundTransition> {
        let idx = self
            .active
            .iter()
            .position(|r| r.timer.as_ref().map(TimerHandle::id) == Some(fired))?;

        // One-shots are gone from the queue once fired; drop our handle.
        self.active[idx].timer = None;

        if self.active[idx].event.actionable_at.is_none() {
            let lifetime = self.config.lifetime_ms;
            let round = &mut self.active[idx];
            round.event.actionable_at = Some(now);
            if let Some(ttl) = lifetime {
                round.timer = Some(queue.once(ttl, now));
            }
            debug!(round = round.event.id.0, "round actionable");
            return Some(RoundTransition::Actionable {
                id: round.event.id,
                position: round.event.position,
            });
        }

        let mut round = self.active.remove(idx);
        round.event.outcome = Outcome::Expired;
        self.expired += 1;
        debug!(round = round.event.id.0, "round expired");
        Some(RoundTransition::Expired(round.event.id))
    }

    /// Settle a pending round as `Hit` or `Missed`. Unknown or already
    /// settled ids are ignored, as are other outcomes.
    pub fn resolve(
        &mut self,
        id: RoundId,
        outcome: Outcome,
        now: u64,
        queue: &mut TimerQueue,
    ) -> Option<Resolved> {
        if !matches!(outcome, Outcome::Hit | Outcome::Missed) || self.complete {
            return None;
        }
        let idx = self.active.iter().position(|r| r.event.id == id)?;
        let mut round = self.active.remove(idx);
        if let Some(timer) = round.timer.take() {
            queue.cancel(timer);
        }
        round.event.outcome = outcome;

        let reaction_ms = round
            .event
            .actionable_at
            .map(|shown| now.saturating_sub(shown));
        self.resolved += 1;
        match outcome {
            Outcome::Hit => {
                self.hits += 1;
                if let Some(ms) = reaction_ms {
                    self.reaction_times_ms.push(ms);
                }
            }
            _ => self.misses += 1,
        }
        debug!(round = id.0, %outcome, ?reaction_ms, "round resolved");

        let summary = match self.config.target_rounds {
            Some(target) if self.resolved >= target => {
                self.finish(queue);
                Some(self.summary())
            }
            _ => None,
        };
        Some(Resolved {
            id,
            outcome,
            reaction_ms,
            summary,
        })
    }

    /// Player acted before any round was live. With false starts enabled,
    /// the waiting round is discarded and a replacement scheduled at once.
    pub fn premature_action(&mut self, now: u64, queue: &mut TimerQueue) -> Result<Option<RoundId>> {
        if !self.config.false_starts || self.complete {
            return Ok(None);
        }
        let Some(idx) = self
            .active
            .iter()
            .position(|r| r.event.actionable_at.is_none())
        else {
            return Ok(None);
        };
        let mut discarded = self.active.remove(idx);
        if let Some(timer) = discarded.timer.take() {
            queue.cancel(timer);
        }
        self.false_starts += 1;
        info!(
            round = discarded.event.id.0,
            false_starts = self.false_starts,
            "false start"
        );
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        self.schedule_next(min, max, now, queue)
    }

    /// Throw a round away unsettled and schedule a replacement. Used when a
    /// live target is missed in games where only hits count as rounds.
    pub fn retry(&mut self, id: RoundId, now: u64, queue: &mut TimerQueue) -> Result<Option<RoundId>> {
        if self.complete {
            return Ok(None);
        }
        let Some(idx) = self.active.iter().position(|r| r.event.id == id) else {
            return Ok(None);
        };
        let mut discarded = self.active.remove(idx);
        if let Some(timer) = discarded.timer.take() {
            queue.cancel(timer);
        }
        debug!(round = id.0, "round retried");
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        self.schedule_next(min, max, now, queue)
    }

    /// First live round whose target covers `at`.
    pub fn hit_test(&self, at: Position, radius: f64) -> Option<RoundId> {
        self.active
            .iter()
            .map(|r| &r.event)
            .find(|e| e.is_actionable() && e.position.distance(&at) <= radius)
            .map(|e| e.id)
    }

    fn finish(&mut self, queue: &mut TimerQueue) {
        self.complete = true;
        self.cancel_all(queue);
        info!(
            hits = self.hits,
            misses = self.misses,
            false_starts = self.false_starts,
            "round sequence complete"
        );
    }

    /// Drop every outstanding round and its timer.
    pub fn cancel_all(&mut self, queue: &mut TimerQueue) {
        for mut round in self.active.drain(..) {
            if let Some(timer) = round.timer.take() {
                queue.cancel(timer);
            }
        }
    }

    /// Clear all progress for a new sequence.
    pub fn reset(&mut self, queue: &mut TimerQueue) {
        self.cancel_all(queue);
        self.resolved = 0;
        self.hits = 0;
        self.misses = 0;
        self.expired = 0;
        self.false_starts = 0;
        self.reaction_times_ms.clear();
        self.complete = false;
    }

    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            hits: self.hits,
            misses: self.misses,
            expired: self.expired,
            false_starts: self.false_starts,
            reaction_times_ms: self.reaction_times_ms.clone(),
            average_reaction_ms: average_reaction_ms(&self.reaction_times_ms).ok(),
            consistency_ms: reaction_consistency_ms(&self.reaction_times_ms).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::FixedPositions;
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sequencer(config: SequencerConfig) -> RoundSequencer<StdRng> {
        RoundSequencer::new(
            config,
            StdRng::seed_from_u64(42),
            Box::new(FixedPositions::new(vec![Position::new(100, 200)])),
        )
        .unwrap()
    }

    fn fixed_delay(ms: i64, rounds: u32) -> SequencerConfig {
        SequencerConfig {
            target_rounds: Some(rounds),
            min_delay_ms: ms,
            max_delay_ms: ms,
            ..SequencerConfig::default()
        }
    }

    /// Fire everything due at `now` into the sequencer.
    fn fire(seq: &mut RoundSequencer<StdRng>, q: &mut TimerQueue, now: u64) -> Vec<RoundTransition> {
        q.poll(now)
            .into_iter()
            .filter_map(|id| seq.on_timer(id, now, q))
            .collect()
    }

    #[test]
    fn rejects_bad_ranges() {
        let mut seq = sequencer(SequencerConfig::default());
        let mut q = TimerQueue::new();
        assert_matches!(
            seq.schedule_next(500, 100, 0, &mut q),
            Err(Error::InvalidRange { min_ms: 500, max_ms: 100 })
        );
        assert_matches!(
            seq.schedule_next(-1, 100, 0, &mut q),
            Err(Error::InvalidRange { .. })
        );
        assert!(q.is_empty());
        assert_matches!(
            RoundSequencer::new(fixed_delay(-5, 1), StdRng::seed_from_u64(1), Box::new(FixedPositions::new(vec![]))),
            Err(Error::InvalidRange { .. })
        );
    }

    #[test]
    fn delays_stay_within_range() {
        let mut seq = sequencer(SequencerConfig {
            target_rounds: None,
            max_active: 100,
            ..SequencerConfig::default()
        });
        let mut q = TimerQueue::new();
        for _ in 0..50 {
            seq.schedule_next(1_000, 4_000, 0, &mut q).unwrap();
        }
        assert!(seq
            .active()
            .all(|e| (1_000..=4_000).contains(&e.scheduled_delay_ms)));
    }

    #[test]
    fn round_becomes_actionable_then_hit_records_reaction() {
        let mut seq = sequencer(fixed_delay(1_500, 3));
        let mut q = TimerQueue::new();
        let id = seq.schedule_next(1_500, 1_500, 0, &mut q).unwrap().unwrap();

        assert!(fire(&mut seq, &mut q, 1_000).is_empty());
        assert_eq!(
            fire(&mut seq, &mut q, 1_500),
            vec![RoundTransition::Actionable {
                id,
                position: Position::new(100, 200)
            }]
        );
        let resolved = seq.resolve(id, Outcome::Hit, 1_820, &mut q).unwrap();
        assert_eq!(resolved.reaction_ms, Some(320));
        assert!(resolved.summary.is_none());
        assert_eq!(seq.summary().average_reaction_ms, Some(320));
    }

    #[test]
    fn capacity_limits_active_rounds() {
        let mut seq = sequencer(SequencerConfig {
            target_rounds: None,
            max_active: 3,
            ..fixed_delay(10, 0)
        });
        let mut q = TimerQueue::new();
        assert_eq!(seq.fill(0, &mut q).unwrap().len(), 3);
        assert_eq!(seq.schedule_next(10, 10, 0, &mut q).unwrap(), None);

        fire(&mut seq, &mut q, 10);
        let first = seq.active().next().unwrap().id;
        seq.resolve(first, Outcome::Missed, 20, &mut q);
        assert!(seq.schedule_next(10, 10, 20, &mut q).unwrap().is_some());
    }

    #[test]
    fn completes_after_target_resolutions() {
        let mut seq = sequencer(fixed_delay(100, 2));
        let mut q = TimerQueue::new();
        let mut now = 0;
        let mut last = None;
        for _ in 0..2 {
            let id = seq.fill(now, &mut q).unwrap()[0];
            now += 100;
            fire(&mut seq, &mut q, now);
            now += 250;
            last = seq.resolve(id, Outcome::Hit, now, &mut q);
        }
        let summary = last.unwrap().summary.unwrap();
        assert_eq!(summary.hits, 2);
        assert_eq!(summary.reaction_times_ms, vec![250, 250]);
        assert_eq!(summary.consistency_ms, Some(0.0));
        assert!(seq.is_complete());
        assert_eq!(seq.schedule_next(100, 100, now, &mut q).unwrap(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn duplicate_resolution_is_a_no_op() {
        let mut seq = sequencer(fixed_delay(100, 3));
        let mut q = TimerQueue::new();
        let id = seq.fill(0, &mut q).unwrap()[0];
        fire(&mut seq, &mut q, 100);
        assert!(seq.resolve(id, Outcome::Hit, 300, &mut q).is_some());
        let once = seq.summary();
        assert!(seq.resolve(id, Outcome::Hit, 900, &mut q).is_none());
        assert!(seq.resolve(id, Outcome::Missed, 900, &mut q).is_none());
        assert!(seq.resolve(RoundId::new(999), Outcome::Hit, 900, &mut q).is_none());
        assert_eq!(seq.summary(), once);
        assert_eq!(seq.resolved_count(), 1);
    }

    #[test]
    fn false_start_reschedules_and_counts() {
        let mut seq = sequencer(fixed_delay(2_000, 5));
        let mut q = TimerQueue::new();
        let waiting = seq.fill(0, &mut q).unwrap()[0];

        let replacement = seq.premature_action(500, &mut q).unwrap().unwrap();
        assert_ne!(replacement, waiting);
        assert_eq!(seq.false_starts(), 1);
        assert_eq!(seq.active_len(), 1);
        assert!(seq.round(waiting).is_none());

        // The discarded round's timer never fires.
        assert!(fire(&mut seq, &mut q, 2_000).is_empty());
        assert_eq!(fire(&mut seq, &mut q, 2_500).len(), 1);

        // Acting on a live round is not a false start.
        assert_eq!(seq.premature_action(2_600, &mut q).unwrap(), None);
        assert_eq!(seq.false_starts(), 1);
    }

    #[test]
    fn retry_replaces_without_counting() {
        let mut seq = sequencer(fixed_delay(100, 2));
        let mut q = TimerQueue::new();
        let first = seq.fill(0, &mut q).unwrap()[0];
        fire(&mut seq, &mut q, 100);
        let second = seq.retry(first, 150, &mut q).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(seq.resolved_count(), 0);
        assert_eq!(seq.false_starts(), 0);
        assert_eq!(q.len(), 1);
        assert_eq!(seq.retry(RoundId::new(77), 150, &mut q).unwrap(), None);
    }

    #[test]
    fn false_starts_disabled() {
        let mut seq = sequencer(SequencerConfig {
            false_starts: false,
            ..fixed_delay(2_000, 5)
        });
        let mut q = TimerQueue::new();
        seq.fill(0, &mut q).unwrap();
        assert_eq!(seq.premature_action(10, &mut q).unwrap(), None);
        assert_eq!(seq.false_starts(), 0);
    }

    #[test]
    fn live_targets_expire_without_counting() {
        let mut seq = sequencer(SequencerConfig {
            lifetime_ms: Some(800),
            ..fixed_delay(100, 1)
        });
        let mut q = TimerQueue::new();
        let id = seq.fill(0, &mut q).unwrap()[0];
        fire(&mut seq, &mut q, 100);
        assert_eq!(fire(&mut seq, &mut q, 900), vec![RoundTransition::Expired(id)]);
        assert_eq!(seq.summary().expired, 1);
        assert_eq!(seq.resolved_count(), 0);
        assert!(!seq.is_complete());
        assert!(seq.resolve(id, Outcome::Hit, 950, &mut q).is_none());
    }

    #[test]
    fn hit_test_only_matches_live_targets() {
        let mut seq = sequencer(fixed_delay(100, 3));
        let mut q = TimerQueue::new();
        let id = seq.fill(0, &mut q).unwrap()[0];
        assert_eq!(seq.hit_test(Position::new(100, 200), 25.0), None);
        fire(&mut seq, &mut q, 100);
        assert_eq!(seq.hit_test(Position::new(110, 210), 25.0), Some(id));
        assert_eq!(seq.hit_test(Position::new(300, 300), 25.0), None);
    }

    #[test]
    fn cancel_all_leaves_no_timers() {
        let mut seq = sequencer(SequencerConfig {
            max_active: 4,
            target_rounds: None,
            lifetime_ms: Some(1_000),
            ..fixed_delay(50, 0)
        });
        let mut q = TimerQueue::new();
        seq.fill(0, &mut q).unwrap();
        fire(&mut seq, &mut q, 50);
        seq.cancel_all(&mut q);
        assert!(q.is_empty());
        assert_eq!(seq.active_len(), 0);
    }
}
