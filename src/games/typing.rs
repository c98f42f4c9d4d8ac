use super::{FinalResult, GameKind, GameSession, SessionUpdate};
use crate::config::ArcadeConfig;
use crate::error::Result;
use crate::leaderboard::{MetaValue, Metadata};
use crate::medal::{Medal, MedalPolicy};
use crate::runtime::GameEvent;
use crate::scheduler::TimerQueue;
use crate::stats::{StatSnapshot, TypingStats};
use crate::timer::{Countdown, TickOutcome};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Moderate,
    Hard,
    Expert,
}

impl Difficulty {
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Beginner",
            Difficulty::Moderate => "Intermediate",
            Difficulty::Hard => "Advanced",
            Difficulty::Expert => "Expert",
        }
    }

    /// Built-in prompts for this level.
    pub fn paragraphs(&self) -> &'static [&'static str] {
        match self {
            Difficulty::Easy => &[
                "The sun is warm and the sky is blue. We walk to the park and sit by the lake. A small dog runs past us with a red ball.",
                "I like to read a good book at night. My cat sleeps on the bed next to me. It is quiet and the lamp gives a soft light.",
            ],
            Difficulty::Moderate => &[
                "Every morning the market fills with traders setting out fresh bread, ripe fruit and jars of honey while the first customers arrive.",
                "The old bridge was repaired last summer, so the village now gets deliveries twice a week instead of waiting for the river to drop.",
            ],
            Difficulty::Hard => &[
                "Meteorologists combine satellite imagery, barometric readings and numerical simulations to anticipate severe weather several days ahead.",
                "Although the committee acknowledged the proposal's ambition, it questioned whether the projected budget accounted for unavoidable contingencies.",
            ],
            Difficulty::Expert => &[
                "Asynchronous I/O multiplexing lets a single thread service thousands of sockets; the kernel signals readiness (via epoll or kqueue) and the runtime resumes the waiting task.",
                "Idempotent retries, exponential back-off with jitter, and bounded queues keep a distributed system's tail latency predictable when downstream dependencies degrade.",
            ],
        }
    }
}

#[derive(Debug)]
pub struct TypingSession {
    difficulty: Difficulty,
    timer_secs: u32,
    medal_policy: MedalPolicy,
    prompt: Vec<char>,
    input: Vec<char>,
    countdown: Countdown,
    stats: TypingStats,
    finished: bool,
}

impl TypingSession {
    pub fn new(prompt: impl Into<String>, config: &ArcadeConfig) -> Result<Self> {
        let settings = config.typing;
        Ok(Self {
            difficulty: settings.difficulty,
            timer_secs: settings.timer_secs,
            medal_policy: config.medal_policy,
            prompt: prompt.into().chars().collect(),
            input: Vec::new(),
            countdown: Countdown::new(settings.timer_secs as i64)?,
            stats: TypingStats::NOT_STARTED,
            finished: false,
        })
    }

    /// A session over a random built-in paragraph for `difficulty`.
    pub fn with_random_prompt<R: Rng + ?Sized>(
        difficulty: Difficulty,
        config: &ArcadeConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let paragraphs = difficulty.paragraphs();
        let prompt = paragraphs[rng.gen_range(0..paragraphs.len())];
        let mut session = Self::new(prompt, config)?;
        session.difficulty = difficulty;
        Ok(session)
    }

    pub fn prompt(&self) -> String {
        self.prompt.iter().collect()
    }

    pub fn input(&self) -> String {
        self.input.iter().collect()
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Figures as of the last keystroke or tick.
    pub fn stats(&self) -> TypingStats {
        self.stats
    }

    /// Whether the typed char at `idx` matches the prompt, for highlighting.
    pub fn is_correct_at(&self, idx: usize) -> Option<bool> {
        let typed = self.input.get(idx)?;
        Some(self.prompt.get(idx) == Some(typed))
    }

    /// Counters for the current input. Every typed char that differs from
    /// the prompt at the same position is an error.
    pub fn snapshot(&self, now: u64) -> StatSnapshot {
        let errors = self
            .input
            .iter()
            .zip(self.prompt.iter())
            .filter(|(typed, expected)| typed != expected)
            .count() as u32;
        let total = self.input.len() as u32;
        StatSnapshot::from_counts(total - errors, total, errors, self.countdown.elapsed_secs(now))
    }

    fn accepts_input(&self) -> bool {
        self.countdown.is_running() && !self.finished
    }

    fn on_keystroke(&mut self, c: char, now: u64, queue: &mut TimerQueue) -> SessionUpdate {
        if !self.accepts_input() || self.input.len() >= self.prompt.len() {
            return SessionUpdate::Nothing;
        }
        self.input.push(c);
        let snapshot = self.snapshot(now);
        self.stats = snapshot.compute();
        if self.input.len() >= self.prompt.len() {
            debug!("prompt completed");
            self.countdown.stop(queue);
            return SessionUpdate::Finished(self.finish(snapshot));
        }
        SessionUpdate::Changed
    }

    fn on_backspace(&mut self, now: u64) -> SessionUpdate {
        if !self.accepts_input() || self.input.pop().is_none() {
            return SessionUpdate::Nothing;
        }
        self.stats = self.snapshot(now).compute();
        SessionUpdate::Changed
    }

    fn finish(&mut self, snapshot: StatSnapshot) -> FinalResult {
        self.finished = true;
        let stats = snapshot.compute();
        self.stats = stats;
        let medal: Medal = self.medal_policy.award(stats.wpm, stats.accuracy);

        let mut metadata = Metadata::new();
        metadata.insert("accuracy".into(), MetaValue::from(stats.accuracy));
        metadata.insert("cpm".into(), MetaValue::from(stats.cpm));
        metadata.insert("netWpm".into(), MetaValue::from(stats.net_wpm));
        metadata.insert("errors".into(), MetaValue::from(snapshot.errors));
        metadata.insert("correctChars".into(), MetaValue::from(snapshot.correct_chars));
        metadata.insert("totalChars".into(), MetaValue::from(snapshot.total_chars));
        metadata.insert("medal".into(), MetaValue::from(medal.title()));
        metadata.insert("difficulty".into(), MetaValue::from(self.difficulty.to_string()));
        info!(wpm = stats.wpm, accuracy = stats.accuracy, %medal, "typing test finished");
        FinalResult {
            game: GameKind::Typing,
            metric: stats.wpm as f64,
            metadata,
        }
    }
}

impl GameSession for TypingSession {
    fn kind(&self) -> GameKind {
        GameKind::Typing
    }

    fn start(&mut self, now: u64, queue: &mut TimerQueue) -> Result<()> {
        self.countdown.start(self.timer_secs as i64, now, queue)?;
        self.input.clear();
        self.stats = TypingStats::NOT_STARTED;
        self.finished = false;
        Ok(())
    }

    fn handle(&mut self, event: &GameEvent, now: u64, queue: &mut TimerQueue) -> Result<SessionUpdate> {
        let update = match *event {
            GameEvent::Keystroke(c) => self.on_keystroke(c, now, queue),
            GameEvent::Backspace => self.on_backspace(now),
            GameEvent::Timer(id) => match self.countdown.on_timer(id, now, queue) {
                TickOutcome::Ignored => SessionUpdate::Nothing,
                TickOutcome::Ticked(_) => {
                    self.stats = self.snapshot(now).compute();
                    SessionUpdate::Changed
                }
                TickOutcome::Completed => {
                    let snapshot = self.snapshot(now);
                    SessionUpdate::Finished(self.finish(snapshot))
                }
            },
            _ => SessionUpdate::Nothing,
        };
        Ok(update)
    }

    fn teardown(&mut self, queue: &mut TimerQueue) {
        self.countdown.stop(queue);
    }
}
