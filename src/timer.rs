use crate::error::{Error, Result};
use crate::scheduler::{TimerHandle, TimerId, TimerQueue};
use tracing::{debug, info};

pub const TICK_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not this timer's tick, or the timer is not running.
    Ignored,
    Ticked(u32),
    /// Reached zero on this call. Reported exactly once per run.
    Completed,
}

/// `MM:SS`, minutes zero-padded to two digits.
pub fn format_mm_ss(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn round_secs(ms: u64) -> u32 {
    ((ms + 500) / 1_000) as u32
}

/// Remaining time is recomputed from a fixed deadline, so a late or
/// skipped tick only delays the display.
pub struct Countdown {
    total_secs: u32,
    remaining_secs: u32,
    status: TimerStatus,
    deadline_ms: Option<u64>,
    paused_remaining_ms: Option<u64>,
    tick: Option<TimerHandle>,
    completion_fired: bool,
    on_complete: Option<Box<dyn FnMut()>>,
}

impl std::fmt::Debug for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Countdown")
            .field("total_secs", &self.total_secs)
            .field("remaining_secs", &self.remaining_secs)
            .field("status", &self.status)
            .field("deadline_ms", &self.deadline_ms)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

fn validate(seconds: i64) -> Result<u32> {
    if seconds <= 0 || seconds > u32::MAX as i64 {
        return Err(Error::InvalidDuration { seconds });
    }
    Ok(seconds as u32)
}

impl Countdown {
    pub fn new(total_secs: i64) -> Result<Self> {
        let total_secs = validate(total_secs)?;
        Ok(Self {
            total_secs,
            remaining_secs: total_secs,
            status: TimerStatus::Idle,
            deadline_ms: None,
            paused_remaining_ms: None,
            tick: None,
            completion_fired: false,
            on_complete: None,
        })
    }

    /// Invoked synchronously, once per run, when the countdown hits zero.
    pub fn set_on_complete(&mut self, callback: Box<dyn FnMut()>) {
        self.on_complete = Some(callback);
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn total_secs(&self) -> u32 {
        self.total_secs
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn formatted(&self) -> String {
        format_mm_ss(self.remaining_secs)
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn tick_id(&self) -> Option<TimerId> {
        self.tick.as_ref().map(TimerHandle::id)
    }

    fn remaining_ms(&self, now: u64) -> u64 {
        match self.status {
            TimerStatus::Running => self
                .deadline_ms
                .map_or(0, |deadline| deadline.saturating_sub(now)),
            TimerStatus::Paused => self.paused_remaining_ms.unwrap_or(0),
            TimerStatus::Completed => 0,
            TimerStatus::Idle => self.remaining_secs as u64 * 1_000,
        }
    }

    /// Seconds of play so far in this run, for rate calculations.
    pub fn elapsed_secs(&self, now: u64) -> f64 {
        let total_ms = self.total_secs as u64 * 1_000;
        total_ms.saturating_sub(self.remaining_ms(now)) as f64 / 1_000.0
    }

    fn cancel_tick(&mut self, queue: &mut TimerQueue) {
        if let Some(handle) = self.tick.take() {
            queue.cancel(handle);
        }
    }

    /// Begin a fresh run of `duration_secs`. A run already in progress is
    /// replaced, its tick source cancelled first.
    pub fn start(&mut self, duration_secs: i64, now: u64, queue: &mut TimerQueue) -> Result<()> {
        let duration = validate(duration_secs)?;
        self.cancel_tick(queue);

        self.total_secs = duration;
        self.remaining_secs = duration;
        self.deadline_ms = Some(now + duration as u64 * 1_000);
        self.paused_remaining_ms = None;
        self.completion_fired = false;
        self.status = TimerStatus::Running;
        self.tick = Some(queue.every(TICK_MS, now));
        info!(duration, "countdown started");
        Ok(())
    }

    /// Handle a timer fire. Fires belonging to other timers are ignored.
    pub fn on_timer(&mut self, id: TimerId, now: u64, queue: &mut TimerQueue) -> TickOutcome {
        if self.tick_id() != Some(id) {
            return TickOutcome::Ignored;
        }
        self.refresh(now, queue)
    }

    /// Recompute remaining time against the deadline without waiting for a
    /// tick, completing the run if it has run out.
    pub fn refresh(&mut self, now: u64, queue: &mut TimerQueue) -> TickOutcome {
        if self.status != TimerStatus::Running {
            return TickOutcome::Ignored;
        }
        let secs = round_secs(self.remaining_ms(now));
        self.remaining_secs = self.remaining_secs.min(secs);
        if self.remaining_secs == 0 {
            self.complete(queue)
        } else {
            TickOutcome::Ticked(self.remaining_secs)
        }
    }

    fn complete(&mut self, queue: &mut TimerQueue) -> TickOutcome {
        self.cancel_tick(queue);
        self.remaining_secs = 0;
        self.deadline_ms = None;
        self.status = TimerStatus::Completed;
        if self.completion_fired {
            return TickOutcome::Ignored;
        }
        self.completion_fired = true;
        info!(total = self.total_secs, "countdown completed");
        if let Some(callback) = self.on_complete.as_mut() {
            callback();
        }
        TickOutcome::Completed
    }

    pub fn pause(&mut self, now: u64, queue: &mut TimerQueue) {
        if self.status != TimerStatus::Running {
            return;
        }
        self.paused_remaining_ms = Some(self.remaining_ms(now));
        self.deadline_ms = None;
        self.cancel_tick(queue);
        self.status = TimerStatus::Paused;
        debug!(remaining = self.remaining_secs, "countdown paused");
    }

    pub fn resume(&mut self, now: u64, queue: &mut TimerQueue) {
        if self.status != TimerStatus::Paused {
            return;
        }
        let left = self.paused_remaining_ms.take().unwrap_or(0);
        self.deadline_ms = Some(now + left);
        self.status = TimerStatus::Running;
        self.tick = Some(queue.every(TICK_MS, now));
        debug!(remaining = self.remaining_secs, "countdown resumed");
    }

    /// Release the tick source. Remaining time is kept; a running or paused
    /// countdown goes back to `Idle`. Safe to call repeatedly.
    pub fn stop(&mut self, queue: &mut TimerQueue) {
        self.cancel_tick(queue);
        self.deadline_ms = None;
        self.paused_remaining_ms = None;
        if matches!(self.status, TimerStatus::Running | TimerStatus::Paused) {
            self.status = TimerStatus::Idle;
            debug!(remaining = self.remaining_secs, "countdown stopped");
        }
    }

    /// Back to `Idle` with the full configured duration.
    pub fn reset(&mut self, queue: &mut TimerQueue) {
        self.cancel_tick(queue);
        self.deadline_ms = None;
        self.paused_remaining_ms = None;
        self.remaining_secs = self.total_secs;
        self.completion_fired = false;
        self.status = TimerStatus::Idle;
    }
}
