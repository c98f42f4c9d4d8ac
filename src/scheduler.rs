use tracing::trace;

/// Copyable identifier carried by a timer fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Ownership of a live timer. Not `Clone`: whoever holds it is the only one
/// able to cancel it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a TimerHandle leaves the timer armed"]
pub struct TimerHandle {
    id: TimerId,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    Every(u64),
    Once,
}

#[derive(Debug)]
struct Armed {
    id: TimerId,
    deadline: u64,
    repeat: Repeat,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    armed: Vec<Armed>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn arm(&mut self, deadline: u64, repeat: Repeat) -> TimerHandle {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.armed.push(Armed {
            id,
            deadline,
            repeat,
        });
        trace!(timer = id.0, deadline, "timer armed");
        TimerHandle { id }
    }

    /// Fire every `period_ms` starting one period after `now`.
    pub fn every(&mut self, period_ms: u64, now: u64) -> TimerHandle {
        let period = period_ms.max(1);
        self.arm(now.saturating_add(period), Repeat::Every(period))
    }

    /// Fire once, `delay_ms` after `now`.
    pub fn once(&mut self, delay_ms: u64, now: u64) -> TimerHandle {
        self.arm(now.saturating_add(delay_ms), Repeat::Once)
    }

    /// Disarm a timer. Returns false if it had already fired (one-shot).
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.armed.len();
        self.armed.retain(|t| t.id != handle.id);
        let removed = self.armed.len() != before;
        if removed {
            trace!(timer = handle.id.0, "timer cancelled");
        }
        removed
    }

    pub fn is_live(&self, id: TimerId) -> bool {
        self.armed.iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.armed.iter().map(|t| t.deadline).min()
    }

    /// Collect the timers due at `now`, earliest deadline first.
    ///
    /// An interval that fell behind by several periods fires once and is
    /// re-armed one period after `now`.
    pub fn poll(&mut self, now: u64) -> Vec<TimerId> {
        let mut due: Vec<(u64, TimerId)> = self
            .armed
            .iter()
            .filter(|t| t.deadline <= now)
            .map(|t| (t.deadline, t.id))
            .collect();
        due.sort();

        self.armed.retain_mut(|t| {
            if t.deadline > now {
                return true;
            }
            match t.repeat {
                Repeat::Every(period) => {
                    t.deadline = now.saturating_add(period);
                    true
                }
                Repeat::Once => false,
            }
        });

        due.into_iter().map(|(_, id)| id).collect()
    }
}
