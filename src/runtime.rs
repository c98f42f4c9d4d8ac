use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::clock::{Clock, ManualClock};
use crate::error::Result;
use crate::games::{FinalResult, GameSession, SessionUpdate};
use crate::position::Position;
use crate::scheduler::{TimerId, TimerQueue};

/// How long `step` waits for input when no timer is due sooner.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// Unified event type consumed by game sessions
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GameEvent {
    /// Pointer press inside the play area.
    Press { at: Position },
    Keystroke(char),
    Backspace,
    Timer(TimerId),
    /// Nothing happened before the wait ran out.
    Idle,
}

/// Source of player input
pub trait EventSource {
    /// Block for up to `timeout` waiting for an event.
    /// A zero timeout only checks for input that is already queued.
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<GameEvent, RecvTimeoutError>;
}

/// Production event source fed by whatever front end owns the window.
pub struct ChannelEventSource {
    rx: Receiver<GameEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<GameEvent>) -> Self {
        Self { rx }
    }

    /// A connected sender / source pair.
    pub fn channel() -> (Sender<GameEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl EventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<GameEvent, RecvTimeoutError> {
        if timeout.is_zero() {
            return self.rx.try_recv().map_err(|e| match e {
                mpsc::TryRecvError::Empty => RecvTimeoutError::Timeout,
                mpsc::TryRecvError::Disconnected => RecvTimeoutError::Disconnected,
            });
        }
        self.rx.recv_timeout(timeout)
    }
}

/// Scripted event source for tests. Waiting on an empty script advances
/// the attached manual clock by the full timeout instead of sleeping.
pub struct TestEventSource {
    events: RefCell<VecDeque<GameEvent>>,
    clock: ManualClock,
}

impl TestEventSource {
    pub fn new(events: impl IntoIterator<Item = GameEvent>, clock: ManualClock) -> Self {
        Self {
            events: RefCell::new(events.into_iter().collect()),
            clock,
        }
    }

    pub fn push(&self, event: GameEvent) {
        self.events.borrow_mut().push_back(event);
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<GameEvent, RecvTimeoutError> {
        if let Some(ev) = self.events.borrow_mut().pop_front() {
            return Ok(ev);
        }
        self.clock.advance(timeout.as_millis() as u64);
        Err(RecvTimeoutError::Timeout)
    }
}

/// Runner that advances a game one event or timer fire at a time.
pub struct Runner<E: EventSource, C: Clock> {
    event_source: E,
    clock: C,
    queue: TimerQueue,
    fired: VecDeque<TimerId>,
    idle_interval: Duration,
}

impl<E: EventSource, C: Clock> Runner<E, C> {
    pub fn new(event_source: E, clock: C) -> Self {
        Self {
            event_source,
            clock,
            queue: TimerQueue::new(),
            fired: VecDeque::new(),
            idle_interval: IDLE_INTERVAL,
        }
    }

    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn queue(&self) -> &TimerQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut TimerQueue {
        &mut self.queue
    }

    /// Next event to hand to the game. Input that is already waiting wins
    /// over timers due at the same moment, so a last-instant click lands
    /// before the countdown that would have ended the round.
    pub fn step(&mut self) -> GameEvent {
        if let Ok(ev) = self.event_source.recv_timeout(Duration::ZERO) {
            return ev;
        }
        if let Some(id) = self.fired.pop_front() {
            return GameEvent::Timer(id);
        }

        let now = self.clock.now_ms();
        self.fired.extend(self.queue.poll(now));
        if let Some(id) = self.fired.pop_front() {
            trace!(timer = ?id, now, "timer due");
            return GameEvent::Timer(id);
        }

        let wait = self
            .queue
            .next_deadline()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
            .map_or(self.idle_interval, |until| until.min(self.idle_interval));
        match self.event_source.recv_timeout(wait) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => GameEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => {
                // Nobody can send input any more; let time pass for timers.
                std::thread::sleep(wait);
                GameEvent::Idle
            }
        }
    }

    /// Hand one event to `session` at the current time.
    pub fn dispatch<S: GameSession + ?Sized>(
        &mut self,
        session: &mut S,
        event: &GameEvent,
    ) -> Result<SessionUpdate> {
        let now = self.clock.now_ms();
        session.handle(event, now, &mut self.queue)
    }

    /// Start `session` and drive it until it finishes. The session is torn
    /// down afterwards whether it finished or failed.
    pub fn run<S: GameSession + ?Sized>(&mut self, session: &mut S) -> Result<FinalResult> {
        let outcome = self.drive(session);
        session.teardown(&mut self.queue);
        self.fired.clear();
        match &outcome {
            Ok(result) => debug!(game = %result.game, metric = result.metric, "session finished"),
            Err(e) => warn!(game = %session.kind(), error = %e, "session aborted"),
        }
        outcome
    }

    fn drive<S: GameSession + ?Sized>(&mut self, session: &mut S) -> Result<FinalResult> {
        let now = self.clock.now_ms();
        session.start(now, &mut self.queue)?;
        debug!(game = %session.kind(), now, "session started");
        loop {
            let event = self.step();
            if let SessionUpdate::Finished(result) = self.dispatch(session, &event)? {
                return Ok(result);
            }
        }
    }
}
