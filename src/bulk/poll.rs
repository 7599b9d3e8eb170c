use tokio::sync::watch;
use tokio::time::{sleep_until, Duration, Instant};

/// When and how often to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Wait between two attempts
    pub interval: Duration,
    /// Upper bound on attempts
    pub max_attempts: u32,
    /// Optional overall budget measured from the first attempt
    pub deadline: Option<Duration>,
}

impl PollSchedule {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn ticker(&self) -> PollTicker {
        PollTicker {
            schedule: *self,
            attempt: 0,
            started: None,
            next_wake: None,
        }
    }
}

/// What the caller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Make attempt number `n` (zero based)
    Attempt(u32),
    /// Attempt budget or deadline used up
    Exhausted,
    /// Shutdown was signalled
    Cancelled,
}

/// Paces attempts according to a [`PollSchedule`]
///
/// The first tick is immediate. Every later tick sleeps `interval` first,
/// unless the budget is already spent, so no sleep follows the last attempt.
/// A caller that stops asking after a terminal observation never sleeps
/// after it either.
#[derive(Debug)]
pub struct PollTicker {
    schedule: PollSchedule,
    attempt: u32,
    started: Option<Instant>,
    next_wake: Option<Instant>,
}

impl PollTicker {
    pub async fn tick(&mut self, cancel: &mut watch::Receiver<bool>) -> Tick {
        if *cancel.borrow() {
            return Tick::Cancelled;
        }
        let Some(wake) = self.plan_next() else {
            return Tick::Exhausted;
        };

        if self.started.is_none() {
            self.started = Some(wake);
        } else if wait_until(wake, cancel).await {
            return Tick::Cancelled;
        }
        self.next_wake = None;

        let attempt = self.attempt;
        self.attempt += 1;
        Tick::Attempt(attempt)
    }

    /// Whether another attempt fits in the attempt budget and the deadline
    ///
    /// Fixes the start of that attempt at now plus `interval`, so the next
    /// [`tick`](Self::tick) agrees with the answer.
    pub fn has_next(&mut self) -> bool {
        self.plan_next().is_some()
    }

    /// Attempts handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    fn plan_next(&mut self) -> Option<Instant> {
        if self.attempt >= self.schedule.max_attempts {
            return None;
        }
        let Some(started) = self.started else {
            return Some(Instant::now());
        };

        let interval = self.schedule.interval;
        let wake = *self.next_wake.get_or_insert_with(|| Instant::now() + interval);
        match self.schedule.deadline {
            Some(budget) if wake > started + budget => None,
            _ => Some(wake),
        }
    }
}

/// Sleep until `wake`; returns true if cancelled first
async fn wait_until(wake: Instant, cancel: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *cancel.borrow_and_update() {
            return true;
        }
        tokio::select! {
            _ = sleep_until(wake) => return false,
            changed = cancel.changed() => {
                if changed.is_err() {
                    // Sender gone, nobody can cancel any more
                    sleep_until(wake).await;
                    return false;
                }
            }
        }
    }
}
