//! Suspension strategies for the two blocking points of the queue protocol.
//!
//! The engine offers no interrupt for "slot free" or "idle"; software polls
//! a status register. How it polls is a [`WaitStrategy`]:
//!
//! - [`BusyPoll`] spins forever, as bare-metal firmware does. A dead engine
//!   hangs the caller.
//! - [`BoundedPoll`] spins with a deadline and/or poll budget and reports
//!   [`ItaError::EngineTimeout`].
//! - [`SleepPoll`] sleeps between polls; for hosted targets where the thread
//!   does not own the core.

use crate::error::{ItaError, Result};
use std::time::{Duration, Instant};

/// What a wait is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// `QUEUE_FREE_COUNT >= 1`
    FreeSlot,
    /// `BUSY == 0`
    Idle,
}

impl std::fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FreeSlot => write!(f, "free queue slot"),
            Self::Idle => write!(f, "engine idle"),
        }
    }
}

/// Polls a status check until it reports the condition met.
pub trait WaitStrategy {
    /// Call `ready` until it returns `Ok(true)`. Returns the number of polls.
    ///
    /// # Errors
    ///
    /// Propagates status read errors; bounded strategies return
    /// [`ItaError::EngineTimeout`] when they give up.
    fn wait_until<F>(&mut self, condition: WaitCondition, ready: F) -> Result<u64>
    where
        F: FnMut() -> Result<bool>;
}

/// Unbounded spin. Never times out.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusyPoll;

impl WaitStrategy for BusyPoll {
    fn wait_until<F>(&mut self, _condition: WaitCondition, mut ready: F) -> Result<u64>
    where
        F: FnMut() -> Result<bool>,
    {
        let mut polls = 0;
        loop {
            polls += 1;
            if ready()? {
                return Ok(polls);
            }
            std::hint::spin_loop();
        }
    }
}

/// Spin with a deadline and an optional poll budget.
#[derive(Debug, Clone, Copy)]
pub struct BoundedPoll {
    timeout: Option<Duration>,
    max_polls: Option<u64>,
}

impl BoundedPoll {
    /// Give up once `timeout` has elapsed.
    pub const fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            max_polls: None,
        }
    }

    /// Give up after `max_polls` status reads. Deterministic, independent of
    /// host speed.
    pub const fn polls(max_polls: u64) -> Self {
        Self {
            timeout: None,
            max_polls: Some(max_polls),
        }
    }

    /// Add a poll budget to a time-bounded strategy.
    #[must_use]
    pub const fn with_max_polls(mut self, max_polls: u64) -> Self {
        self.max_polls = Some(max_polls);
        self
    }
}

impl WaitStrategy for BoundedPoll {
    fn wait_until<F>(&mut self, condition: WaitCondition, ready: F) -> Result<u64>
    where
        F: FnMut() -> Result<bool>,
    {
        bounded(condition, ready, self.timeout, self.max_polls, std::hint::spin_loop)
    }
}

/// Sleep `interval` between polls, give up after `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct SleepPoll {
    interval: Duration,
    timeout: Duration,
}

impl SleepPoll {
    /// Poll every `interval` for at most `timeout`.
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl WaitStrategy for SleepPoll {
    fn wait_until<F>(&mut self, condition: WaitCondition, ready: F) -> Result<u64>
    where
        F: FnMut() -> Result<bool>,
    {
        let interval = self.interval;
        bounded(condition, ready, Some(self.timeout), None, || {
            std::thread::sleep(interval);
        })
    }
}

fn bounded<F, P>(
    condition: WaitCondition,
    mut ready: F,
    timeout: Option<Duration>,
    max_polls: Option<u64>,
    mut pause: P,
) -> Result<u64>
where
    F: FnMut() -> Result<bool>,
    P: FnMut(),
{
    let start = Instant::now();
    let mut polls = 0;
    loop {
        polls += 1;
        if ready()? {
            return Ok(polls);
        }

        let budget_spent = max_polls.is_some_and(|max| polls >= max);
        let deadline_passed = timeout.is_some_and(|t| start.elapsed() >= t);
        if budget_spent || deadline_passed {
            #[allow(clippy::cast_possible_truncation)]
            let waited_ms = start.elapsed().as_millis() as u64;
            tracing::warn!("Gave up waiting for {condition} after {polls} polls ({waited_ms}ms)");
            return Err(ItaError::EngineTimeout {
                condition,
                polls,
                waited_ms,
            });
        }
        pause();
    }
}
