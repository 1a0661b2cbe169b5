// ABOUTME: Cancellable timed polling shared by health checks and snapshot waits.
// ABOUTME: A ticker bounded by a deadline and a cancellation token.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Polling cadence and overall bound.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

/// What woke a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Time to look again.
    Poll,
    /// The deadline elapsed.
    Deadline,
    /// The operator asked to stop.
    Cancelled,
}

/// Final result of [`Poller::until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

impl Poller {
    /// A zero interval is bumped to one millisecond so the ticker stays valid.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start the clock. The first [`Ticks::next`] returns [`Tick::Poll`] at once.
    pub fn start(&self) -> Ticks {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ticks {
            interval,
            deadline: Instant::now() + self.timeout,
            first: true,
        }
    }

    /// Call `probe` on every tick until it yields a value, the deadline
    /// passes, or `cancel` fires. Probe errors end the loop immediately.
    pub async fn until<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut probe: F,
    ) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let mut ticks = self.start();
        loop {
            match ticks.next(cancel).await {
                Tick::Poll => {
                    if let Some(value) = probe().await? {
                        return Ok(PollOutcome::Ready(value));
                    }
                }
                Tick::Deadline => return Ok(PollOutcome::TimedOut),
                Tick::Cancelled => return Ok(PollOutcome::Cancelled),
            }
        }
    }
}

/// A running poll clock.
#[derive(Debug)]
pub struct Ticks {
    interval: Interval,
    deadline: Instant,
    first: bool,
}

impl Ticks {
    /// Wait for the next event. Cancellation wins over the deadline, which
    /// wins over a due tick.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Tick {
        if cancel.is_cancelled() {
            return Tick::Cancelled;
        }
        if self.first {
            self.first = false;
            self.interval.tick().await;
            return Tick::Poll;
        }
        if Instant::now() >= self.deadline {
            return Tick::Deadline;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Tick::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => Tick::Deadline,
            _ = self.interval.tick() => Tick::Poll,
        }
    }
}
