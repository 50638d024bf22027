use std::{
    thread,
    time::{Duration, Instant},
};

use crate::core::Ticks;

/// Supplies monotonically increasing tick values.
pub trait TickSource {
    fn now(&self) -> Ticks;

    /// Blocks until the next tick and returns it.
    fn wait_next(&mut self) -> Ticks;
}

/// Advances as soon as it is asked to.
#[derive(Debug, Default, Clone)]
pub struct SimClock {
    now: Ticks,
}

impl SimClock {
    pub fn starting_at(now: Ticks) -> Self {
        Self { now }
    }
}

impl TickSource for SimClock {
    fn now(&self) -> Ticks {
        self.now
    }

    fn wait_next(&mut self) -> Ticks {
        self.now = self.now.saturating_add(1);
        self.now
    }
}

/// Ticks at a fixed wall-clock period measured from construction.
#[derive(Debug, Clone)]
pub struct RealtimeClock {
    period: Duration,
    // When the current tick ends; advanced by one period per tick
    deadline: Instant,
    now: Ticks,
}

impl RealtimeClock {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(0, period)
    }

    pub fn starting_at(now: Ticks, period: Duration) -> Self {
        Self {
            period,
            deadline: Instant::now(),
            now,
        }
    }
}

impl TickSource for RealtimeClock {
    fn now(&self) -> Ticks {
        self.now
    }

    fn wait_next(&mut self) -> Ticks {
        self.now = self.now.saturating_add(1);
        if let Some(deadline) = self.deadline.checked_add(self.period) {
            self.deadline = deadline;
        }
        if let Some(delay) = self.deadline.checked_duration_since(Instant::now()) {
            thread::sleep(delay);
        }
        self.now
    }
}
