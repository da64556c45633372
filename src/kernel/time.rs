use serde::{Deserialize, Serialize};

/// Logical engine time. Tick `n` happens at `n * interval_ms`; evaluation never reads the
/// wall clock, so a replay of the same inputs lands on the same instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick {
    pub frame: u64,
    pub at_ms: u64,
}

pub const DEFAULT_TICK_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct TickClock {
    interval_ms: u64,
    next_frame: u64,
}

impl TickClock {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            next_frame: 0,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Hands out the next tick. The first call yields frame 0 at t=0.
    pub fn advance(&mut self) -> Tick {
        let tick = Tick {
            frame: self.next_frame,
            at_ms: self.next_frame * self.interval_ms,
        };
        self.next_frame += 1;
        tick
    }
}
