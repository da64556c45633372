use std::collections::VecDeque;

use super::event::EngineEvent;
use super::metrics::{compute_stats, EngineStats};

const MAX_EVENTS: usize = 10_000;

#[derive(Debug, Default)]
pub struct EngineRecorder {
    buffer: VecDeque<EngineEvent>,
}

impl EngineRecorder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn record(&mut self, event: EngineEvent) {
        if self.buffer.len() >= MAX_EVENTS {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    pub fn stats(&self) -> EngineStats {
        compute_stats(&self.buffer)
    }
}
