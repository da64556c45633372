use std::collections::{BTreeMap, VecDeque};

use super::event::{Parameter, TelemetrySample};
use crate::pattern::model::Comparator;

pub type Snapshot = BTreeMap<Parameter, f64>;

/// Current sensor values plus a bounded history for windowed comparators.
///
/// History entries are stamped with engine time (tick `at_ms`), not the adapter's wall-clock
/// timestamps, so replays behave identically.
#[derive(Debug, Clone)]
pub struct SensorHistory {
    retention_ms: u64,
    current: Option<Snapshot>,
    history: VecDeque<(u64, Snapshot)>,
}

impl SensorHistory {
    pub fn new(retention_ms: u64) -> Self {
        Self {
            retention_ms,
            current: None,
            history: VecDeque::new(),
        }
    }

    /// Replaces the current snapshot with a fresh frame's samples.
    pub fn record(&mut self, now_ms: u64, samples: &[TelemetrySample]) {
        let snap: Snapshot = samples.iter().map(|s| (s.parameter, s.value)).collect();
        self.history.push_back((now_ms, snap.clone()));
        self.current = Some(snap);

        while let Some((at, _)) = self.history.front() {
            if now_ms.saturating_sub(*at) > self.retention_ms {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn retention_ms(&self) -> u64 {
        self.retention_ms
    }

    /// Source went away: nothing is known until the next frame.
    pub fn mark_unavailable(&mut self) {
        self.current = None;
    }

    pub fn is_available(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self, parameter: Parameter) -> Option<f64> {
        self.current.as_ref()?.get(&parameter).copied()
    }

    /// Latest value recorded at or before `at_ms`.
    pub fn value_at(&self, parameter: Parameter, at_ms: u64) -> Option<f64> {
        self.history
            .iter()
            .rev()
            .find(|(t, snap)| *t <= at_ms && snap.contains_key(&parameter))
            .and_then(|(_, snap)| snap.get(&parameter).copied())
    }

    /// Mean over entries recorded in `[from_ms, now]`.
    pub fn mean_since(&self, parameter: Parameter, from_ms: u64) -> Option<f64> {
        let (sum, n) = self
            .history
            .iter()
            .filter(|(t, _)| *t >= from_ms)
            .filter_map(|(_, snap)| snap.get(&parameter))
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Evaluates a windowed comparator. Not enough history means "not true". Windows longer
    /// than the retention look back as far as the retention allows.
    pub fn windowed(&self, parameter: Parameter, comparator: Comparator, threshold: f64, window_ms: u64, now_ms: u64) -> bool {
        let window_ms = window_ms.min(self.retention_ms);
        let Some(current) = self.current(parameter) else {
            return false;
        };
        match comparator {
            Comparator::DroppedBy | Comparator::IncreasedBy => {
                // A window reaching before engine start has no baseline to compare against.
                let Some(from) = now_ms.checked_sub(window_ms) else {
                    return false;
                };
                let Some(past) = self.value_at(parameter, from) else {
                    return false;
                };
                if comparator == Comparator::DroppedBy {
                    past - current >= threshold
                } else {
                    current - past >= threshold
                }
            }
            Comparator::AvgAbove | Comparator::AvgBelow => {
                let from = now_ms.saturating_sub(window_ms);
                match self.mean_since(parameter, from) {
                    Some(avg) if comparator == Comparator::AvgAbove => avg > threshold,
                    Some(avg) => avg < threshold,
                    None => false,
                }
            }
            _ => comparator.holds(current, threshold),
        }
    }
}
