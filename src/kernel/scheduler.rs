use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use super::time::Tick;
use crate::pattern::compile::{OutputNode, PlaySpec, Route};
use crate::pattern::model::{OutputClass, PlayMode};

/// Identifies one output node of one installed pattern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputKey {
    pub pattern_id: String,
    pub node_id: String,
}

impl OutputKey {
    pub fn new(pattern_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            node_id: node_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    pub started_at: u64,
    pub class: OutputClass,
    pub route: Route,
    pub play: PlaySpec,
    /// Last frame in which a continuous run's condition held.
    armed_frame: u64,
    cycle: u64,
    factor: f64,
}

impl Run {
    /// Total play time before the run completes on its own. Continuous runs have none.
    fn length_ms(&self) -> Option<u64> {
        match self.play.mode {
            PlayMode::Once => Some(self.play.duration_ms),
            PlayMode::Repeat => Some(self.play.duration_ms.saturating_mul(self.play.repeat_count as u64)),
            PlayMode::Continuous => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Started,
    Replaced,
    Ignored,
}

impl FireOutcome {
    pub fn fired(self) -> bool {
        !matches!(self, FireOutcome::Ignored)
    }
}

/// Per-output instruction for the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Level {
        key: OutputKey,
        class: OutputClass,
        route: Route,
        intensity: f64,
        direction: Option<bool>,
    },
    Stop {
        key: OutputKey,
        class: OutputClass,
        route: Route,
    },
}

impl Emission {
    pub fn key(&self) -> &OutputKey {
        match self {
            Emission::Level { key, .. } | Emission::Stop { key, .. } => key,
        }
    }
}

/// Turns fire decisions into time-varying intensity. At most one run exists per output key.
pub struct Scheduler {
    runs: BTreeMap<OutputKey, Run>,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(seed: u64) -> Self {
        Self {
            runs: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn run(&self, key: &OutputKey) -> Option<&Run> {
        self.runs.get(key)
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    /// Keeps an existing continuous run alive for this tick. Returns false when there is
    /// nothing to re-arm, so the caller treats the output as a fresh fire.
    pub fn rearm(&mut self, key: &OutputKey, tick: Tick) -> bool {
        match self.runs.get_mut(key) {
            Some(run) if run.play.mode == PlayMode::Continuous => {
                run.armed_frame = tick.frame;
                true
            }
            _ => false,
        }
    }

    pub fn trigger(&mut self, key: OutputKey, output: &OutputNode, tick: Tick) -> FireOutcome {
        let outcome = match self.runs.get(&key) {
            Some(existing) if existing.play.mode == PlayMode::Repeat => return FireOutcome::Ignored,
            Some(_) => FireOutcome::Replaced,
            None => FireOutcome::Started,
        };
        let factor = self.draw(&output.play);
        self.runs.insert(
            key,
            Run {
                started_at: tick.at_ms,
                class: output.class,
                route: output.route.clone(),
                play: output.play.clone(),
                armed_frame: tick.frame,
                cycle: 0,
                factor,
            },
        );
        outcome
    }

    /// Cancels runs of a pattern whose mode matches `which`, one stop per canceled run.
    pub fn cancel_pattern(&mut self, pattern_id: &str, which: impl Fn(PlayMode) -> bool) -> Vec<Emission> {
        let doomed: Vec<OutputKey> = self
            .runs
            .iter()
            .filter(|(k, r)| k.pattern_id == pattern_id && which(r.play.mode))
            .map(|(k, _)| k.clone())
            .collect();

        doomed
            .into_iter()
            .filter_map(|key| self.runs.remove(&key).map(|run| stop(key, &run)))
            .collect()
    }

    /// Cancels everything, e.g. on shutdown.
    pub fn cancel_all(&mut self) -> Vec<Emission> {
        std::mem::take(&mut self.runs)
            .into_iter()
            .map(|(key, run)| stop(key, &run))
            .collect()
    }

    /// Samples every active run at `tick`. Runs that completed (or lost their condition,
    /// for continuous) emit a single stop and are dropped.
    pub fn advance(&mut self, tick: Tick) -> Vec<Emission> {
        let mut emissions = Vec::with_capacity(self.runs.len());
        let mut finished = Vec::new();

        for (key, run) in self.runs.iter_mut() {
            let elapsed = tick.at_ms.saturating_sub(run.started_at);
            let duration = run.play.duration_ms.max(1);

            let done = match run.length_ms() {
                Some(length) => elapsed >= length,
                None => tick.frame > run.armed_frame.saturating_add(1),
            };
            if done {
                finished.push(key.clone());
                continue;
            }

            let cycle = elapsed / duration;
            if cycle != run.cycle {
                run.cycle = cycle;
                run.factor = draw(&mut self.rng, &run.play);
            }
            let t = (elapsed % duration) as f64 / duration as f64;
            let intensity = (run.play.curve.sample(t) * run.factor).clamp(0.0, 1.0);

            emissions.push(Emission::Level {
                key: key.clone(),
                class: run.class,
                route: run.route.clone(),
                intensity,
                direction: run.play.direction,
            });
        }

        for key in finished {
            if let Some(run) = self.runs.remove(&key) {
                emissions.push(stop(key, &run));
            }
        }
        emissions
    }

    fn draw(&mut self, play: &PlaySpec) -> f64 {
        draw(&mut self.rng, play)
    }
}

/// Jitter factor for one cycle. Without a range no randomness is consumed.
fn draw(rng: &mut StdRng, play: &PlaySpec) -> f64 {
    match play.jitter {
        Some(range) if range.max > range.min => rng.gen_range(range.min..=range.max),
        Some(range) => range.min,
        None => 1.0,
    }
}

fn stop(key: OutputKey, run: &Run) -> Emission {
    Emission::Stop {
        key,
        class: run.class,
        route: run.route.clone(),
    }
}
