use std::collections::BTreeSet;

use super::event::DiscreteEvent;
use crate::config::EngineConfig;

/// Cursor over the event feed for the current game session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionBaseline {
    pub max_event_id: u64,
    pub max_session_time: u64,
    pub initialized: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub reset_threshold: u64,
    pub bulk_threshold: usize,
    pub dedup_window: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_threshold: 60,
            bulk_threshold: 5,
            dedup_window: 10,
        }
    }
}

impl From<&EngineConfig> for SessionConfig {
    fn from(c: &EngineConfig) -> Self {
        Self {
            reset_threshold: c.session_reset_threshold_seconds,
            bulk_threshold: c.bulk_backlog_threshold,
            dedup_window: c.dedup_window_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Nothing seen yet and the batch was empty; the baseline stays open.
    Waiting,
    /// First contact with the feed: the whole batch is history.
    Baseline { skipped: usize },
    /// The feed jumped back in time; per-session state must be cleared.
    NewSession {
        previous_max_time: u64,
        new_max_time: u64,
        skipped: usize,
    },
    /// A replayed burst arrived before anything was admitted this session.
    BulkSuppressed { count: usize },
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Sorted by event id.
    pub admitted: Vec<DiscreteEvent>,
    pub outcome: AdmissionOutcome,
}

impl Admission {
    fn none(outcome: AdmissionOutcome) -> Self {
        Self {
            admitted: Vec::new(),
            outcome,
        }
    }
}

/// Splits each event batch into backlog and live events. Only live events reach the
/// evaluator.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    config: SessionConfig,
    baseline: SessionBaseline,
    /// (session_time, text) of recently seen lines.
    recent: BTreeSet<(u64, String)>,
    last_text: Option<(u64, String)>,
    admitted_this_session: usize,
    session: u64,
}

impl SessionTracker {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            baseline: SessionBaseline::default(),
            recent: BTreeSet::new(),
            last_text: None,
            admitted_this_session: 0,
            session: 0,
        }
    }

    pub fn baseline(&self) -> SessionBaseline {
        self.baseline
    }

    /// Number of session boundaries seen so far.
    pub fn session_index(&self) -> u64 {
        self.session
    }

    pub fn observe(&mut self, batch: &[DiscreteEvent]) -> Admission {
        let batch_max_id = batch.iter().map(|e| e.id).max().unwrap_or(0);
        let batch_max_time = batch.iter().map(|e| e.session_time).max().unwrap_or(0);

        // === 1. FIRST CONTACT ===
        // An empty feed (menus, loading screens) says nothing about where history ends.
        if !self.baseline.initialized && batch.is_empty() {
            return Admission::none(AdmissionOutcome::Waiting);
        }
        if !self.baseline.initialized {
            self.baseline = SessionBaseline {
                max_event_id: batch_max_id,
                max_session_time: batch_max_time,
                initialized: true,
            };
            self.remember(batch);
            return Admission::none(AdmissionOutcome::Baseline { skipped: batch.len() });
        }

        // === 2. DISCONTINUITY ===
        let tracked = self.baseline.max_session_time;
        let jumped_back = batch
            .iter()
            .any(|e| tracked.saturating_sub(e.session_time) > self.config.reset_threshold);
        if jumped_back {
            self.start_session(batch_max_id, batch_max_time);
            self.remember(batch);
            return Admission::none(AdmissionOutcome::NewSession {
                previous_max_time: tracked,
                new_max_time: batch_max_time,
                skipped: batch.len(),
            });
        }

        // === 3. LIVE ===
        let last_id = self.baseline.max_event_id;
        let last_time = self.baseline.max_session_time;
        let mut fresh: Vec<&DiscreteEvent> = batch
            .iter()
            .filter(|e| e.id > last_id && e.session_time >= last_time)
            .collect();
        fresh.sort_by_key(|e| e.id);

        self.baseline.max_event_id = last_id.max(batch_max_id);
        self.baseline.max_session_time = last_time.max(batch_max_time);
        self.prune(self.baseline.max_session_time);

        let mut admitted = Vec::with_capacity(fresh.len());
        for event in fresh {
            if self.is_duplicate(event) {
                continue;
            }
            self.remember(std::slice::from_ref(event));
            admitted.push(event.clone());
        }

        // === 4. BULK HEURISTIC ===
        if self.admitted_this_session == 0 && admitted.len() > self.config.bulk_threshold {
            return Admission::none(AdmissionOutcome::BulkSuppressed { count: admitted.len() });
        }

        self.admitted_this_session += admitted.len();
        Admission {
            admitted,
            outcome: AdmissionOutcome::Live,
        }
    }

    fn start_session(&mut self, max_id: u64, max_time: u64) {
        self.baseline = SessionBaseline {
            max_event_id: max_id,
            max_session_time: max_time,
            initialized: true,
        };
        self.recent.clear();
        self.last_text = None;
        self.admitted_this_session = 0;
        self.session += 1;
    }

    fn is_duplicate(&self, event: &DiscreteEvent) -> bool {
        let Some(text) = event.text.as_deref() else {
            return false;
        };
        if self.recent.contains(&(event.session_time, text.to_string())) {
            return true;
        }
        // Same line repeated straight after itself within the window.
        match &self.last_text {
            Some((at, last)) => last == text && event.session_time.saturating_sub(*at) < self.config.dedup_window,
            None => false,
        }
    }

    fn remember(&mut self, events: &[DiscreteEvent]) {
        for event in events {
            if let Some(text) = &event.text {
                self.recent.insert((event.session_time, text.clone()));
                self.last_text = Some((event.session_time, text.clone()));
            }
        }
    }

    fn prune(&mut self, now: u64) {
        let window = self.config.dedup_window;
        self.recent.retain(|(t, _)| now.saturating_sub(*t) < window);
    }
}
