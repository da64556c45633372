use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::evaluator::{evaluate, DiagnosticsBoard, EvalStatus, PatternDiagnostics, TickContext};
use super::event::{DiscreteEvent, Event, SideEffect, TelemetryFrame};
use super::scheduler::{Emission, OutputKey, Scheduler};
use super::sensors::SensorHistory;
use super::session::{AdmissionOutcome, SessionConfig, SessionTracker};
use super::state::{DeltaOutcome, PatternDelta, PatternSet};
use super::telemetry::event::{EngineEvent, PatternChange};
use super::telemetry::recorder::EngineRecorder;
use super::time::{Tick, TickClock};
use crate::config::{EngineConfig, Identity};
use crate::outputs::devices::{DeviceCommand, DeviceRegistry};
use crate::outputs::router;
use crate::pattern::compile::{CompiledPattern, NodeKind};
use crate::pattern::model::PlayMode;

/// Where the driver loop delivers side effects.
pub struct ReactorOutlets {
    pub commands: mpsc::Sender<Vec<DeviceCommand>>,
    pub events: broadcast::Sender<EngineEvent>,
    pub diagnostics: watch::Sender<Arc<DiagnosticsBoard>>,
}

/// The single evaluator. Owns all engine state; everything else talks to it through the
/// inbox.
pub struct Reactor {
    pub receiver: mpsc::Receiver<Event>,
    pub patterns: PatternSet,
    pub session: SessionTracker,
    pub sensors: SensorHistory,
    pub scheduler: Scheduler,
    pub devices: DeviceRegistry,
    pub recorder: EngineRecorder,
    clock: TickClock,
    identity: Identity,
    diagnostics: DiagnosticsBoard,
    telemetry_up: bool,
}

impl Reactor {
    pub fn new(receiver: mpsc::Receiver<Event>, config: &EngineConfig) -> Self {
        Self {
            receiver,
            patterns: PatternSet::new(),
            session: SessionTracker::new(SessionConfig::from(config)),
            sensors: SensorHistory::new(config.sensor_history_ms),
            scheduler: Scheduler::new(config.random_seed),
            devices: DeviceRegistry::new(config.devices.static_devices.clone()),
            recorder: EngineRecorder::new(),
            clock: TickClock::new(config.tick_interval_ms),
            identity: config.identity.clone(),
            diagnostics: DiagnosticsBoard::new(),
            telemetry_up: true,
        }
    }

    pub fn diagnostics(&self) -> &DiagnosticsBoard {
        &self.diagnostics
    }

    /// Pure tick step: advances engine state by one tick and returns what the driver should
    /// do. MUST NOT await I/O or read the wall clock.
    ///
    /// The tick is advanced first; every decision below happens at the new tick's time.
    pub fn tick_step(&mut self, events: Vec<Event>) -> Vec<SideEffect> {
        let tick = self.clock.advance();
        let mut notes: Vec<EngineEvent> = Vec::new();
        let mut emissions: Vec<Emission> = Vec::new();

        let mut admin = Vec::new();
        let mut frames = Vec::new();
        let mut unavailable = false;
        let mut device_update = None;
        for event in events {
            match event {
                Event::Admin(delta) => admin.push(delta),
                Event::Telemetry(frame) => frames.push(frame),
                Event::TelemetryUnavailable(reason) => {
                    debug!("Telemetry unavailable: {}", reason);
                    unavailable = true;
                }
                // Latest list wins.
                Event::DevicesChanged(list) => device_update = Some(list),
            }
        }

        // === 1. ADMIN (between ticks) ===
        for delta in admin {
            self.apply_admin(delta, &mut emissions, &mut notes);
        }

        // === 2. DEVICES ===
        if let Some(list) = device_update {
            self.devices.replace(list);
            notes.push(EngineEvent::DevicesUpdated {
                total: self.devices.len(),
                connected: self.devices.connected().count(),
            });
        }

        // === 3. INGEST ===
        let admitted = self.ingest(tick, frames, unavailable, &mut notes);

        // === 4. EVALUATE + GATE ===
        self.evaluate_patterns(tick, &admitted, &mut notes);

        // === 5. SAMPLE ===
        emissions.extend(self.scheduler.advance(tick));

        // === 6. ROUTE ===
        let mut effects = Vec::with_capacity(notes.len() + 1);
        let commands = router::route(&emissions, &self.devices);
        if !commands.is_empty() {
            effects.push(SideEffect::Dispatch(commands));
        }
        for note in notes {
            self.recorder.record(note.clone());
            effects.push(SideEffect::Notify(note));
        }
        effects
    }

    fn apply_admin(&mut self, delta: PatternDelta, emissions: &mut Vec<Emission>, notes: &mut Vec<EngineEvent>) {
        let pattern_id = match &delta {
            PatternDelta::Install(c) => {
                self.warn_on_long_windows(c);
                c.id.clone()
            }
            PatternDelta::Remove(id) | PatternDelta::SetEnabled { id, .. } => id.clone(),
        };

        // Remove and replace end every run of the pattern. Disable only ends the open-ended
        // ones; a `once` run plays out.
        let stops = match &delta {
            PatternDelta::Install(_) | PatternDelta::Remove(_) => self.scheduler.cancel_pattern(&pattern_id, |_| true),
            PatternDelta::SetEnabled { enabled: false, .. } => self
                .scheduler
                .cancel_pattern(&pattern_id, |m| matches!(m, PlayMode::Continuous | PlayMode::Repeat)),
            PatternDelta::SetEnabled { .. } => Vec::new(),
        };
        for stop in &stops {
            notes.push(EngineEvent::RunCanceled {
                pattern_id: pattern_id.clone(),
                node_id: stop.key().node_id.clone(),
            });
        }
        emissions.extend(stops);

        let change = match self.patterns.reduce(delta) {
            DeltaOutcome::Installed => PatternChange::Installed,
            DeltaOutcome::Replaced => PatternChange::Replaced,
            DeltaOutcome::Removed => {
                self.diagnostics.remove(&pattern_id);
                PatternChange::Removed
            }
            DeltaOutcome::Toggled { enabled: true, .. } => PatternChange::Enabled,
            DeltaOutcome::Toggled { enabled: false, .. } => PatternChange::Disabled,
            DeltaOutcome::NotFound => PatternChange::NotFound,
        };
        notes.push(EngineEvent::PatternLifecycle { pattern_id, change });
    }

    fn warn_on_long_windows(&self, compiled: &CompiledPattern) {
        let retention = self.sensors.retention_ms();
        for node in &compiled.nodes {
            if let NodeKind::Sensor { comparator, window_ms, .. } = &node.kind {
                if comparator.is_windowed() && *window_ms > retention {
                    warn!(
                        "Pattern '{}' node '{}': window {}ms exceeds sensor history {}ms, clamped",
                        compiled.id, node.id, window_ms, retention
                    );
                }
            }
        }
    }

    fn ingest(
        &mut self,
        tick: Tick,
        frames: Vec<TelemetryFrame>,
        unavailable: bool,
        notes: &mut Vec<EngineEvent>,
    ) -> Vec<DiscreteEvent> {
        let Some(latest) = frames.last() else {
            // No frame and no failure report: hold the last snapshot.
            if unavailable {
                self.sensors.mark_unavailable();
                if self.telemetry_up {
                    self.telemetry_up = false;
                    notes.push(EngineEvent::TelemetryLost { at_ms: tick.at_ms });
                }
            }
            return Vec::new();
        };

        if !self.telemetry_up {
            self.telemetry_up = true;
            notes.push(EngineEvent::TelemetryRestored { at_ms: tick.at_ms });
        }
        self.sensors.record(tick.at_ms, &latest.samples);

        let mut admitted = Vec::new();
        for frame in &frames {
            let admission = self.session.observe(&frame.events);
            match admission.outcome {
                AdmissionOutcome::Baseline { skipped } => {
                    let b = self.session.baseline();
                    info!("Session baseline: max_id={} max_time={} ({} skipped)", b.max_event_id, b.max_session_time, skipped);
                    notes.push(EngineEvent::SessionBaselined {
                        max_event_id: b.max_event_id,
                        max_session_time: b.max_session_time,
                        skipped,
                    });
                }
                AdmissionOutcome::NewSession {
                    previous_max_time,
                    new_max_time,
                    skipped,
                } => {
                    info!("New session detected: time {} -> {}", previous_max_time, new_max_time);
                    self.patterns.clear_cooldowns();
                    notes.push(EngineEvent::SessionDiscontinuity {
                        previous_max_time,
                        new_max_time,
                        skipped,
                    });
                }
                AdmissionOutcome::BulkSuppressed { count } => {
                    warn!("Suppressed {} replayed event(s) at session start", count);
                    notes.push(EngineEvent::BacklogSuppressed { count });
                }
                AdmissionOutcome::Waiting | AdmissionOutcome::Live => {}
            }
            admitted.extend(admission.admitted);
        }

        admitted.sort_by_key(|e| e.id);
        if !admitted.is_empty() {
            notes.push(EngineEvent::EventsAdmitted { count: admitted.len() });
        }
        admitted
    }

    fn evaluate_patterns(&mut self, tick: Tick, admitted: &[DiscreteEvent], notes: &mut Vec<EngineEvent>) {
        let ctx = TickContext {
            now_ms: tick.at_ms,
            sensors: &self.sensors,
            events: admitted,
            identity: &self.identity,
        };

        for id in self.patterns.ids() {
            let Some(entry) = self.patterns.get(&id) else {
                continue;
            };
            let compiled = Arc::clone(&entry.compiled);
            let enabled = entry.enabled;
            let cooldown_ready = entry.cooldown_ready(tick.at_ms);
            let mut last_fired_at = entry.last_fired_at;

            if !enabled {
                let mut diag = PatternDiagnostics::idle(EvalStatus::Disabled, None, tick.frame, tick.at_ms);
                diag.last_fired_at = last_fired_at;
                self.diagnostics.insert(id, diag);
                continue;
            }

            let eval = match evaluate(&compiled, &ctx) {
                Ok(eval) => eval,
                Err(fault) => {
                    warn!("Pattern '{}' skipped this tick: {}", id, fault);
                    notes.push(EngineEvent::PatternSkipped {
                        pattern_id: id.clone(),
                        reason: fault.to_string(),
                    });
                    let mut diag =
                        PatternDiagnostics::idle(EvalStatus::Faulted, Some(fault.to_string()), tick.frame, tick.at_ms);
                    diag.last_fired_at = last_fired_at;
                    self.diagnostics.insert(id, diag);
                    continue;
                }
            };

            // Continuous outputs already playing only need re-arming; that is not a fire and
            // is not subject to the cooldown.
            let mut pending = Vec::new();
            for &out in &eval.active_outputs {
                let key = OutputKey::new(id.as_str(), compiled.nodes[out].id.as_str());
                if !self.scheduler.rearm(&key, tick) {
                    pending.push((key, out));
                }
            }

            let mut fired = Vec::new();
            if !pending.is_empty() && cooldown_ready {
                for (key, out) in pending {
                    let Some(node) = compiled.output(out) else {
                        continue;
                    };
                    if self.scheduler.trigger(key, node, tick).fired() {
                        fired.push(compiled.nodes[out].id.clone());
                    }
                }
            }

            if !fired.is_empty() {
                last_fired_at = Some(tick.at_ms);
                if let Some(entry) = self.patterns.get_mut(&id) {
                    entry.last_fired_at = last_fired_at;
                }
                notes.push(EngineEvent::PatternFired {
                    pattern_id: id.clone(),
                    outputs: fired.clone(),
                    at_ms: tick.at_ms,
                });
            }

            let mut diag = PatternDiagnostics::from_evaluation(&compiled, &eval, tick.frame, tick.at_ms);
            diag.fired = fired;
            diag.last_fired_at = last_fired_at;
            self.diagnostics.insert(id, diag);
        }
    }

    /// Fail-safe for shutdown: ends every run and returns a zero command for every connected
    /// actuator.
    pub fn shutdown(&mut self) -> Vec<DeviceCommand> {
        let canceled = self.scheduler.cancel_all();
        if !canceled.is_empty() {
            info!("Canceled {} active run(s) on shutdown", canceled.len());
        }
        router::stop_all(&self.devices)
    }

    /// Async driver loop. Runs until `cancel` fires, then returns the shutdown commands.
    pub async fn run(mut self, outlets: ReactorOutlets, cancel: CancellationToken) -> Vec<DeviceCommand> {
        info!("Reactor started. Tick: {}ms", self.clock.interval_ms());

        let mut cadence = interval(std::time::Duration::from_millis(self.clock.interval_ms()));
        cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            // Driver: wait for the next tick boundary.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = cadence.tick() => {}
            }

            // Driver: drain the inbox.
            let mut events: Vec<Event> = Vec::new();
            while let Ok(event) = self.receiver.try_recv() {
                events.push(event);
            }

            // Core: one step.
            let effects = self.tick_step(events);

            // Driver: execute side effects. Dispatch is handed off, never awaited.
            for effect in effects {
                match effect {
                    SideEffect::Dispatch(commands) => {
                        if let Err(e) = outlets.commands.try_send(commands) {
                            warn!("Device dispatch backlog, dropping batch: {}", e);
                        }
                    }
                    SideEffect::Notify(event) => {
                        log_event(&event);
                        let _ = outlets.events.send(event);
                    }
                }
            }
            outlets.diagnostics.send_replace(Arc::new(self.diagnostics.clone()));
        }

        info!("Reactor stopping");
        self.shutdown()
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::PatternFired { pattern_id, outputs, at_ms } => {
            info!("[FIRE] pattern={} outputs={:?} t={}ms", pattern_id, outputs, at_ms)
        }
        EngineEvent::PatternLifecycle { pattern_id, change } => info!("[PATTERN] {} {:?}", pattern_id, change),
        EngineEvent::TelemetryLost { .. } | EngineEvent::TelemetryRestored { .. } => info!("[TELEMETRY] {:?}", event),
        other => debug!("[ENGINE] {:?}", other),
    }
}
