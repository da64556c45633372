use std::collections::{BTreeMap, VecDeque};

use super::event::EngineEvent;

#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub fire_stats: FireStats,
    pub session_stats: SessionStats,
    pub telemetry_stats: TelemetryStats,
}

#[derive(Debug, Clone, Default)]
pub struct FireStats {
    pub total_fires: u64,
    pub fires_per_pattern: BTreeMap<String, u64>,
    pub outputs_fired: u64,
    pub skipped_evaluations: u64,
    pub canceled_runs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub discontinuities: u64,
    pub backlog_batches: u64,
    pub suppressed_events: u64,
    pub admitted_events: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub outages: u64,
    pub total_outage_ms: u64,
    pub avg_outage_ms: f64,
}

pub fn compute_stats(events: &VecDeque<EngineEvent>) -> EngineStats {
    let mut stats = EngineStats::default();

    let mut outage_started: Option<u64> = None;
    let mut closed_outages = 0u64;

    for event in events {
        match event {
            EngineEvent::PatternFired { pattern_id, outputs, .. } => {
                stats.fire_stats.total_fires += 1;
                stats.fire_stats.outputs_fired += outputs.len() as u64;
                *stats.fire_stats.fires_per_pattern.entry(pattern_id.clone()).or_insert(0) += 1;
            }
            EngineEvent::PatternSkipped { .. } => stats.fire_stats.skipped_evaluations += 1,
            EngineEvent::RunCanceled { .. } => stats.fire_stats.canceled_runs += 1,
            EngineEvent::SessionDiscontinuity { .. } => stats.session_stats.discontinuities += 1,
            EngineEvent::BacklogSuppressed { count } => {
                stats.session_stats.backlog_batches += 1;
                stats.session_stats.suppressed_events += *count as u64;
            }
            EngineEvent::EventsAdmitted { count } => stats.session_stats.admitted_events += *count as u64,
            EngineEvent::TelemetryLost { at_ms } => {
                stats.telemetry_stats.outages += 1;
                outage_started = Some(*at_ms);
            }
            EngineEvent::TelemetryRestored { at_ms } => {
                if let Some(start) = outage_started.take() {
                    stats.telemetry_stats.total_outage_ms += at_ms.saturating_sub(start);
                    closed_outages += 1;
                }
            }
            _ => {}
        }
    }

    if closed_outages > 0 {
        stats.telemetry_stats.avg_outage_ms = stats.telemetry_stats.total_outage_ms as f64 / closed_outages as f64;
    }

    stats
}
