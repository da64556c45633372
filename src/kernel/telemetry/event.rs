use serde::{Deserialize, Serialize};

// Allowed: ids, engine times, counts, reasons.
// Forbidden: chat text and other raw HUD content.

/// Structured record of what the engine decided. Emitted through `SideEffect::Notify`,
/// kept in the recorder, and broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    SessionBaselined {
        max_event_id: u64,
        max_session_time: u64,
        skipped: usize,
    },

    SessionDiscontinuity {
        previous_max_time: u64,
        new_max_time: u64,
        skipped: usize,
    },

    BacklogSuppressed {
        count: usize,
    },

    EventsAdmitted {
        count: usize,
    },

    TelemetryLost {
        at_ms: u64,
    },

    TelemetryRestored {
        at_ms: u64,
    },

    PatternLifecycle {
        pattern_id: String,
        change: PatternChange,
    },

    PatternFired {
        pattern_id: String,
        outputs: Vec<String>,
        at_ms: u64,
    },

    PatternSkipped {
        pattern_id: String,
        reason: String,
    },

    RunCanceled {
        pattern_id: String,
        node_id: String,
    },

    DevicesUpdated {
        total: usize,
        connected: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternChange {
    Installed,
    Replaced,
    Removed,
    Enabled,
    Disabled,
    NotFound,
}
