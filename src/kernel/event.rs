use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::state::PatternDelta;
use super::telemetry::event::EngineEvent;
use crate::outputs::devices::{DeviceCommand, DeviceInfo};

/// Continuous flight/vehicle parameters the game adapter can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Speed,
    Ias,
    Tas,
    Altitude,
    ClimbRate,
    GLoad,
    Aoa,
    Mach,
    Rpm,
    Throttle,
    Fuel,
    EngineTemp,
    OilTemp,
    WaterTemp,
    Gear,
}

impl Parameter {
    pub const ALL: [Parameter; 15] = [
        Parameter::Speed,
        Parameter::Ias,
        Parameter::Tas,
        Parameter::Altitude,
        Parameter::ClimbRate,
        Parameter::GLoad,
        Parameter::Aoa,
        Parameter::Mach,
        Parameter::Rpm,
        Parameter::Throttle,
        Parameter::Fuel,
        Parameter::EngineTemp,
        Parameter::OilTemp,
        Parameter::WaterTemp,
        Parameter::Gear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Parameter::Speed => "speed",
            Parameter::Ias => "ias",
            Parameter::Tas => "tas",
            Parameter::Altitude => "altitude",
            Parameter::ClimbRate => "climb_rate",
            Parameter::GLoad => "g_load",
            Parameter::Aoa => "aoa",
            Parameter::Mach => "mach",
            Parameter::Rpm => "rpm",
            Parameter::Throttle => "throttle",
            Parameter::Fuel => "fuel",
            Parameter::EngineTemp => "engine_temp",
            Parameter::OilTemp => "oil_temp",
            Parameter::WaterTemp => "water_temp",
            Parameter::Gear => "gear",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        // Short aliases used by hand-written pattern files.
        let key = match key.as_str() {
            "g" | "gload" | "ny" => "g_load",
            "alt" | "height" => "altitude",
            "vy" | "vspeed" => "climb_rate",
            "aoa_deg" | "angle_of_attack" => "aoa",
            other => other,
        };
        Parameter::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == key)
            .ok_or_else(|| s.to_string())
    }
}

/// Kinds of discrete game events produced by the HUD message classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TargetDestroyed,
    EnemySetAfire,
    TakingDamage,
    SeverelyDamaged,
    ShotDown,
    Crashed,
    Achievement,
    EngineOverheat,
    OilOverheated,
    ChatMessage,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::TargetDestroyed,
        EventKind::EnemySetAfire,
        EventKind::TakingDamage,
        EventKind::SeverelyDamaged,
        EventKind::ShotDown,
        EventKind::Crashed,
        EventKind::Achievement,
        EventKind::EngineOverheat,
        EventKind::OilOverheated,
        EventKind::ChatMessage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TargetDestroyed => "TargetDestroyed",
            EventKind::EnemySetAfire => "EnemySetAfire",
            EventKind::TakingDamage => "TakingDamage",
            EventKind::SeverelyDamaged => "SeverelyDamaged",
            EventKind::ShotDown => "ShotDown",
            EventKind::Crashed => "Crashed",
            EventKind::Achievement => "Achievement",
            EventKind::EngineOverheat => "EngineOverheat",
            EventKind::OilOverheated => "OilOverheated",
            EventKind::ChatMessage => "ChatMessage",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        let key = match key {
            "Kill" | "kill" => "TargetDestroyed",
            "Chat" | "chat" => "ChatMessage",
            other => other,
        };
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(key))
            .ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub parameter: Parameter,
    pub value: f64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscreteEvent {
    pub kind: EventKind,
    pub id: u64,
    pub session_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One poll worth of adapter output: the current sample snapshot plus whatever the event
/// feed returned (possibly including replayed history).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default)]
    pub samples: Vec<TelemetrySample>,
    #[serde(default)]
    pub events: Vec<DiscreteEvent>,
}

/// Reactor inbox. Everything that reaches the evaluator goes through here; producers never
/// touch engine state directly.
#[derive(Debug, Clone)]
pub enum Event {
    Telemetry(TelemetryFrame),
    TelemetryUnavailable(String),
    DevicesChanged(Vec<DeviceInfo>),
    Admin(PatternDelta),
}

/// What one tick asks the driver to do. Produced by `Reactor::tick_step`, executed by
/// `Reactor::run`.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Dispatch(Vec<DeviceCommand>),
    Notify(EngineEvent),
}
