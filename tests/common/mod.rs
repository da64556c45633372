#![allow(dead_code)]

use std::sync::Arc;

use pulsegraph::config::EngineConfig;
use pulsegraph::kernel::event::{DiscreteEvent, Event, EventKind, Parameter, SideEffect, TelemetryFrame, TelemetrySample};
use pulsegraph::kernel::reactor::Reactor;
use pulsegraph::kernel::state::PatternDelta;
use pulsegraph::kernel::telemetry::event::EngineEvent;
use pulsegraph::outputs::devices::{DeviceCommand, DeviceInfo};
use pulsegraph::pattern::compile::compile;
use pulsegraph::pattern::model::{OutputClass, PatternGraph};
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub fn graph(v: Value) -> PatternGraph {
    serde_json::from_value(v).expect("pattern json")
}

pub fn flat_curve() -> Value {
    json!([{ "x": 0.0, "y": 1.0 }, { "x": 1.0, "y": 1.0 }])
}

pub fn output(kind: &str, duration: f64, mode: &str, curve: Value) -> Value {
    json!({ "id": "out", "type": kind, "duration": duration, "mode": mode, "curve": curve })
}

/// speed > 600 feeding a single output node "out".
pub fn speed_pattern(id: &str, cooldown_ms: u64, out: Value) -> PatternGraph {
    graph(json!({
        "id": id,
        "name": id,
        "cooldownMs": cooldown_ms,
        "nodes": [
            { "id": "speed", "type": "input", "parameter": "speed", "comparator": ">", "threshold": 600.0 },
            out
        ],
        "edges": [{ "id": "e1", "source": "speed", "target": "out" }]
    }))
}

pub fn install(graph: &PatternGraph) -> Event {
    Event::Admin(PatternDelta::Install(Arc::new(compile(graph).expect("valid pattern"))))
}

pub fn sample(parameter: Parameter, value: f64) -> TelemetrySample {
    TelemetrySample {
        parameter,
        value,
        timestamp_ms: 0,
    }
}

pub fn speed_frame(speed: f64) -> Event {
    Event::Telemetry(TelemetryFrame {
        samples: vec![sample(Parameter::Speed, speed)],
        events: vec![],
    })
}

pub fn hud(id: u64, time: u64, kind: EventKind, actor: Option<&str>, text: &str) -> DiscreteEvent {
    DiscreteEvent {
        kind,
        id,
        session_time: time,
        actor: actor.map(str::to_string),
        text: Some(text.to_string()),
    }
}

pub fn device(id: &str, caps: &[OutputClass]) -> DeviceInfo {
    DeviceInfo {
        id: id.to_string(),
        name: id.to_string(),
        capabilities: caps.to_vec(),
        connected: true,
    }
}

/// 100ms ticks and one vibration device "dev1".
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.tick_interval_ms = 100;
    config.devices.static_devices = vec![device("dev1", &[OutputClass::Vibration])];
    config
}

pub fn reactor(config: &EngineConfig) -> Reactor {
    let (_tx, rx) = mpsc::channel(100);
    Reactor::new(rx, config)
}

pub fn commands(effects: &[SideEffect]) -> Vec<DeviceCommand> {
    effects
        .iter()
        .filter_map(|e| match e {
            SideEffect::Dispatch(c) => Some(c.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

pub fn notes(effects: &[SideEffect]) -> Vec<EngineEvent> {
    effects
        .iter()
        .filter_map(|e| match e {
            SideEffect::Notify(n) => Some(n.clone()),
            _ => None,
        })
        .collect()
}

/// (pattern id, fired output ids) for every fire in this tick.
pub fn fires(effects: &[SideEffect]) -> Vec<(String, Vec<String>)> {
    notes(effects)
        .into_iter()
        .filter_map(|n| match n {
            EngineEvent::PatternFired { pattern_id, outputs, .. } => Some((pattern_id, outputs)),
            _ => None,
        })
        .collect()
}
