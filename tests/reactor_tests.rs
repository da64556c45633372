mod common;

use std::time::Duration;

use common::{commands, fires, flat_curve, graph, hud, install, notes, output, reactor, sample, speed_frame, speed_pattern, test_config};
use pulsegraph::error::EngineError;
use pulsegraph::handle;
use pulsegraph::kernel::event::{Event, EventKind, Parameter, SideEffect, TelemetryFrame};
use pulsegraph::kernel::reactor::Reactor;
use pulsegraph::kernel::scheduler::OutputKey;
use pulsegraph::kernel::state::PatternDelta;
use pulsegraph::kernel::telemetry::event::{EngineEvent, PatternChange};
use pulsegraph::pattern::model::OutputClass;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn step(reactor: &mut Reactor, events: Vec<Event>) -> Vec<SideEffect> {
    reactor.tick_step(events)
}

/// Ticks at which the pattern fired, in ms.
fn fire_times(effects_per_tick: &[Vec<SideEffect>]) -> Vec<u64> {
    effects_per_tick
        .iter()
        .flat_map(|effects| notes(effects))
        .filter_map(|n| match n {
            EngineEvent::PatternFired { at_ms, .. } => Some(at_ms),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_cooldown_limits_fire_rate() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = speed_pattern("p", 1000, output("vibration", 0.5, "once", flat_curve()));

    let mut ticks = vec![step(&mut r, vec![install(&p), speed_frame(650.0)])];
    for _ in 1..26 {
        ticks.push(step(&mut r, vec![speed_frame(650.0)]));
    }

    assert_eq!(fire_times(&ticks), vec![0, 1000, 2000]);

    let stats = r.recorder.stats();
    assert_eq!(stats.fire_stats.total_fires, 3);
    assert_eq!(stats.fire_stats.fires_per_pattern.get("p"), Some(&3));
}

#[tokio::test]
async fn test_envelope_plays_out_after_condition_drops() {
    let config = test_config();
    let mut r = reactor(&config);
    let curve = json!([
        { "x": 0.0, "y": 0.0 },
        { "x": 0.2, "y": 1.0 },
        { "x": 0.8, "y": 0.5 },
        { "x": 1.0, "y": 0.0 }
    ]);
    let p = speed_pattern("overspeed", 1000, output("vibration", 1.5, "once", curve));

    let mut ticks = Vec::new();
    for i in 0..20u64 {
        let speed = if i == 0 || i == 5 { 650.0 } else { 500.0 };
        let mut events = vec![speed_frame(speed)];
        if i == 0 {
            events.insert(0, install(&p));
        }
        ticks.push(step(&mut r, events));
    }

    assert_eq!(fire_times(&ticks), vec![0], "second crossing is inside the cooldown");

    let at_300 = commands(&ticks[3]);
    assert_eq!(at_300.len(), 1);
    assert_eq!(at_300[0].device_id, "dev1");
    assert_eq!(at_300[0].intensity, 1.0);

    // Still playing right before the end.
    assert!(commands(&ticks[14])[0].intensity > 0.0);

    let at_end = commands(&ticks[15]);
    assert_eq!(at_end.len(), 1);
    assert_eq!(at_end[0].intensity, 0.0);
    assert!(r.scheduler.active_runs() == 0);
    assert!(commands(&ticks[16]).is_empty(), "a finished run emits exactly one stop");
}

fn jitter_trace(config: &pulsegraph::EngineConfig) -> Vec<Vec<SideEffect>> {
    let mut r = reactor(config);
    let mut out = output("vibration", 0.3, "continuous", flat_curve());
    out["randomRange"] = json!({ "min": 0.5, "max": 1.0 });
    let p = speed_pattern("p", 0, out);

    let mut ticks = vec![step(&mut r, vec![install(&p), speed_frame(700.0)])];
    for i in 1..30 {
        let speed = if i < 20 { 700.0 } else { 100.0 };
        ticks.push(step(&mut r, vec![speed_frame(speed)]));
    }
    ticks
}

#[tokio::test]
async fn test_same_inputs_same_outputs() {
    let config = test_config();
    let a = jitter_trace(&config);
    let b = jitter_trace(&config);
    assert_eq!(a, b);

    let levels: Vec<f64> = a.iter().flat_map(|t| commands(t)).map(|c| c.intensity).collect();
    assert!(levels.iter().all(|l| (0.0..=1.0).contains(l)));
    assert!(levels.iter().any(|l| *l > 0.0 && *l < 1.0), "jitter scales the flat curve");
}

#[tokio::test]
async fn test_jitter_is_drawn_once_per_cycle() {
    let config = test_config();
    let mut r = reactor(&config);
    let mut out = output("vibration", 0.3, "repeat", flat_curve());
    out["repeatCount"] = json!(4);
    out["randomRange"] = json!({ "min": 0.5, "max": 1.0 });
    let p = speed_pattern("p", 0, out);

    let mut levels = vec![commands(&step(&mut r, vec![install(&p), speed_frame(700.0)]))[0].intensity];
    for _ in 1..12 {
        levels.push(commands(&step(&mut r, vec![speed_frame(700.0)]))[0].intensity);
    }

    // Three ticks per cycle on a flat curve.
    let cycles: Vec<&[f64]> = levels.chunks(3).collect();
    for cycle in &cycles {
        assert!(cycle.iter().all(|l| *l == cycle[0]), "one factor per cycle: {:?}", cycle);
        assert!((0.5..=1.0).contains(&cycle[0]));
    }
    assert!(
        cycles.windows(2).any(|w| w[0][0] != w[1][0]),
        "each cycle draws a new factor: {:?}",
        levels
    );
}

#[tokio::test]
async fn test_refire_replaces_once_run() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = speed_pattern("p", 500, output("vibration", 2.0, "once", flat_curve()));

    step(&mut r, vec![install(&p), speed_frame(650.0)]);
    for _ in 1..5 {
        step(&mut r, vec![speed_frame(650.0)]);
    }
    let key = OutputKey::new("p", "out");
    assert_eq!(r.scheduler.run(&key).unwrap().started_at, 0);

    let effects = step(&mut r, vec![speed_frame(650.0)]);
    assert_eq!(fires(&effects), vec![("p".to_string(), vec!["out".to_string()])]);
    assert_eq!(r.scheduler.run(&key).unwrap().started_at, 500);
    assert_eq!(r.scheduler.active_runs(), 1);
}

#[tokio::test]
async fn test_continuous_run_follows_condition() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = speed_pattern("p", 0, output("vibration", 1.0, "continuous", flat_curve()));

    let mut ticks = vec![step(&mut r, vec![install(&p), speed_frame(650.0)])];
    // 1.5s of condition: longer than one cycle, still a single fire.
    for _ in 1..15 {
        ticks.push(step(&mut r, vec![speed_frame(650.0)]));
    }
    assert_eq!(fire_times(&ticks), vec![0]);
    assert_eq!(commands(&ticks[12])[0].intensity, 1.0, "cycle repeats");

    let dropped = step(&mut r, vec![speed_frame(500.0)]);
    assert_eq!(commands(&dropped)[0].intensity, 1.0, "armed through the previous tick");

    let stopped = step(&mut r, vec![speed_frame(500.0)]);
    assert_eq!(commands(&stopped)[0].intensity, 0.0);
    assert_eq!(r.scheduler.active_runs(), 0);
}

#[tokio::test]
async fn test_repeat_run_ignores_refires() {
    let config = test_config();
    let mut r = reactor(&config);
    let mut out = output("vibration", 0.5, "repeat", flat_curve());
    out["repeatCount"] = json!(2);
    let p = speed_pattern("p", 0, out);

    let mut ticks = vec![step(&mut r, vec![install(&p), speed_frame(650.0)])];
    for _ in 1..15 {
        ticks.push(step(&mut r, vec![speed_frame(650.0)]));
    }

    // Completes at 1000ms; the next tick may start a new run.
    assert_eq!(fire_times(&ticks), vec![0, 1100]);
    assert_eq!(commands(&ticks[10])[0].intensity, 0.0);
}

#[tokio::test]
async fn test_longest_repeat_run_keeps_ticking() {
    let config = test_config();
    let mut r = reactor(&config);
    let mut out = output("vibration", 3600.0, "repeat", flat_curve());
    out["repeatCount"] = json!(u32::MAX);
    let p = speed_pattern("p", 0, out);

    let first = step(&mut r, vec![install(&p), speed_frame(650.0)]);
    assert_eq!(fires(&first).len(), 1);
    for _ in 0..5 {
        let effects = step(&mut r, vec![speed_frame(650.0)]);
        assert_eq!(commands(&effects)[0].intensity, 1.0);
    }
}

#[tokio::test]
async fn test_disable_cancels_open_ended_runs() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = speed_pattern("p", 0, output("vibration", 1.0, "continuous", flat_curve()));

    step(&mut r, vec![install(&p), speed_frame(650.0)]);
    step(&mut r, vec![speed_frame(650.0)]);

    let effects = step(
        &mut r,
        vec![
            Event::Admin(PatternDelta::SetEnabled {
                id: "p".into(),
                enabled: false,
            }),
            speed_frame(650.0),
        ],
    );
    let cmds = commands(&effects);
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].intensity, 0.0);

    let n = notes(&effects);
    assert!(n.contains(&EngineEvent::RunCanceled {
        pattern_id: "p".into(),
        node_id: "out".into()
    }));
    assert!(n.contains(&EngineEvent::PatternLifecycle {
        pattern_id: "p".into(),
        change: PatternChange::Disabled
    }));
    assert!(fires(&effects).is_empty());

    let later = step(&mut r, vec![speed_frame(650.0)]);
    assert!(commands(&later).is_empty());
}

#[tokio::test]
async fn test_disable_lets_once_run_finish() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = speed_pattern("p", 0, output("vibration", 1.0, "once", flat_curve()));

    step(&mut r, vec![install(&p), speed_frame(650.0)]);
    let effects = step(
        &mut r,
        vec![Event::Admin(PatternDelta::SetEnabled {
            id: "p".into(),
            enabled: false,
        })],
    );
    assert_eq!(commands(&effects)[0].intensity, 1.0);
    assert_eq!(r.scheduler.active_runs(), 1);
}

#[tokio::test]
async fn test_remove_stops_everything() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = speed_pattern("p", 0, output("vibration", 5.0, "once", flat_curve()));

    step(&mut r, vec![install(&p), speed_frame(650.0)]);
    let effects = step(&mut r, vec![Event::Admin(PatternDelta::Remove("p".into())), speed_frame(650.0)]);

    assert_eq!(commands(&effects)[0].intensity, 0.0);
    assert_eq!(r.scheduler.active_runs(), 0);
    assert!(r.patterns.is_empty());
    assert!(r.diagnostics().get("p").is_none());
}

#[tokio::test]
async fn test_telemetry_loss_reads_as_unknown() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = speed_pattern("p", 0, output("vibration", 0.2, "once", flat_curve()));

    step(&mut r, vec![install(&p), speed_frame(500.0)]);

    let lost = step(&mut r, vec![Event::TelemetryUnavailable("connection refused".into())]);
    assert!(notes(&lost).contains(&EngineEvent::TelemetryLost { at_ms: 100 }));
    assert!(!r.sensors.is_available());

    let again = step(&mut r, vec![Event::TelemetryUnavailable("connection refused".into())]);
    assert!(!notes(&again).iter().any(|n| matches!(n, EngineEvent::TelemetryLost { .. })));
    assert!(fires(&again).is_empty());

    let back = step(&mut r, vec![speed_frame(650.0)]);
    assert!(notes(&back).contains(&EngineEvent::TelemetryRestored { at_ms: 300 }));
    assert_eq!(fires(&back).len(), 1);

    let stats = r.recorder.stats().telemetry_stats;
    assert_eq!(stats.outages, 1);
    assert_eq!(stats.total_outage_ms, 200);
}

#[tokio::test]
async fn test_missing_frame_holds_last_snapshot() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = speed_pattern("p", 200, output("vibration", 0.1, "once", flat_curve()));

    let mut ticks = vec![step(&mut r, vec![install(&p), speed_frame(650.0)])];
    ticks.push(step(&mut r, vec![]));
    ticks.push(step(&mut r, vec![]));
    assert_eq!(fire_times(&ticks), vec![0, 200]);
}

#[tokio::test]
async fn test_fault_skips_only_the_faulting_pattern() {
    let config = test_config();
    let mut r = reactor(&config);
    let by_speed = speed_pattern("a", 0, output("vibration", 0.2, "once", flat_curve()));
    let by_rpm = graph(json!({
        "id": "b", "name": "b",
        "nodes": [
            { "id": "rpm", "type": "input", "parameter": "rpm", "comparator": ">", "threshold": 2000.0 },
            { "id": "out", "type": "vibration", "duration": 0.2, "curve": flat_curve() }
        ],
        "edges": [{ "id": "e", "source": "rpm", "target": "out" }]
    }));

    let frame = Event::Telemetry(TelemetryFrame {
        samples: vec![sample(Parameter::Speed, f64::NAN), sample(Parameter::Rpm, 3000.0)],
        events: vec![],
    });
    let effects = step(&mut r, vec![install(&by_speed), install(&by_rpm), frame]);

    assert_eq!(fires(&effects), vec![("b".to_string(), vec!["out".to_string()])]);
    assert!(notes(&effects)
        .iter()
        .any(|n| matches!(n, EngineEvent::PatternSkipped { pattern_id, .. } if pattern_id == "a")));
    assert!(r.diagnostics().get("a").unwrap().fault.is_some());
}

#[tokio::test]
async fn test_event_trigger_fires_once_per_admitted_event() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = graph(json!({
        "id": "kills", "name": "kills", "cooldownMs": 0,
        "nodes": [
            { "id": "kill", "type": "event", "eventKind": "TargetDestroyed" },
            { "id": "out", "type": "vibration", "duration": 0.2, "curve": flat_curve() }
        ],
        "edges": [{ "id": "e", "source": "kill", "target": "out" }]
    }));
    let frame = |ids: &[u64]| {
        Event::Telemetry(TelemetryFrame {
            samples: vec![],
            events: ids
                .iter()
                .map(|&i| hud(i, 100 + i, EventKind::TargetDestroyed, Some("Me"), &format!("Me destroyed target {}", i)))
                .collect(),
        })
    };

    // History at first contact never fires.
    let first = step(&mut r, vec![install(&p), frame(&[1, 2, 3])]);
    assert!(fires(&first).is_empty());
    assert!(notes(&first)
        .iter()
        .any(|n| matches!(n, EngineEvent::SessionBaselined { skipped: 3, .. })));

    let live = step(&mut r, vec![frame(&[4])]);
    assert_eq!(fires(&live).len(), 1);
    assert!(notes(&live).contains(&EngineEvent::EventsAdmitted { count: 1 }));

    // Re-delivered event is not admitted again.
    let repeat = step(&mut r, vec![frame(&[4])]);
    assert!(fires(&repeat).is_empty());
    let quiet = step(&mut r, vec![]);
    assert!(fires(&quiet).is_empty());
}

#[tokio::test]
async fn test_new_session_lifts_cooldown() {
    let config = test_config();
    let mut r = reactor(&config);
    let p = graph(json!({
        "id": "kills", "name": "kills", "cooldownMs": 10000,
        "nodes": [
            { "id": "kill", "type": "event", "eventKind": "TargetDestroyed" },
            { "id": "out", "type": "vibration", "duration": 0.1, "curve": flat_curve() }
        ],
        "edges": [{ "id": "e", "source": "kill", "target": "out" }]
    }));
    let frame = |id: u64, time: u64| {
        Event::Telemetry(TelemetryFrame {
            samples: vec![],
            events: vec![hud(id, time, EventKind::TargetDestroyed, Some("Me"), &format!("Me destroyed target {}", id))],
        })
    };

    step(&mut r, vec![install(&p), frame(10, 300)]);
    assert_eq!(fires(&step(&mut r, vec![frame(11, 301)])).len(), 1);
    assert!(fires(&step(&mut r, vec![frame(12, 302)])).is_empty(), "inside cooldown");

    // The game restarted its clock: a new session.
    let reset = step(&mut r, vec![frame(1, 5)]);
    assert!(fires(&reset).is_empty());
    assert!(notes(&reset)
        .iter()
        .any(|n| matches!(n, EngineEvent::SessionDiscontinuity { previous_max_time: 302, .. })));

    // 300ms after the last fire, well inside the old cooldown.
    let again = step(&mut r, vec![frame(2, 6)]);
    assert_eq!(fires(&again).len(), 1);
}

#[tokio::test]
async fn test_handle_validates_then_queues() {
    let config = test_config();
    let mut parts = handle::build(&config);

    let bad = speed_pattern("bad", 0, output("vibration", 0.0, "once", flat_curve()));
    let err = parts.handle.load_or_replace_pattern(bad).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(parts.reactor.receiver.try_recv().is_err(), "nothing queued on rejection");

    let good = speed_pattern("good", 0, output("vibration", 1.0, "once", flat_curve()));
    let id = parts.handle.load_or_replace_pattern(good).await.unwrap();
    assert_eq!(id, "good");
    assert!(matches!(parts.handle.diagnostics("good"), Err(EngineError::PatternNotFound(_))));

    let mut queued = Vec::new();
    while let Ok(e) = parts.reactor.receiver.try_recv() {
        queued.push(e);
    }
    let effects = parts.reactor.tick_step(queued);
    assert!(notes(&effects).contains(&EngineEvent::PatternLifecycle {
        pattern_id: "good".into(),
        change: PatternChange::Installed
    }));
    assert_eq!(parts.reactor.patterns.len(), 1);
}

#[tokio::test]
async fn test_run_loop_publishes_and_stops_devices() {
    let mut config = test_config();
    config.tick_interval_ms = 10;
    config.devices.static_devices.push(common::device("dev2", &[OutputClass::Linear, OutputClass::Rotation]));
    let parts = handle::build(&config);
    let handle = parts.handle.clone();
    let mut command_rx = parts.commands;
    let mut events = handle.subscribe();
    let cancel = CancellationToken::new();

    let engine = tokio::spawn(parts.reactor.run(parts.outlets, cancel.clone()));

    let p = speed_pattern("p", 1000, output("vibration", 5.0, "once", flat_curve()));
    handle.load_or_replace_pattern(p).await.unwrap();
    handle.inbox().send(speed_frame(700.0)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let diag = handle.diagnostics("p").unwrap();
    assert!(diag.last_fired_at.is_some());
    assert_eq!(diag.nodes.get("speed").map(|s| s.active()), Some(true));

    let batch = command_rx.try_recv().expect("a dispatched batch");
    assert!(batch.iter().any(|c| c.device_id == "dev1" && c.intensity == 1.0));

    let mut saw_fire = false;
    while let Ok(e) = events.try_recv() {
        saw_fire |= matches!(e, EngineEvent::PatternFired { .. });
    }
    assert!(saw_fire);

    cancel.cancel();
    let stops = engine.await.unwrap();
    assert_eq!(stops.len(), 3, "one zero per actuator");
    assert!(stops.iter().all(|c| c.intensity == 0.0));
}
