mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::device;
use pulsegraph::error::DeviceError;
use pulsegraph::kernel::scheduler::{Emission, OutputKey};
use pulsegraph::outputs::devices::{
    DeviceCommand, DeviceInfo, DeviceRegistry, DeviceTransport, HttpBridgeTransport, LogTransport,
};
use pulsegraph::outputs::dispatcher::send_batch;
use pulsegraph::outputs::router::{resolve, route, stop_all};
use pulsegraph::pattern::compile::Route;
use pulsegraph::pattern::model::{OutputClass, RouteMode};

use OutputClass::{Linear, Rotation, Vibration};

fn registry() -> DeviceRegistry {
    let mut offline = device("d", &[Vibration]);
    offline.connected = false;
    DeviceRegistry::new(vec![
        device("a", &[Vibration]),
        device("b", &[Vibration, Rotation]),
        device("c", &[Linear]),
        offline,
    ])
}

fn route_to(mode: RouteMode, targets: &[&str]) -> Route {
    Route {
        mode,
        targets: targets.iter().map(|t| t.to_string()).collect(),
    }
}

fn level(node: &str, class: OutputClass, route: Route, intensity: f64) -> Emission {
    Emission::Level {
        key: OutputKey::new("p", node),
        class,
        route,
        intensity,
        direction: None,
    }
}

#[test]
fn test_resolve_all_matches_capability() {
    let reg = registry();
    let got = resolve(&Route::default(), Vibration, &reg);
    assert_eq!(got, vec![("a".to_string(), Vibration), ("b".to_string(), Vibration)]);
    assert!(resolve(&Route::default(), Linear, &reg).iter().all(|(id, _)| id == "c"));
}

#[test]
fn test_resolve_by_type() {
    let reg = registry();
    let got = resolve(&route_to(RouteMode::Type, &["rotate"]), Vibration, &reg);
    assert_eq!(got, vec![("b".to_string(), Rotation)]);

    // No usable type names: fall back to the output's own class.
    let got = resolve(&route_to(RouteMode::Type, &["smell"]), Linear, &reg);
    assert_eq!(got, vec![("c".to_string(), Linear)]);

    // Own class preferred when both are requested.
    let got = resolve(&route_to(RouteMode::Type, &["rotation", "vibration"]), Vibration, &reg);
    assert!(got.contains(&("b".to_string(), Vibration)));
}

#[test]
fn test_resolve_specific_skips_unknown_and_disconnected() {
    let reg = registry();
    let got = resolve(&route_to(RouteMode::Specific, &["c", "ghost", "d", "a", "c"]), Vibration, &reg);
    // c has no vibrator, so its first actuator is driven.
    assert_eq!(got, vec![("c".to_string(), Linear), ("a".to_string(), Vibration)]);
}

#[test]
fn test_highest_intensity_wins_per_actuator() {
    let reg = registry();
    let cmds = route(
        &[
            level("soft", Vibration, Route::default(), 0.3),
            level("hard", Vibration, route_to(RouteMode::Specific, &["a"]), 0.9),
        ],
        &reg,
    );
    assert_eq!(
        cmds,
        vec![
            DeviceCommand {
                device_id: "a".into(),
                class: Vibration,
                intensity: 0.9,
                clockwise: None
            },
            DeviceCommand {
                device_id: "b".into(),
                class: Vibration,
                intensity: 0.3,
                clockwise: None
            },
        ]
    );
}

#[test]
fn test_stop_yields_to_active_level() {
    let reg = registry();
    let stop = Emission::Stop {
        key: OutputKey::new("p", "done"),
        class: Vibration,
        route: Route::default(),
    };
    let still_on = level("other", Vibration, route_to(RouteMode::Specific, &["b"]), 0.4);

    let cmds = route(&[stop, still_on], &reg);
    let a = cmds.iter().find(|c| c.device_id == "a").unwrap();
    let b = cmds.iter().find(|c| c.device_id == "b").unwrap();
    assert_eq!(a.intensity, 0.0);
    assert_eq!(b.intensity, 0.4);
    assert_eq!(cmds.len(), 2);
}

#[test]
fn test_rotation_carries_direction() {
    let reg = registry();
    let cmds = route(
        &[Emission::Level {
            key: OutputKey::new("p", "spin"),
            class: Rotation,
            route: Route::default(),
            intensity: 0.5,
            direction: Some(false),
        }],
        &reg,
    );
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].clockwise, Some(false));
}

#[test]
fn test_stop_all_covers_every_connected_actuator() {
    let cmds = stop_all(&registry());
    let slots: Vec<(&str, OutputClass)> = cmds.iter().map(|c| (c.device_id.as_str(), c.class)).collect();
    assert_eq!(slots, vec![("a", Vibration), ("b", Vibration), ("b", Rotation), ("c", Linear)]);
    assert!(cmds.iter().all(|c| c.intensity == 0.0));
}

struct StuckTransport;

#[async_trait]
impl DeviceTransport for StuckTransport {
    async fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        if command.device_id == "slow" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(Vec::new())
    }
}

fn zero(id: &str) -> DeviceCommand {
    DeviceCommand {
        device_id: id.into(),
        class: Vibration,
        intensity: 0.0,
        clockwise: None,
    }
}

#[tokio::test]
async fn test_slow_device_does_not_block_batch() {
    let transport: Arc<dyn DeviceTransport> = Arc::new(StuckTransport);
    let started = std::time::Instant::now();
    let failures = send_batch(&transport, vec![zero("fast"), zero("slow")], Duration::from_millis(50)).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(failures.len(), 1);
    assert!(matches!(&failures[0], DeviceError::Timeout(id) if id == "slow"));

    let logged: Arc<dyn DeviceTransport> = Arc::new(LogTransport::new(Vec::new()));
    assert!(send_batch(&logged, vec![zero("a")], Duration::from_millis(50)).await.is_empty());
}

#[tokio::test]
async fn test_unreachable_bridge_fails_per_command() {
    let bridge = HttpBridgeTransport::new("http://127.0.0.1:1/", Duration::from_millis(200)).expect("client builds");
    let transport: Arc<dyn DeviceTransport> = Arc::new(bridge);
    let failures = send_batch(&transport, vec![zero("a"), zero("b")], Duration::from_secs(1)).await;
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|f| matches!(f, DeviceError::Unreachable { .. } | DeviceError::Timeout(_))));
}
