use pulsegraph::config::EngineConfig;
use pulsegraph::pattern::model::OutputClass;
use std::time::Duration;

fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("pulsegraph-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_defaults() {
    let c = EngineConfig::default();
    assert_eq!(c.session_reset_threshold_seconds, 60);
    assert_eq!(c.bulk_backlog_threshold, 5);
    assert_eq!(c.tick_interval(), Duration::from_millis(100));
    assert_eq!(c.game_api.base_url, "http://127.0.0.1:8111");
    assert!(c.devices.endpoint.is_none());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let path = temp_file(
        "partial.json",
        r#"{
            "tick_interval_ms": 50,
            "identity": { "player_names": ["Maverick"] },
            "devices": { "static_devices": [{ "id": "toy", "capabilities": ["vibration", "rotation"] }] }
        }"#,
    );
    let c = EngineConfig::load_from_file(&path);
    std::fs::remove_file(&path).ok();

    assert_eq!(c.tick_interval_ms, 50);
    assert!(c.identity.is_self("=TOP= Maverick (F-14A)"));
    assert_eq!(c.dedup_window_seconds, 10);
    assert_eq!(c.game_api.timeout(), Duration::from_millis(200));

    let toy = &c.devices.static_devices[0];
    assert!(toy.connected, "devices default to connected");
    assert!(toy.supports(OutputClass::Rotation));
}

#[test]
fn test_missing_or_broken_file_falls_back() {
    let c = EngineConfig::load_from_file("/nonexistent/pulsegraph.json");
    assert_eq!(c.tick_interval_ms, 100);

    let path = temp_file("broken.json", "{ not json");
    let c = EngineConfig::load_from_file(&path);
    std::fs::remove_file(&path).ok();
    assert_eq!(c.random_seed, EngineConfig::default().random_seed);
}

#[test]
fn test_camel_case_option_names() {
    let path = temp_file(
        "camel.json",
        r#"{ "sessionResetThresholdSeconds": 30, "bulkBacklogThreshold": 8, "tickIntervalMs": 20 }"#,
    );
    let c = EngineConfig::load_from_file(&path);
    std::fs::remove_file(&path).ok();

    assert_eq!(c.session_reset_threshold_seconds, 30);
    assert_eq!(c.bulk_backlog_threshold, 8);
    assert_eq!(c.tick_interval(), Duration::from_millis(20));
}
