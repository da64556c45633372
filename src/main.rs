use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pulsegraph::config::EngineConfig;
use pulsegraph::handle;
use pulsegraph::outputs::devices::{DeviceTransport, HttpBridgeTransport, LogTransport};
use pulsegraph::outputs::dispatcher::{run_device_watch, run_dispatcher, send_batch};
use pulsegraph::pattern::library::PatternLibrary;
use pulsegraph::services::game_api::client::{run_poller, GameApiClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    // 2. Config
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "pulsegraph.json".to_string());
    let config = EngineConfig::load_from_file(&config_path);
    tracing::info!("pulsegraph booting (tick {}ms)", config.tick_interval_ms);

    // 3. Engine + channels
    let parts = handle::build(&config);
    let engine = parts.handle.clone();
    let cancel = CancellationToken::new();

    // 4. Device transport
    let log_only = || -> Arc<dyn DeviceTransport> { Arc::new(LogTransport::new(config.devices.static_devices.clone())) };
    let transport: Arc<dyn DeviceTransport> = match &config.devices.endpoint {
        Some(endpoint) => match HttpBridgeTransport::new(endpoint, config.devices.timeout()) {
            Ok(bridge) => {
                tracing::info!("Using device bridge at {}", endpoint);
                Arc::new(bridge)
            }
            Err(e) => {
                tracing::error!("Device bridge client failed to build ({}), commands are logged only", e);
                log_only()
            }
        },
        None => {
            tracing::info!("No device endpoint configured, commands are logged only");
            log_only()
        }
    };
    let client = GameApiClient::new(&config.game_api, config.identity.clone()).context("building game API client")?;

    // 5. Background tasks
    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(run_dispatcher(
        Arc::clone(&transport),
        parts.commands,
        config.devices.timeout(),
        cancel.clone(),
    ));
    tasks.spawn(run_device_watch(
        Arc::clone(&transport),
        engine.inbox(),
        config.devices.refresh_interval(),
        config.devices.timeout(),
        cancel.clone(),
    ));
    tasks.spawn(run_poller(
        client,
        engine.inbox(),
        config.game_api.poll_interval(),
        cancel.clone(),
    ));

    // 6. Reactor
    let reactor = tokio::spawn(parts.reactor.run(parts.outlets, cancel.clone()));

    // 7. Patterns (queued; applied on the next tick)
    if let Some(path) = &config.patterns_path {
        let library = PatternLibrary::load_or_empty(path);
        for graph in library.patterns {
            let name = graph.name.clone();
            match engine.load_or_replace_pattern(graph).await {
                Ok(id) => tracing::info!("Queued pattern '{}' ({})", name, id),
                Err(e) => tracing::warn!("Rejected pattern '{}': {}", name, e),
            }
        }
    }

    // 8. Run until Ctrl+C
    tracing::info!("pulsegraph active. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    tracing::info!("Shutdown requested");
    cancel.cancel();

    let final_commands = reactor.await.context("reactor task panicked")?;
    while tasks.join_next().await.is_some() {}

    // 9. Fail-safe: every actuator to zero.
    let failures = send_batch(&transport, final_commands, config.devices.timeout()).await;
    if !failures.is_empty() {
        tracing::warn!("{} device(s) did not acknowledge the stop", failures.len());
    }
    tracing::info!("pulsegraph stopped");
    Ok(())
}
