//! Offline replay: feeds recorded telemetry frames through the engine, one frame per tick,
//! and prints every decision as JSON lines.
//!
//! Usage: pulsegraph-replay <config.json> <patterns.json> <frames.jsonl>

use anyhow::{bail, Context};
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pulsegraph::config::EngineConfig;
use pulsegraph::kernel::event::{Event, SideEffect, TelemetryFrame};
use pulsegraph::kernel::reactor::Reactor;
use pulsegraph::kernel::state::PatternDelta;
use pulsegraph::pattern::compile::compile;
use pulsegraph::pattern::library::PatternLibrary;

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        bail!("usage: {} <config.json> <patterns.json> <frames.jsonl>", args[0]);
    }
    let config = EngineConfig::load_from_file(&args[1]);
    let library = PatternLibrary::load(&args[2])?;

    // No producers: the replay drives tick_step directly.
    let (_tx, rx) = mpsc::channel(1);
    let mut reactor = Reactor::new(rx, &config);

    let mut admin = Vec::new();
    for graph in &library.patterns {
        match compile(graph) {
            Ok(compiled) => admin.push(Event::Admin(PatternDelta::Install(Arc::new(compiled)))),
            Err(e) => tracing::warn!("Skipping pattern '{}': {}", graph.name, e),
        }
    }

    let frames = std::fs::File::open(&args[3]).with_context(|| format!("opening {}", args[3]))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let mut pending = admin;
    for (n, line) in BufReader::new(frames).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: TelemetryFrame =
            serde_json::from_str(&line).with_context(|| format!("frame on line {}", n + 1))?;
        pending.push(Event::Telemetry(frame));

        for effect in reactor.tick_step(std::mem::take(&mut pending)) {
            let json = match effect {
                SideEffect::Dispatch(commands) => serde_json::json!({ "line": n + 1, "dispatch": commands }),
                SideEffect::Notify(event) => serde_json::json!({ "line": n + 1, "event": event }),
            };
            writeln!(out, "{}", json)?;
        }
    }

    let stats = reactor.recorder.stats();
    tracing::info!(
        "Replay done: {} fire(s), {} discontinuity(ies), {} suppressed event(s)",
        stats.fire_stats.total_fires,
        stats.session_stats.discontinuities,
        stats.session_stats.suppressed_events
    );
    Ok(())
}
